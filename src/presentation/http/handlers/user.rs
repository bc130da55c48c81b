//! User Handlers

use axum::{
    extract::{Query, State},
    Json,
};
use validator::Validate;

use crate::application::dto::request::UserLookupQuery;
use crate::application::dto::UserResponse;
use crate::shared::error::AppError;
use crate::shared::validation::validation_error;
use crate::startup::AppState;

/// Find a user by username or email
pub async fn lookup_user(
    State(state): State<AppState>,
    Query(query): Query<UserLookupQuery>,
) -> Result<Json<UserResponse>, AppError> {
    query.validate().map_err(validation_error)?;

    let user = state
        .users
        .find_by_username_or_email(query.q.trim())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(Json(UserResponse::from(user)))
}
