//! Contact Handlers

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::application::dto::request::AddContactRequest;
use crate::application::dto::{ContactResponse, UserResponse};
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::validation_error;
use crate::startup::AppState;

/// Add a user to the caller's contacts by username
pub async fn add_contact(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<AddContactRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    body.validate().map_err(validation_error)?;

    let contact = state.contacts.add(auth.user_id, &body.username).await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(contact))))
}

/// The caller's contacts, by username
pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<ContactResponse>>, AppError> {
    let contacts = state.contacts.list(auth.user_id).await?;

    Ok(Json(contacts.into_iter().map(ContactResponse::from).collect()))
}
