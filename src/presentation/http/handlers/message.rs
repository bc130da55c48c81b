//! Message Handlers

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::application::dto::request::{ConversationQuery, SendMessageRequest};
use crate::application::dto::MessagePayload;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::validation_error;
use crate::startup::AppState;

/// Send a message; the response is the sender's view
pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessagePayload>), AppError> {
    body.validate().map_err(validation_error)?;

    let sent = state
        .relay
        .send(auth.user_id, body.receiver_id, &body.content)
        .await?;

    Ok((StatusCode::CREATED, Json(sent.view())))
}

/// Conversation with a contact, oldest first
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(contact_id): Path<String>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<Vec<MessagePayload>>, AppError> {
    query.validate().map_err(validation_error)?;
    let contact_id = parse_id(&contact_id, "contact")?;

    let history = state
        .relay
        .conversation(auth.user_id, contact_id, query.limit)
        .await?;

    Ok(Json(history))
}

/// Retry translation of a message delivered untranslated
pub async fn retry_translation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(message_id): Path<String>,
) -> Result<Json<MessagePayload>, AppError> {
    let message_id = parse_id(&message_id, "message")?;

    let view = state
        .relay
        .retry_translation(message_id, auth.user_id)
        .await?;

    Ok(Json(view))
}

fn parse_id(raw: &str, what: &str) -> Result<i64, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid {} ID", what)))
}
