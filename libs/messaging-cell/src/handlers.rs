use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::SendMessageRequest;
use crate::services::channel::MessageChannelService;

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<Value>, AppError> {
    let channel = MessageChannelService::new(&state);

    let message = channel.send(&user, request, auth.token()).await?;

    Ok(Json(json!(message)))
}

#[axum::debug_handler]
pub async fn list_thread(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let channel = MessageChannelService::new(&state);

    let messages = channel
        .list_thread(appointment_id, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "messages": messages,
        "total": messages.len()
    })))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<Arc<AppConfig>>,
    Path(message_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let channel = MessageChannelService::new(&state);

    channel.mark_read(message_id, &user, auth.token()).await?;

    Ok(Json(json!({ "success": true })))
}
