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

use crate::models::CreateCallRequest;
use crate::services::session::CallSessionService;

#[axum::debug_handler]
pub async fn create_call(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateCallRequest>,
) -> Result<Json<Value>, AppError> {
    let sessions = CallSessionService::new(&state);

    let session = sessions
        .create_session(request.appointment_id, &user, auth.token())
        .await?;

    Ok(Json(json!(session)))
}

#[axum::debug_handler]
pub async fn start_call(
    State(state): State<Arc<AppConfig>>,
    Path(session_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let sessions = CallSessionService::new(&state);

    let session = sessions
        .start_session(session_id, &user, auth.token())
        .await?;

    Ok(Json(json!(session)))
}

#[axum::debug_handler]
pub async fn end_call(
    State(state): State<Arc<AppConfig>>,
    Path(session_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let sessions = CallSessionService::new(&state);

    let session = sessions
        .end_session(session_id, &user, auth.token())
        .await?;

    Ok(Json(json!(session)))
}

#[axum::debug_handler]
pub async fn get_call_for_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let sessions = CallSessionService::new(&state);

    let session = sessions
        .get_for_appointment(appointment_id, &user, auth.token())
        .await?;

    Ok(Json(json!(session)))
}
