// libs/messaging-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::error::AppError;

/// Row shape of the `messages` table. Threads are scoped to one appointment
/// and append-only; `created_at` is assigned by the store so ordering does
/// not depend on client clocks. `is_read` moves false -> true exactly once,
/// by the receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub appointment_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MessageError {
    #[error("Message not found")]
    NotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Message body must not be empty")]
    EmptyBody,

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<MessageError> for AppError {
    fn from(err: MessageError) -> Self {
        match err {
            MessageError::NotFound => AppError::NotFound("Message not found".to_string()),
            MessageError::AppointmentNotFound => {
                AppError::NotFound("Appointment not found".to_string())
            }
            MessageError::EmptyBody => AppError::BadRequest(err.to_string()),
            MessageError::Forbidden(msg) => AppError::Forbidden(msg),
            MessageError::ValidationError(msg) => AppError::ValidationError(msg),
            MessageError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
