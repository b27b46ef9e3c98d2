// libs/call-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::error::AppError;

/// Row shape of the `video_calls` table. Bookkeeping only: this cell records
/// that a live session exists and for how long, and never touches media
/// transport or the owning appointment's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub room_id: String,
    pub status: CallStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Waiting,
    Active,
    Ended,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Waiting => write!(f, "waiting"),
            CallStatus::Active => write!(f, "active"),
            CallStatus::Ended => write!(f, "ended"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCallRequest {
    pub appointment_id: Uuid,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    #[error("Call session not found")]
    NotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("A live call session already exists for this appointment")]
    SessionAlreadyActive,

    #[error("Invalid call transition: session is {status}")]
    InvalidTransition { status: CallStatus },

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<CallError> for AppError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::NotFound => AppError::NotFound("Call session not found".to_string()),
            CallError::AppointmentNotFound => {
                AppError::NotFound("Appointment not found".to_string())
            }
            CallError::SessionAlreadyActive => AppError::Conflict(err.to_string()),
            CallError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            CallError::Forbidden(msg) => AppError::Forbidden(msg),
            CallError::ValidationError(msg) => AppError::ValidationError(msg),
            CallError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
