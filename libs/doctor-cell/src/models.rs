// libs/doctor-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::error::AppError;

/// Row shape of the `doctors` table. `is_verified` is admin-controlled,
/// `is_available` is toggled only by the doctor themself. A doctor is
/// eligible for instant matching when both flags are true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub specialty: String,
    pub consultation_fee: f64,
    pub is_available: bool,
    pub is_verified: bool,
    /// Stamped by the matcher on each instant assignment; drives the
    /// least-recently-assigned tie-break among eligible doctors.
    pub last_assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDoctorRequest {
    pub specialty: String,
    pub consultation_fee: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAvailabilityRequest {
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyDoctorRequest {
    pub is_verified: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound => AppError::NotFound("Doctor not found".to_string()),
            DoctorError::Forbidden(msg) => AppError::Forbidden(msg),
            DoctorError::ValidationError(msg) => AppError::ValidationError(msg),
            DoctorError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
