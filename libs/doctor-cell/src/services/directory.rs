// libs/doctor-cell/src/services/directory.rs
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{Role, User};

use crate::models::{Doctor, DoctorError, RegisterDoctorRequest};

/// Read-mostly view of the doctor roster. Eligibility for instant matching
/// (`is_verified && is_available`) is evaluated here for display; the matcher
/// re-evaluates it under a row lock inside its own transaction, so nothing in
/// this service is relied on for correctness of assignment.
pub struct DirectoryService {
    supabase: SupabaseClient,
}

impl DirectoryService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Doctors currently eligible for assignment: verified and available.
    pub async fn list_eligible(&self) -> Result<Vec<Doctor>, DoctorError> {
        let path = "/rest/v1/doctors?is_verified=eq.true&is_available=eq.true&order=specialty.asc";

        let doctors: Vec<Doctor> = self
            .supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        debug!("Found {} eligible doctors", doctors.len());
        Ok(doctors)
    }

    pub async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DoctorError> {
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);

        let result: Vec<Doctor> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(DoctorError::NotFound)
    }

    /// Full roster, for the admin dashboard.
    pub async fn list_all(&self, user: &User, auth_token: &str) -> Result<Vec<Doctor>, DoctorError> {
        match user.role {
            Role::Admin => {}
            Role::Patient | Role::Doctor => {
                return Err(DoctorError::Forbidden(
                    "Only administrators can list the full roster".to_string(),
                ));
            }
        }

        let path = "/rest/v1/doctors?order=created_at.asc";

        self.supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }

    /// Create an unverified doctor profile for the calling user. The profile
    /// stays out of the eligible set until an admin verifies it.
    pub async fn register_doctor(
        &self,
        user: &User,
        request: RegisterDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        if request.specialty.trim().is_empty() {
            return Err(DoctorError::ValidationError(
                "Specialty must not be empty".to_string(),
            ));
        }
        if request.consultation_fee < 0.0 {
            return Err(DoctorError::ValidationError(
                "Consultation fee must not be negative".to_string(),
            ));
        }

        let body = json!({
            "user_id": user.id,
            "specialty": request.specialty,
            "consultation_fee": request.consultation_fee,
            "is_available": true,
            "is_verified": false,
        });

        let created: Vec<Doctor> = self
            .supabase
            .insert("/rest/v1/doctors", Some(auth_token), body)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        let doctor = created
            .into_iter()
            .next()
            .ok_or_else(|| DoctorError::DatabaseError("Insert returned no row".to_string()))?;

        info!("Registered doctor {} for user {}", doctor.id, user.id);
        Ok(doctor)
    }

    /// Presence toggle. Only the doctor themself may flip their own flag.
    pub async fn set_availability(
        &self,
        user: &User,
        is_available: bool,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        match user.role {
            Role::Doctor => {}
            Role::Patient | Role::Admin => {
                return Err(DoctorError::Forbidden(
                    "Only doctors can change their own availability".to_string(),
                ));
            }
        }

        let path = format!("/rest/v1/doctors?user_id=eq.{}", user.id);
        let body = json!({
            "is_available": is_available,
            "updated_at": chrono::Utc::now(),
        });

        let updated: Vec<Doctor> = self
            .supabase
            .update(&path, Some(auth_token), body)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        let doctor = updated.into_iter().next().ok_or(DoctorError::NotFound)?;

        info!(
            "Doctor {} set availability to {}",
            doctor.id, doctor.is_available
        );
        Ok(doctor)
    }

    /// Admin-only verification switch guarding entry into the eligible set.
    pub async fn verify_doctor(
        &self,
        user: &User,
        doctor_id: Uuid,
        is_verified: bool,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        match user.role {
            Role::Admin => {}
            Role::Patient | Role::Doctor => {
                return Err(DoctorError::Forbidden(
                    "Only administrators can verify doctors".to_string(),
                ));
            }
        }

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let body = json!({
            "is_verified": is_verified,
            "updated_at": chrono::Utc::now(),
        });

        let updated: Vec<Doctor> = self
            .supabase
            .update(&path, Some(auth_token), body)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        let doctor = updated.into_iter().next().ok_or(DoctorError::NotFound)?;

        info!("Doctor {} verification set to {}", doctor.id, is_verified);
        Ok(doctor)
    }
}
