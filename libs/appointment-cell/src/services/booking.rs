// libs/appointment-cell/src/services/booking.rs
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{Role, User};

use doctor_cell::models::Doctor;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest,
};
use crate::services::lifecycle::AppointmentLifecycleService;

/// Owner of the appointment rows and their status state machine.
pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    lifecycle: AppointmentLifecycleService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            lifecycle: AppointmentLifecycleService::new(),
        }
    }

    /// Book a scheduled consultation: the patient picked the doctor, date and
    /// time themselves. The chosen doctor must exist and be verified.
    ///
    /// Duplicate slots for the same doctor/time are deliberately not
    /// rejected here; scheduled bookings have no slot exclusivity guarantee.
    pub async fn book_scheduled(
        &self,
        user: &User,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        match user.role {
            Role::Patient => {}
            Role::Doctor | Role::Admin => {
                return Err(AppointmentError::Forbidden(
                    "Only patients can book consultations".to_string(),
                ));
            }
        }

        let patient_id = parse_user_id(user)?;

        info!(
            "Booking scheduled appointment for patient {} with doctor {}",
            patient_id, request.doctor_id
        );

        let doctor = self.get_doctor(request.doctor_id).await?;
        if !doctor.is_verified {
            warn!("Rejected booking against unverified doctor {}", doctor.id);
            return Err(AppointmentError::DoctorNotVerified);
        }

        let body = json!({
            "patient_id": patient_id,
            "doctor_id": request.doctor_id,
            "appointment_date": request.appointment_date,
            "appointment_time": request.appointment_time,
            "consultation_type": request.consultation_type,
            "status": AppointmentStatus::Scheduled,
            "amount": request.amount,
            "notes": request.notes,
        });

        let created: Vec<Appointment> = self
            .supabase
            .insert("/rest/v1/appointments", Some(auth_token), body)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointment = created
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Insert returned no row".to_string()))?;

        info!("Booked appointment {}", appointment.id);
        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.fetch_appointment(appointment_id, auth_token).await?;

        let user_id = parse_user_id(user)?;
        match user.role {
            Role::Admin => {}
            Role::Patient | Role::Doctor => {
                if !appointment.is_participant(user_id) {
                    return Err(AppointmentError::Forbidden(
                        "Not a participant of this appointment".to_string(),
                    ));
                }
            }
        }

        Ok(appointment)
    }

    /// All appointments the caller participates in, soonest date first.
    /// Restartable pull; refresh cadence is the consumer's concern.
    pub async fn list_for_participant(
        &self,
        user: &User,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let user_id = parse_user_id(user)?;

        let path = format!(
            "/rest/v1/appointments?or=(patient_id.eq.{},doctor_id.eq.{})&order=appointment_date.asc,appointment_time.asc",
            user_id, user_id
        );

        let appointments: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        debug!("Found {} appointments for user {}", appointments.len(), user_id);
        Ok(appointments)
    }

    /// Advance the appointment state machine. Authorization and transition
    /// validity are checked against the current row, then the write is a
    /// compare-and-swap on the expected prior status, so two racing
    /// transitions are linearized by the store and the loser is told the
    /// state moved under it.
    pub async fn transition(
        &self,
        appointment_id: Uuid,
        acting_user: &User,
        new_status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.fetch_appointment(appointment_id, auth_token).await?;

        self.lifecycle
            .authorize_transition(&appointment, acting_user, new_status)?;
        self.lifecycle
            .validate_status_transition(appointment.status, new_status)?;

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id, appointment.status
        );
        let body = json!({
            "status": new_status,
            "updated_at": chrono::Utc::now(),
        });

        let updated: Vec<Appointment> = self
            .supabase
            .update(&path, Some(auth_token), body)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        match updated.into_iter().next() {
            Some(appointment) => {
                info!(
                    "Appointment {} transitioned to {}",
                    appointment.id, appointment.status
                );
                Ok(appointment)
            }
            None => {
                // Lost a race: the row moved between read and write. Re-read
                // so the caller sees the actual current state.
                let fresh = self.fetch_appointment(appointment_id, auth_token).await?;
                warn!(
                    "Concurrent transition on appointment {}: now {}, wanted {}",
                    appointment_id, fresh.status, new_status
                );
                Err(AppointmentError::InvalidTransition {
                    from: fresh.status,
                    to: new_status,
                })
            }
        }
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn fetch_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let result: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, AppointmentError> {
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);

        let result: Vec<Doctor> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(AppointmentError::DoctorNotFound)
    }
}

pub(crate) fn parse_user_id(user: &User) -> Result<Uuid, AppointmentError> {
    user.id
        .parse::<Uuid>()
        .map_err(|_| AppointmentError::ValidationError("Invalid user ID format".to_string()))
}
