// libs/appointment-cell/src/services/instant.rs
use tracing::{info, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{Role, User};

use crate::models::{Appointment, AppointmentError, ConsultationType};
use crate::services::booking::parse_user_id;

/// The instant-consultation matcher.
///
/// Selecting a doctor and creating the appointment must be one atomic step,
/// otherwise two concurrent requests can land on the same doctor, or pick a
/// doctor who flipped `is_available` off between the read and the write. The
/// whole operation therefore runs inside the `match_instant_consultation`
/// database function (see `db/match_instant_consultation.sql`): one
/// transaction that locks a single eligible doctor row with
/// `FOR UPDATE SKIP LOCKED` and inserts the appointment before releasing it.
/// Skip-locked selection means concurrent matchers never queue on each
/// other's doctor; each grabs a different eligible row if one exists.
///
/// Ties between eligible doctors go to the least recently assigned
/// (`last_assigned_at` nulls first), which rotates instant work fairly
/// across the roster.
pub struct InstantMatchService {
    supabase: SupabaseClient,
}

impl InstantMatchService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Find an eligible doctor and bind them to a new `scheduled`
    /// appointment for the calling patient. An empty eligible set is
    /// reported as `NoDoctorAvailable` and never retried here; the caller
    /// decides whether to wait or fall back to scheduled booking.
    pub async fn match_instant(
        &self,
        user: &User,
        consultation_type: ConsultationType,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        match user.role {
            Role::Patient => {}
            Role::Doctor | Role::Admin => {
                return Err(AppointmentError::Forbidden(
                    "Only patients can request instant consultations".to_string(),
                ));
            }
        }

        let patient_id = parse_user_id(user)?;

        info!(
            "Matching instant {} consultation for patient {}",
            consultation_type, patient_id
        );

        let args = serde_json::json!({
            "p_patient_id": patient_id,
            "p_consultation_type": consultation_type,
        });

        // The function returns the created appointment row, or no rows when
        // the eligible set was empty.
        let matched: Vec<Appointment> = self
            .supabase
            .rpc("match_instant_consultation", Some(auth_token), args)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        match matched.into_iter().next() {
            Some(appointment) => {
                info!(
                    "Matched patient {} with doctor {} (appointment {})",
                    patient_id, appointment.doctor_id, appointment.id
                );
                Ok(appointment)
            }
            None => {
                warn!("No eligible doctor for instant consultation");
                Err(AppointmentError::NoDoctorAvailable)
            }
        }
    }
}
