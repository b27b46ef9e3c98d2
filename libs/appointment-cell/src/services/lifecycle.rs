// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::auth::{Role, User};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

/// Pure rules for the appointment state machine. No storage access; the
/// booking service applies these before touching the row.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed.
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// All valid next statuses for a given current status.
    pub fn valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Ongoing,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Ongoing => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    /// Who may request which transition. The assigned doctor certifies the
    /// clinical progression (`ongoing`, `completed`); either participant may
    /// cancel. Admins are not participants and get no shortcut here.
    pub fn authorize_transition(
        &self,
        appointment: &Appointment,
        acting_user: &User,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        let acting_id = acting_user
            .id
            .parse::<Uuid>()
            .map_err(|_| AppointmentError::ValidationError("Invalid user ID format".to_string()))?;

        match acting_user.role {
            Role::Doctor => {
                if appointment.doctor_id != acting_id {
                    return Err(AppointmentError::Forbidden(
                        "Only the assigned doctor may update this appointment".to_string(),
                    ));
                }
                Ok(())
            }
            Role::Patient => {
                if appointment.patient_id != acting_id {
                    return Err(AppointmentError::Forbidden(
                        "Only a participant may update this appointment".to_string(),
                    ));
                }
                match new_status {
                    AppointmentStatus::Cancelled => Ok(()),
                    AppointmentStatus::Scheduled
                    | AppointmentStatus::Ongoing
                    | AppointmentStatus::Completed => Err(AppointmentError::Forbidden(
                        "Patients may only cancel appointments".to_string(),
                    )),
                }
            }
            Role::Admin => Err(AppointmentError::Forbidden(
                "Administrators are not appointment participants".to_string(),
            )),
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
