// libs/call-cell/src/services/session.rs
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Method;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{DbError, SupabaseClient};
use shared_models::auth::{Role, User};

use appointment_cell::models::Appointment;

use crate::models::{CallError, CallSession, CallStatus};

const ROOM_TOKEN_LEN: usize = 32;

/// Lifecycle of call sessions bound to an appointment:
/// `waiting` -> `active` -> `ended`, at most one live session per
/// appointment. Knows nothing about media transport.
pub struct CallSessionService {
    supabase: SupabaseClient,
}

impl CallSessionService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Create a `waiting` session for an appointment. Only the two
    /// participants of the appointment may do this, and creation is refused
    /// while a live (`waiting` or `active`) session exists for the same
    /// appointment.
    pub async fn create_session(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<CallSession, CallError> {
        info!(
            "Creating call session for appointment {} by user {}",
            appointment_id, user.id
        );

        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        self.verify_participant(&appointment, user)?;

        if let Some(live) = self.find_live_session(appointment_id, auth_token).await? {
            warn!(
                "Live session {} already exists for appointment {}",
                live.id, appointment_id
            );
            return Err(CallError::SessionAlreadyActive);
        }

        let body = json!({
            "appointment_id": appointment_id,
            "room_id": generate_room_token(),
            "status": CallStatus::Waiting,
        });

        // A partial unique index on (appointment_id) over live sessions
        // (db/one_live_call_per_appointment.sql) backs the check above; a
        // concurrent create that slips past it surfaces here as a conflict.
        let created: Vec<CallSession> = self
            .supabase
            .insert("/rest/v1/video_calls", Some(auth_token), body)
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => CallError::SessionAlreadyActive,
                other => CallError::DatabaseError(other.to_string()),
            })?;

        let session = created
            .into_iter()
            .next()
            .ok_or_else(|| CallError::DatabaseError("Insert returned no row".to_string()))?;

        info!("Created call session {} ({})", session.id, session.room_id);
        Ok(session)
    }

    /// `waiting` -> `active`, stamping `started_at`. Only a participant of
    /// the owning appointment may start the session. The write carries the
    /// expected prior status as a filter, so a session that already moved on
    /// yields a deterministic `InvalidTransition` instead of a silent
    /// overwrite; a unique violation from the live-session index maps to
    /// the session conflict.
    pub async fn start_session(
        &self,
        session_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<CallSession, CallError> {
        let session = self.fetch_session(session_id, auth_token).await?;
        let appointment = self
            .get_appointment(session.appointment_id, auth_token)
            .await?;
        self.verify_participant(&appointment, user)?;

        if session.status != CallStatus::Waiting {
            return Err(CallError::InvalidTransition {
                status: session.status,
            });
        }

        let path = format!(
            "/rest/v1/video_calls?id=eq.{}&status=eq.{}",
            session_id,
            CallStatus::Waiting
        );
        let body = json!({
            "status": CallStatus::Active,
            "started_at": chrono::Utc::now(),
        });

        let updated: Vec<CallSession> = self
            .supabase
            .update(&path, Some(auth_token), body)
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => CallError::SessionAlreadyActive,
                other => CallError::DatabaseError(other.to_string()),
            })?;

        match updated.into_iter().next() {
            Some(session) => {
                info!("Call session {} is now active", session.id);
                Ok(session)
            }
            None => {
                let fresh = self.fetch_session(session_id, auth_token).await?;
                Err(CallError::InvalidTransition {
                    status: fresh.status,
                })
            }
        }
    }

    /// `waiting|active` -> `ended`, stamping `ended_at`. Participant-only;
    /// ending an already ended session is an `InvalidTransition`.
    pub async fn end_session(
        &self,
        session_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<CallSession, CallError> {
        let session = self.fetch_session(session_id, auth_token).await?;
        let appointment = self
            .get_appointment(session.appointment_id, auth_token)
            .await?;
        self.verify_participant(&appointment, user)?;

        if session.status == CallStatus::Ended {
            return Err(CallError::InvalidTransition {
                status: session.status,
            });
        }

        let path = format!(
            "/rest/v1/video_calls?id=eq.{}&status=in.({},{})",
            session_id,
            CallStatus::Waiting,
            CallStatus::Active
        );
        let body = json!({
            "status": CallStatus::Ended,
            "ended_at": chrono::Utc::now(),
        });

        let updated: Vec<CallSession> = self
            .supabase
            .update(&path, Some(auth_token), body)
            .await
            .map_err(|e| CallError::DatabaseError(e.to_string()))?;

        match updated.into_iter().next() {
            Some(session) => {
                info!("Call session {} ended", session.id);
                Ok(session)
            }
            None => {
                let fresh = self.fetch_session(session_id, auth_token).await?;
                Err(CallError::InvalidTransition {
                    status: fresh.status,
                })
            }
        }
    }

    /// Most recent session for an appointment. Lets a caller who hit
    /// `SessionAlreadyActive` find and join the live session instead.
    pub async fn get_for_appointment(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<CallSession, CallError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        self.verify_participant(&appointment, user)?;

        let path = format!(
            "/rest/v1/video_calls?appointment_id=eq.{}&order=created_at.desc&limit=1",
            appointment_id
        );

        let result: Vec<CallSession> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| CallError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(CallError::NotFound)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn verify_participant(
        &self,
        appointment: &Appointment,
        user: &User,
    ) -> Result<(), CallError> {
        let user_id = user
            .id
            .parse::<Uuid>()
            .map_err(|_| CallError::ValidationError("Invalid user ID format".to_string()))?;

        match user.role {
            Role::Patient | Role::Doctor => {
                if !appointment.is_participant(user_id) {
                    return Err(CallError::Forbidden(
                        "Not a participant of this appointment".to_string(),
                    ));
                }
                Ok(())
            }
            Role::Admin => Err(CallError::Forbidden(
                "Administrators are not call participants".to_string(),
            )),
        }
    }

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, CallError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let result: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| CallError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(CallError::AppointmentNotFound)
    }

    async fn find_live_session(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<CallSession>, CallError> {
        let path = format!(
            "/rest/v1/video_calls?appointment_id=eq.{}&status=in.({},{})",
            appointment_id,
            CallStatus::Waiting,
            CallStatus::Active
        );

        let result: Vec<CallSession> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| CallError::DatabaseError(e.to_string()))?;

        Ok(result.into_iter().next())
    }

    async fn fetch_session(
        &self,
        session_id: Uuid,
        auth_token: &str,
    ) -> Result<CallSession, CallError> {
        let path = format!("/rest/v1/video_calls?id=eq.{}", session_id);

        let result: Vec<CallSession> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| CallError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(CallError::NotFound)
    }
}

/// Room tokens admit participants to a session, so they must not be
/// guessable from the appointment id or a clock. 32 random alphanumerics.
fn generate_room_token() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ROOM_TOKEN_LEN)
        .map(char::from)
        .collect();
    format!("room_{}", token)
}
