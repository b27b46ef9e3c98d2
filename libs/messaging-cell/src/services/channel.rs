// libs/messaging-cell/src/services/channel.rs
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;

use appointment_cell::models::Appointment;

use crate::models::{Message, MessageError, SendMessageRequest};

/// Ordered, per-appointment message threads with read-state. Persistence
/// only; notification fan-out on new messages belongs to a collaborator
/// listening on message creation.
pub struct MessageChannelService {
    supabase: SupabaseClient,
}

impl MessageChannelService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Append a message to an appointment's thread. The sender is the
    /// authenticated caller, and {sender, receiver} must be exactly the
    /// appointment's {patient, doctor} in either direction.
    pub async fn send(
        &self,
        user: &User,
        request: SendMessageRequest,
        auth_token: &str,
    ) -> Result<Message, MessageError> {
        if request.content.trim().is_empty() {
            return Err(MessageError::EmptyBody);
        }

        let sender_id = parse_user_id(user)?;

        let appointment = self
            .get_appointment(request.appointment_id, auth_token)
            .await?;

        let pair_matches = (sender_id == appointment.patient_id
            && request.receiver_id == appointment.doctor_id)
            || (sender_id == appointment.doctor_id
                && request.receiver_id == appointment.patient_id);

        if !pair_matches {
            return Err(MessageError::Forbidden(
                "Sender and receiver must be the appointment participants".to_string(),
            ));
        }

        // created_at is left to the store so thread order follows the
        // transaction boundary, not the sender's clock.
        let body = json!({
            "appointment_id": request.appointment_id,
            "sender_id": sender_id,
            "receiver_id": request.receiver_id,
            "content": request.content,
            "is_read": false,
        });

        let created: Vec<Message> = self
            .supabase
            .insert("/rest/v1/messages", Some(auth_token), body)
            .await
            .map_err(|e| MessageError::DatabaseError(e.to_string()))?;

        let message = created
            .into_iter()
            .next()
            .ok_or_else(|| MessageError::DatabaseError("Insert returned no row".to_string()))?;

        info!(
            "Message {} sent in appointment {} thread",
            message.id, message.appointment_id
        );
        Ok(message)
    }

    /// Full thread for an appointment, ascending by creation time.
    /// Participant-only; restartable pull.
    pub async fn list_thread(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<Vec<Message>, MessageError> {
        let user_id = parse_user_id(user)?;

        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        if !appointment.is_participant(user_id) {
            return Err(MessageError::Forbidden(
                "Not a participant of this appointment".to_string(),
            ));
        }

        let path = format!(
            "/rest/v1/messages?appointment_id=eq.{}&order=created_at.asc",
            appointment_id
        );

        let messages: Vec<Message> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| MessageError::DatabaseError(e.to_string()))?;

        debug!(
            "Thread for appointment {} has {} messages",
            appointment_id,
            messages.len()
        );
        Ok(messages)
    }

    /// Flip `is_read` for a message the caller received. The update is
    /// filtered on receiver and unread state, so repeated calls, calls by
    /// the sender, or calls on an already-read message match zero rows and
    /// succeed as no-ops: read state is monotone.
    pub async fn mark_read(
        &self,
        message_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<(), MessageError> {
        let reader_id = parse_user_id(user)?;

        let path = format!(
            "/rest/v1/messages?id=eq.{}&receiver_id=eq.{}&is_read=eq.false",
            message_id, reader_id
        );
        let body = json!({ "is_read": true });

        let updated: Vec<Message> = self
            .supabase
            .update(&path, Some(auth_token), body)
            .await
            .map_err(|e| MessageError::DatabaseError(e.to_string()))?;

        if updated.is_empty() {
            debug!(
                "mark_read on message {} by {} matched no rows (no-op)",
                message_id, reader_id
            );
        }

        Ok(())
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, MessageError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let result: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| MessageError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or(MessageError::AppointmentNotFound)
    }
}

fn parse_user_id(user: &User) -> Result<Uuid, MessageError> {
    user.id
        .parse::<Uuid>()
        .map_err(|_| MessageError::ValidationError("Invalid user ID format".to_string()))
}
