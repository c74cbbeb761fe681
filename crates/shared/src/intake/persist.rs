use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::error::IntakeError;
use crate::identity::{UserIdCandidate, validate_user_id};
use crate::models::{CaptureMethod, EventData, EventType, VoiceEvent};
use crate::repos::{EventStore, NewVoiceEvent};

#[derive(Clone)]
pub struct EventPersister {
    store: Arc<dyn EventStore>,
}

impl EventPersister {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Writes the immutable event row that closes out an intake.
    pub async fn create_voice_event(
        &self,
        user_id: impl Into<UserIdCandidate>,
        event_type: EventType,
        event_data: &EventData,
        event_time: DateTime<Utc>,
        audit_id: Uuid,
        capture_method: CaptureMethod,
    ) -> Result<VoiceEvent, IntakeError> {
        let user_id = validate_user_id(user_id, "create_voice_event")?;
        if event_data.event_type() != event_type {
            return Err(IntakeError::EventTypeMismatch {
                expected: event_type,
                actual: event_data.event_type(),
            });
        }

        let event = self
            .store
            .insert_voice_event(NewVoiceEvent {
                user_id: user_id.as_uuid(),
                event_type,
                event_data: event_data.data_value(),
                event_time,
                source_record_id: audit_id,
                capture_method,
            })
            .await?;

        debug!(
            user_id = %user_id,
            audit_id = %audit_id,
            event_id = %event.id,
            event_type = %event_type,
            "voice event persisted"
        );
        Ok(event)
    }
}
