use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::error::IntakeError;
use crate::identity::{UserIdCandidate, validate_user_id};
use crate::models::{AuditMetadata, AuditRecord, AuditStatus, EventType};
use crate::repos::audit::redact_sensitive_metadata;
use crate::repos::{AuditStore, AuditUpdate, NewAuditRecord, StoreError};

/// Classification facts copied onto the audit row when it is finalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditOutcome {
    pub record_type: Option<EventType>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub engine: Option<String>,
}

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_audit_record(
        &self,
        user_id: impl Into<UserIdCandidate>,
        raw_text: &str,
        record_type: Option<EventType>,
        value: Option<f64>,
        unit: Option<&str>,
        model_id: Option<&str>,
        metadata: AuditMetadata,
    ) -> Result<AuditRecord, IntakeError> {
        let user_id = validate_user_id(user_id, "create_audit_record")?;
        let raw_text = raw_text.trim();
        if raw_text.is_empty() {
            return Err(IntakeError::EmptyInput);
        }

        let metadata = AuditMetadata {
            extra: redact_sensitive_metadata(&metadata.extra),
            ..metadata
        };

        let record = self
            .store
            .insert_audit_record(NewAuditRecord {
                user_id: user_id.as_uuid(),
                raw_text: raw_text.to_string(),
                record_type,
                value,
                unit: unit.map(ToString::to_string),
                nlp_model: model_id.map(ToString::to_string),
                metadata,
            })
            .await?;

        debug!(user_id = %user_id, audit_id = %record.id, "audit record created");
        Ok(record)
    }

    pub async fn get_audit_record(
        &self,
        user_id: impl Into<UserIdCandidate>,
        audit_id: Uuid,
    ) -> Result<AuditRecord, IntakeError> {
        let user_id = validate_user_id(user_id, "get_audit_record")?;
        self.store
            .get_audit_record(user_id.as_uuid(), audit_id)
            .await?
            .ok_or(IntakeError::PersistenceFailure(StoreError::NotFound("audit record")))
    }

    pub async fn update_audit_status(
        &self,
        user_id: impl Into<UserIdCandidate>,
        audit_id: Uuid,
        status: AuditStatus,
    ) -> Result<AuditRecord, IntakeError> {
        self.update_audit_outcome(user_id, audit_id, status, AuditOutcome::default())
            .await
    }

    /// Moves the record to `status` and fills in whatever `outcome` knows.
    /// `pending` is only ever the initial status, and a record that already
    /// reached a terminal status is left untouched.
    pub async fn update_audit_outcome(
        &self,
        user_id: impl Into<UserIdCandidate>,
        audit_id: Uuid,
        status: AuditStatus,
        outcome: AuditOutcome,
    ) -> Result<AuditRecord, IntakeError> {
        let user_id = validate_user_id(user_id, "update_audit_status")?;
        if status == AuditStatus::Pending {
            return Err(IntakeError::InvalidStatusTransition(status));
        }

        let record = self
            .store
            .update_audit_record(
                user_id.as_uuid(),
                audit_id,
                AuditUpdate {
                    status,
                    record_type: outcome.record_type,
                    value: outcome.value,
                    unit: outcome.unit,
                    nlp_model: outcome.engine,
                },
            )
            .await
            .map_err(|err| match err {
                StoreError::TerminalStatus(_) => IntakeError::InvalidStatusTransition(status),
                other => IntakeError::PersistenceFailure(other),
            })?;

        debug!(
            user_id = %user_id,
            audit_id = %audit_id,
            status = status.as_str(),
            "audit record updated"
        );
        Ok(record)
    }
}
