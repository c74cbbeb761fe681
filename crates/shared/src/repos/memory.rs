use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::models::{AuditRecord, AuditStatus, RegistryEntry, VoiceEvent};

use super::{
    AuditStore, AuditUpdate, EventStore, NewAuditRecord, NewRegistryEntry, NewVoiceEvent,
    RegistryStore, StoreError, StoreFuture,
};

#[derive(Default)]
struct MemoryState {
    audit_records: Vec<AuditRecord>,
    registry: Vec<RegistryEntry>,
    events: Vec<VoiceEvent>,
    write_attempts: usize,
}

/// In-process store for tests and the offline CLI. When bound to a caller it
/// rejects other users' rows the way the Postgres policies do.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    bound_user: Option<Uuid>,
    fail_event_inserts: bool,
    fail_registry_increments: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same backing state, but every operation is checked against `user_id`.
    pub fn bound_to(&self, user_id: Uuid) -> Self {
        Self {
            state: Arc::clone(&self.state),
            bound_user: Some(user_id),
            fail_event_inserts: self.fail_event_inserts,
            fail_registry_increments: self.fail_registry_increments,
        }
    }

    pub fn with_failing_event_inserts(mut self) -> Self {
        self.fail_event_inserts = true;
        self
    }

    pub fn with_failing_registry_increments(mut self) -> Self {
        self.fail_registry_increments = true;
        self
    }

    pub fn write_attempts(&self) -> usize {
        self.lock_state().write_attempts
    }

    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.lock_state().audit_records.clone()
    }

    pub fn registry_entries(&self) -> Vec<RegistryEntry> {
        self.lock_state().registry.clone()
    }

    pub fn voice_events(&self) -> Vec<VoiceEvent> {
        self.lock_state().events.clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn authorize(&self, user_id: Uuid) -> Result<(), StoreError> {
        match self.bound_user {
            Some(bound) if bound != user_id => Err(StoreError::PermissionDenied(format!(
                "row owned by {user_id} is not visible to {bound}"
            ))),
            _ => Ok(()),
        }
    }
}

impl AuditStore for MemoryStore {
    fn insert_audit_record<'a>(&'a self, record: NewAuditRecord) -> StoreFuture<'a, AuditRecord> {
        Box::pin(async move {
            let mut state = self.lock_state();
            state.write_attempts += 1;
            self.authorize(record.user_id)?;

            let now = Utc::now();
            let stored = AuditRecord {
                id: Uuid::new_v4(),
                user_id: record.user_id,
                raw_text: record.raw_text,
                record_type: record.record_type,
                value: record.value,
                unit: record.unit,
                status: AuditStatus::Pending,
                nlp_model: record.nlp_model,
                metadata: record.metadata,
                created_at: now,
                updated_at: now,
            };
            state.audit_records.push(stored.clone());
            Ok(stored)
        })
    }

    fn update_audit_record<'a>(
        &'a self,
        user_id: Uuid,
        id: Uuid,
        update: AuditUpdate,
    ) -> StoreFuture<'a, AuditRecord> {
        Box::pin(async move {
            let mut state = self.lock_state();
            state.write_attempts += 1;
            self.authorize(user_id)?;

            let record = state
                .audit_records
                .iter_mut()
                .find(|record| record.id == id && record.user_id == user_id)
                .ok_or(StoreError::NotFound("audit record"))?;
            if record.status.is_terminal() {
                return Err(StoreError::TerminalStatus(record.status));
            }

            record.status = update.status;
            if let Some(record_type) = update.record_type {
                record.record_type = Some(record_type);
            }
            if let Some(value) = update.value {
                record.value = Some(value);
            }
            if let Some(unit) = update.unit {
                record.unit = Some(unit);
            }
            if let Some(nlp_model) = update.nlp_model {
                record.nlp_model = Some(nlp_model);
            }
            record.updated_at = Utc::now();
            Ok(record.clone())
        })
    }

    fn get_audit_record<'a>(
        &'a self,
        user_id: Uuid,
        id: Uuid,
    ) -> StoreFuture<'a, Option<AuditRecord>> {
        Box::pin(async move {
            self.authorize(user_id)?;
            Ok(self
                .lock_state()
                .audit_records
                .iter()
                .find(|record| record.id == id && record.user_id == user_id)
                .cloned())
        })
    }
}

impl RegistryStore for MemoryStore {
    fn find_registry_entry<'a>(
        &'a self,
        user_id: Uuid,
        product_key: &'a str,
    ) -> StoreFuture<'a, Option<RegistryEntry>> {
        Box::pin(async move {
            self.authorize(user_id)?;
            Ok(self
                .lock_state()
                .registry
                .iter()
                .find(|entry| entry.user_id == user_id && entry.product_key == product_key)
                .cloned())
        })
    }

    fn list_registry_entries<'a>(&'a self, user_id: Uuid) -> StoreFuture<'a, Vec<RegistryEntry>> {
        Box::pin(async move {
            self.authorize(user_id)?;
            let mut entries: Vec<RegistryEntry> = self
                .lock_state()
                .registry
                .iter()
                .filter(|entry| entry.user_id == user_id)
                .cloned()
                .collect();
            entries.sort_by(|left, right| {
                right
                    .times_logged
                    .cmp(&left.times_logged)
                    .then_with(|| left.product_key.cmp(&right.product_key))
            });
            Ok(entries)
        })
    }

    fn upsert_registry_entry<'a>(
        &'a self,
        entry: NewRegistryEntry,
    ) -> StoreFuture<'a, RegistryEntry> {
        Box::pin(async move {
            let mut state = self.lock_state();
            state.write_attempts += 1;
            self.authorize(entry.user_id)?;

            let now = Utc::now();
            if let Some(existing) = state.registry.iter_mut().find(|existing| {
                existing.user_id == entry.user_id && existing.product_key == entry.product_key
            }) {
                existing.event_type = entry.event_type;
                existing.product_name = entry.product_name;
                if entry.brand.is_some() {
                    existing.brand = entry.brand;
                }
                existing.times_logged += 1;
                existing.updated_at = now;
                return Ok(existing.clone());
            }

            let stored = RegistryEntry {
                id: Uuid::new_v4(),
                user_id: entry.user_id,
                product_key: entry.product_key,
                event_type: entry.event_type,
                product_name: entry.product_name,
                brand: entry.brand,
                times_logged: 1,
                created_at: now,
                updated_at: now,
            };
            state.registry.push(stored.clone());
            Ok(stored)
        })
    }

    fn increment_registry_usage<'a>(
        &'a self,
        user_id: Uuid,
        id: Uuid,
    ) -> StoreFuture<'a, RegistryEntry> {
        Box::pin(async move {
            let mut state = self.lock_state();
            state.write_attempts += 1;
            self.authorize(user_id)?;
            if self.fail_registry_increments {
                return Err(StoreError::InvalidData(
                    "registry usage update rejected by test store".to_string(),
                ));
            }

            let entry = state
                .registry
                .iter_mut()
                .find(|entry| entry.id == id && entry.user_id == user_id)
                .ok_or(StoreError::NotFound("registry entry"))?;
            entry.times_logged += 1;
            entry.updated_at = Utc::now();
            Ok(entry.clone())
        })
    }
}

impl EventStore for MemoryStore {
    fn insert_voice_event<'a>(&'a self, event: NewVoiceEvent) -> StoreFuture<'a, VoiceEvent> {
        Box::pin(async move {
            let mut state = self.lock_state();
            state.write_attempts += 1;
            self.authorize(event.user_id)?;
            if self.fail_event_inserts {
                return Err(StoreError::InvalidData(
                    "voice event insert rejected by test store".to_string(),
                ));
            }
            if !state
                .audit_records
                .iter()
                .any(|record| record.id == event.source_record_id && record.user_id == event.user_id)
            {
                return Err(StoreError::NotFound("source audit record"));
            }

            let stored = VoiceEvent {
                id: Uuid::new_v4(),
                user_id: event.user_id,
                event_type: event.event_type,
                event_data: event.event_data,
                event_time: event.event_time,
                source_record_id: event.source_record_id,
                capture_method: event.capture_method,
                created_at: Utc::now(),
            };
            state.events.push(stored.clone());
            Ok(stored)
        })
    }

    fn list_voice_events<'a>(
        &'a self,
        user_id: Uuid,
        limit: usize,
    ) -> StoreFuture<'a, Vec<VoiceEvent>> {
        Box::pin(async move {
            self.authorize(user_id)?;
            let mut events: Vec<VoiceEvent> = self
                .lock_state()
                .events
                .iter()
                .filter(|event| event.user_id == user_id)
                .cloned()
                .collect();
            events.sort_by(|left, right| right.event_time.cmp(&left.event_time));
            events.truncate(limit);
            Ok(events)
        })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::MemoryStore;
    use crate::models::EventType;
    use crate::repos::{NewRegistryEntry, RegistryStore, StoreError};

    fn registry_entry(user_id: Uuid, key: &str, brand: Option<&str>) -> NewRegistryEntry {
        NewRegistryEntry {
            user_id,
            product_key: key.to_string(),
            event_type: EventType::Supplement,
            product_name: "LMNT Citrus Salt".to_string(),
            brand: brand.map(ToString::to_string),
        }
    }

    #[tokio::test]
    async fn upsert_counts_repeat_confirmations_on_one_row() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();

        let first = store
            .upsert_registry_entry(registry_entry(user_id, "citrus lmnt", Some("LMNT")))
            .await
            .expect("first upsert");
        let second = store
            .upsert_registry_entry(registry_entry(user_id, "citrus lmnt", None))
            .await
            .expect("second upsert");

        assert_eq!(first.id, second.id);
        assert_eq!(second.times_logged, 2);
        assert_eq!(second.brand.as_deref(), Some("LMNT"));
        assert_eq!(store.registry_entries().len(), 1);
    }

    #[tokio::test]
    async fn bound_store_denies_other_users_rows() {
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let store = MemoryStore::new().bound_to(intruder);

        let error = store
            .upsert_registry_entry(registry_entry(owner, "citrus lmnt", None))
            .await
            .expect_err("foreign write should be denied");
        assert!(matches!(error, StoreError::PermissionDenied(_)));

        let error = store
            .list_registry_entries(owner)
            .await
            .expect_err("foreign read should be denied");
        assert!(matches!(error, StoreError::PermissionDenied(_)));
        assert!(store.registry_entries().is_empty());
    }
}
