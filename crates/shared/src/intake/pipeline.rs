use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::audit::{AuditOutcome, AuditRecorder};
use super::error::IntakeError;
use super::persist::EventPersister;
use crate::identity::{UserIdCandidate, ValidatedUserId, validate_user_id};
use crate::llm::{ClassificationContext, EventClassifier, LlmGateway};
use crate::models::{
    AuditMetadata, AuditStatus, CaptureMethod, DoseData, EventData, EventType, FoodData,
    ParsedEvent, ProductCandidate, RegistryEntry, VoiceEvent,
};
use crate::registry::matcher::{RegistryMatch, RegistryMatcher};
use crate::registry::normalize::normalize_product_key;
use crate::repos::{AuditStore, EventStore, NewRegistryEntry, RegistryStore};
use crate::search::gate::should_search;
use crate::search::resolver::ProductResolver;
use crate::timezone::{DEFAULT_USER_TIME_ZONE, normalize_time_zone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeSource {
    UserRegistry,
    Classifier,
}

impl OutcomeSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserRegistry => "user_registry",
            Self::Classifier => "classifier",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntakeRequest {
    pub user_id: UserIdCandidate,
    pub raw_text: String,
    pub capture_method: CaptureMethod,
    /// IANA zone for resolving times the model reports without an offset.
    pub time_zone: Option<String>,
    pub now: Option<DateTime<Utc>>,
    pub history_count: u32,
    pub metadata: BTreeMap<String, String>,
}

impl IntakeRequest {
    pub fn new(user_id: impl Into<UserIdCandidate>, raw_text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            raw_text: raw_text.into(),
            capture_method: CaptureMethod::default(),
            time_zone: None,
            now: None,
            history_count: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_capture_method(mut self, capture_method: CaptureMethod) -> Self {
        self.capture_method = capture_method;
        self
    }

    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = Some(time_zone.into());
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

/// Everything needed to finish an intake once the user picks a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub audit_id: Uuid,
    pub raw_text: String,
    pub parsed: ParsedEvent,
    pub capture_method: CaptureMethod,
    pub model: String,
    pub product_options: Vec<ProductCandidate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntakeOutcome {
    pub audit_id: Uuid,
    pub complete: bool,
    pub source: OutcomeSource,
    pub event_type: EventType,
    pub event: Option<VoiceEvent>,
    pub parsed: Option<ParsedEvent>,
    pub registry_match: Option<RegistryMatch>,
    pub search_performed: bool,
    pub product_options: Vec<ProductCandidate>,
    pub pending: Option<PendingConfirmation>,
}

#[derive(Debug, Default)]
struct StageTimings {
    registry_ms: u64,
    classify_ms: u64,
    search_ms: u64,
    persist_ms: u64,
}

#[derive(Clone)]
pub struct IntakePipeline {
    audit: AuditRecorder,
    matcher: RegistryMatcher,
    registry: Arc<dyn RegistryStore>,
    classifier: EventClassifier,
    resolver: ProductResolver,
    persister: EventPersister,
    default_time_zone: String,
}

impl IntakePipeline {
    pub fn new<S>(store: Arc<S>, gateway: Arc<dyn LlmGateway>, resolver: ProductResolver) -> Self
    where
        S: AuditStore + RegistryStore + EventStore + 'static,
    {
        let registry: Arc<dyn RegistryStore> = store.clone();
        Self {
            audit: AuditRecorder::new(store.clone()),
            matcher: RegistryMatcher::new(Arc::clone(&registry)),
            registry,
            classifier: EventClassifier::new(gateway),
            resolver,
            persister: EventPersister::new(store),
            default_time_zone: DEFAULT_USER_TIME_ZONE.to_string(),
        }
    }

    pub fn with_fuzzy_min_score(mut self, min_score: f64) -> Self {
        self.matcher = self.matcher.with_min_fuzzy_score(min_score);
        self
    }

    pub fn with_default_time_zone(mut self, time_zone: &str) -> Self {
        if let Some(normalized) = normalize_time_zone(time_zone) {
            self.default_time_zone = normalized;
        }
        self
    }

    /// Runs one input from raw text to either a persisted event or a pending
    /// product confirmation.
    pub async fn submit(&self, request: IntakeRequest) -> Result<IntakeOutcome, IntakeError> {
        let started = Instant::now();
        let IntakeRequest {
            user_id,
            raw_text,
            capture_method,
            time_zone,
            now,
            history_count,
            metadata,
        } = request;

        let user_id = validate_user_id(user_id, "submit")?;
        let raw_text = raw_text.trim().to_string();
        if raw_text.is_empty() {
            return Err(IntakeError::EmptyInput);
        }
        let now = now.unwrap_or_else(Utc::now);
        let time_zone = time_zone
            .as_deref()
            .and_then(normalize_time_zone)
            .unwrap_or_else(|| self.default_time_zone.clone());

        let audit = self
            .audit
            .create_audit_record(
                &user_id,
                &raw_text,
                None,
                None,
                None,
                None,
                AuditMetadata {
                    capture_method,
                    history_count,
                    model: None,
                    extra: metadata,
                },
            )
            .await?;

        let mut timings = StageTimings::default();
        let result = self
            .run_stages(
                &user_id,
                audit.id,
                &raw_text,
                capture_method,
                now,
                &time_zone,
                &mut timings,
            )
            .await;
        let total_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(outcome) => info!(
                user_id = %user_id,
                audit_id = %audit.id,
                source = outcome.source.as_str(),
                event_type = %outcome.event_type,
                complete = outcome.complete,
                search_performed = outcome.search_performed,
                candidates = outcome.product_options.len(),
                registry_ms = timings.registry_ms,
                classify_ms = timings.classify_ms,
                search_ms = timings.search_ms,
                persist_ms = timings.persist_ms,
                total_ms,
                "intake pipeline latency breakdown"
            ),
            Err(err) => {
                warn!(
                    user_id = %user_id,
                    audit_id = %audit.id,
                    error_kind = err.kind(),
                    error = %err,
                    registry_ms = timings.registry_ms,
                    classify_ms = timings.classify_ms,
                    search_ms = timings.search_ms,
                    persist_ms = timings.persist_ms,
                    total_ms,
                    "intake pipeline failed"
                );
                self.mark_failed(&user_id, audit.id).await;
            }
        }

        result
    }

    /// Finishes a pending intake. `selection` indexes `pending.product_options`;
    /// `None` keeps the model's own item. Only an audit record still awaiting
    /// clarification can be confirmed, so a replayed confirmation writes nothing.
    pub async fn confirm(
        &self,
        user_id: impl Into<UserIdCandidate>,
        pending: PendingConfirmation,
        selection: Option<usize>,
    ) -> Result<IntakeOutcome, IntakeError> {
        let user_id = validate_user_id(user_id, "confirm")?;
        let chosen = match selection {
            Some(index) => Some(pending.product_options.get(index).ok_or(
                IntakeError::CandidateOutOfRange {
                    index,
                    available: pending.product_options.len(),
                },
            )?),
            None => None,
        };

        let data = match chosen {
            Some(candidate) => apply_candidate(&pending.parsed.data, candidate),
            None => pending.parsed.data.clone(),
        };

        let audit = self.audit.get_audit_record(&user_id, pending.audit_id).await?;
        if audit.status != AuditStatus::AwaitingUserClarification {
            warn!(
                user_id = %user_id,
                audit_id = %pending.audit_id,
                status = audit.status.as_str(),
                "confirmation rejected; intake is not awaiting clarification"
            );
            return Err(IntakeError::InvalidStatusTransition(
                AuditStatus::AwaitingUserClarificationSuccess,
            ));
        }

        let result = self
            .finish_confirmation(&user_id, &pending, &audit.raw_text, chosen, data)
            .await;
        match &result {
            Ok(outcome) => info!(
                user_id = %user_id,
                audit_id = %pending.audit_id,
                event_type = %outcome.event_type,
                selection = selection.map(|index| index as i64).unwrap_or(-1),
                "intake confirmed"
            ),
            Err(err) => {
                warn!(
                    user_id = %user_id,
                    audit_id = %pending.audit_id,
                    error_kind = err.kind(),
                    error = %err,
                    "intake confirmation failed"
                );
                self.mark_failed(&user_id, pending.audit_id).await;
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_stages(
        &self,
        user_id: &ValidatedUserId,
        audit_id: Uuid,
        raw_text: &str,
        capture_method: CaptureMethod,
        now: DateTime<Utc>,
        time_zone: &str,
        timings: &mut StageTimings,
    ) -> Result<IntakeOutcome, IntakeError> {
        let registry_started = Instant::now();
        let registry_match = self.matcher.lookup(user_id, raw_text).await?;
        timings.registry_ms = registry_started.elapsed().as_millis() as u64;

        if let Some(found) = registry_match {
            match registry_event_data(&found.entry) {
                Some(data) => {
                    return self
                        .complete_from_registry(
                            user_id,
                            audit_id,
                            found,
                            data,
                            capture_method,
                            now,
                            timings,
                        )
                        .await;
                }
                None => warn!(
                    user_id = %user_id,
                    registry_entry_id = %found.entry.id,
                    event_type = %found.entry.event_type,
                    "registry entry does not describe a product; classifying instead"
                ),
            }
        }

        let classify_started = Instant::now();
        let mut context = ClassificationContext::new(now, time_zone);
        context.requester_id = Some(audit_id.to_string());
        let classified = self.classifier.classify(raw_text, &context).await?;
        timings.classify_ms = classify_started.elapsed().as_millis() as u64;

        let parsed = classified.parsed;
        let event_type = parsed.event_type;
        let model_text = model_item_text(&parsed.data);

        let search_performed = event_type.is_product()
            && should_search(
                event_type,
                Some(&parsed.data.data_value()),
                parsed.confidence,
                raw_text,
                &model_text,
            );

        let mut product_options = Vec::new();
        if search_performed {
            let search_started = Instant::now();
            let query = if model_text.is_empty() {
                raw_text
            } else {
                model_text.as_str()
            };
            product_options = self.resolver.resolve(query, event_type).await;
            timings.search_ms = search_started.elapsed().as_millis() as u64;
        }

        let (value, unit) = parsed.data.primary_measure();
        let outcome = AuditOutcome {
            record_type: Some(event_type),
            value,
            unit,
            engine: Some(classified.model.clone()),
        };

        if !product_options.is_empty() {
            self.audit
                .update_audit_outcome(
                    user_id,
                    audit_id,
                    AuditStatus::AwaitingUserClarification,
                    outcome,
                )
                .await?;

            return Ok(IntakeOutcome {
                audit_id,
                complete: false,
                source: OutcomeSource::Classifier,
                event_type,
                event: None,
                parsed: Some(parsed.clone()),
                registry_match: None,
                search_performed,
                product_options: product_options.clone(),
                pending: Some(PendingConfirmation {
                    audit_id,
                    raw_text: raw_text.to_string(),
                    parsed,
                    capture_method,
                    model: classified.model,
                    product_options,
                }),
            });
        }

        let persist_started = Instant::now();
        let event = self
            .persister
            .create_voice_event(
                user_id,
                event_type,
                &parsed.data,
                parsed.event_time,
                audit_id,
                capture_method,
            )
            .await?;
        self.audit
            .update_audit_outcome(user_id, audit_id, AuditStatus::Success, outcome)
            .await?;
        timings.persist_ms = persist_started.elapsed().as_millis() as u64;

        Ok(IntakeOutcome {
            audit_id,
            complete: true,
            source: OutcomeSource::Classifier,
            event_type,
            event: Some(event),
            parsed: Some(parsed),
            registry_match: None,
            search_performed,
            product_options: Vec::new(),
            pending: None,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn complete_from_registry(
        &self,
        user_id: &ValidatedUserId,
        audit_id: Uuid,
        found: RegistryMatch,
        data: EventData,
        capture_method: CaptureMethod,
        now: DateTime<Utc>,
        timings: &mut StageTimings,
    ) -> Result<IntakeOutcome, IntakeError> {
        let persist_started = Instant::now();
        let event_type = found.entry.event_type;
        let event = self
            .persister
            .create_voice_event(user_id, event_type, &data, now, audit_id, capture_method)
            .await?;

        // The event is already written; a failed usage bump is only logged.
        let entry = match self
            .registry
            .increment_registry_usage(user_id.as_uuid(), found.entry.id)
            .await
        {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    user_id = %user_id,
                    audit_id = %audit_id,
                    registry_entry_id = %found.entry.id,
                    error = %err,
                    "registry usage count not updated"
                );
                found.entry.clone()
            }
        };

        let (value, unit) = data.primary_measure();
        self.audit
            .update_audit_outcome(
                user_id,
                audit_id,
                AuditStatus::Success,
                AuditOutcome {
                    record_type: Some(event_type),
                    value,
                    unit,
                    engine: Some(found.source.as_str().to_string()),
                },
            )
            .await?;
        timings.persist_ms = persist_started.elapsed().as_millis() as u64;

        Ok(IntakeOutcome {
            audit_id,
            complete: true,
            source: OutcomeSource::UserRegistry,
            event_type,
            event: Some(event),
            parsed: None,
            registry_match: Some(RegistryMatch { entry, ..found }),
            search_performed: false,
            product_options: Vec::new(),
            pending: None,
        })
    }

    async fn finish_confirmation(
        &self,
        user_id: &ValidatedUserId,
        pending: &PendingConfirmation,
        raw_text: &str,
        chosen: Option<&ProductCandidate>,
        data: EventData,
    ) -> Result<IntakeOutcome, IntakeError> {
        let event_type = data.event_type();
        let event = self
            .persister
            .create_voice_event(
                user_id,
                event_type,
                &data,
                pending.parsed.event_time,
                pending.audit_id,
                pending.capture_method,
            )
            .await?;

        let product_key = normalize_product_key(raw_text);
        let product_name = chosen
            .map(ProductCandidate::display_name)
            .or_else(|| data.item_label().map(ToString::to_string));
        if event_type.is_product()
            && !product_key.is_empty()
            && let Some(product_name) = product_name
        {
            self.registry
                .upsert_registry_entry(NewRegistryEntry {
                    user_id: user_id.as_uuid(),
                    product_key,
                    event_type,
                    product_name,
                    brand: data.brand().map(ToString::to_string),
                })
                .await?;
        }

        let (value, unit) = data.primary_measure();
        self.audit
            .update_audit_outcome(
                user_id,
                pending.audit_id,
                AuditStatus::AwaitingUserClarificationSuccess,
                AuditOutcome {
                    record_type: Some(event_type),
                    value,
                    unit,
                    engine: Some(pending.model.clone()),
                },
            )
            .await?;

        Ok(IntakeOutcome {
            audit_id: pending.audit_id,
            complete: true,
            source: OutcomeSource::Classifier,
            event_type,
            event: Some(event),
            parsed: Some(pending.parsed.clone()),
            registry_match: None,
            search_performed: true,
            product_options: Vec::new(),
            pending: None,
        })
    }

    async fn mark_failed(&self, user_id: &ValidatedUserId, audit_id: Uuid) {
        if let Err(err) = self
            .audit
            .update_audit_status(user_id, audit_id, AuditStatus::Failed)
            .await
        {
            warn!(
                user_id = %user_id,
                audit_id = %audit_id,
                error = %err,
                "could not mark audit record failed"
            );
        }
    }
}

/// Event payload implied by a registry entry alone.
fn registry_event_data(entry: &RegistryEntry) -> Option<EventData> {
    if !entry.event_type.is_product() {
        return None;
    }
    EventData::Food(FoodData {
        description: entry.product_name.clone(),
        brand: entry.brand.clone(),
        serving_size: None,
        calories: None,
        carbs_g: None,
        protein_g: None,
        fat_g: None,
    })
    .retyped_product(entry.event_type)
}

/// Brand plus item name as the model wrote them, for drift checks and search.
fn model_item_text(data: &EventData) -> String {
    let label = data.item_label().unwrap_or_default().trim();
    match data.brand().map(str::trim).filter(|brand| !brand.is_empty()) {
        Some(brand) if !label.to_lowercase().contains(&brand.to_lowercase()) => {
            format!("{brand} {label}").trim().to_string()
        }
        _ => label.to_string(),
    }
}

fn apply_candidate(data: &EventData, candidate: &ProductCandidate) -> EventData {
    match data {
        EventData::Food(food) => EventData::Food(FoodData {
            description: candidate.name.clone(),
            brand: candidate.brand.clone().or_else(|| food.brand.clone()),
            serving_size: candidate
                .serving_size
                .clone()
                .or_else(|| food.serving_size.clone()),
            calories: candidate_fact(candidate, "calories").or(food.calories),
            carbs_g: candidate_fact(candidate, "carbs_g").or(food.carbs_g),
            protein_g: candidate_fact(candidate, "protein_g").or(food.protein_g),
            fat_g: candidate_fact(candidate, "fat_g").or(food.fat_g),
        }),
        EventData::Supplement(dose) => EventData::Supplement(dose_from_candidate(dose, candidate)),
        EventData::Medication(dose) => EventData::Medication(dose_from_candidate(dose, candidate)),
        other => other.clone(),
    }
}

fn dose_from_candidate(dose: &DoseData, candidate: &ProductCandidate) -> DoseData {
    DoseData {
        name: candidate.name.clone(),
        brand: candidate.brand.clone().or_else(|| dose.brand.clone()),
        dosage: dose.dosage,
        units: dose.units.clone(),
    }
}

fn candidate_fact(candidate: &ProductCandidate, key: &str) -> Option<f64> {
    candidate
        .facts
        .get(key)
        .and_then(|value| value.trim().parse::<f64>().ok())
}
