use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use shared::identity::UserIdCandidate;
use shared::intake::{IntakeError, IntakePipeline, IntakeRequest, OutcomeSource};
use shared::llm::{
    LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
};
use shared::models::{AuditStatus, EventData, EventType, ProductCandidate};
use shared::registry::RegistryMatchSource;
use shared::repos::{MemoryStore, NewRegistryEntry, RegistryStore};
use shared::search::{CatalogFuture, ProductCatalog, ProductResolver, SearchError};
use tokio::sync::Mutex;
use uuid::Uuid;

struct StubGateway {
    replies: Mutex<VecDeque<Result<String, LlmGatewayError>>>,
    seen_requests: Mutex<Vec<LlmGatewayRequest>>,
    calls: AtomicUsize,
}

impl StubGateway {
    fn replying(replies: Vec<Result<String, LlmGatewayError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from(replies)),
            seen_requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn silent() -> Arc<Self> {
        Self::replying(Vec::new())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmGateway for StubGateway {
    fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_requests.lock().await.push(request);
            let reply = self.replies.lock().await.pop_front().unwrap_or_else(|| {
                Err(LlmGatewayError::ProviderFailure(
                    "exhausted_test_replies".to_string(),
                ))
            })?;
            Ok(LlmGatewayResponse {
                model: "stub-model".to_string(),
                provider_request_id: None,
                content: reply,
                usage: None,
            })
        })
    }
}

struct StubCatalog {
    candidates: Vec<ProductCandidate>,
    fail: bool,
    calls: AtomicUsize,
}

impl StubCatalog {
    fn with(candidates: Vec<ProductCandidate>) -> Arc<Self> {
        Arc::new(Self {
            candidates,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            candidates: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProductCatalog for StubCatalog {
    fn name(&self) -> &'static str {
        "stub_catalog"
    }

    fn serves(&self, event_type: EventType) -> bool {
        event_type.is_product()
    }

    fn search<'a>(&'a self, _query: &'a str, _event_type: EventType) -> CatalogFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SearchError::Unavailable {
                    catalog: "stub_catalog",
                });
            }
            Ok(self.candidates.clone())
        })
    }
}

fn pipeline(
    store: &MemoryStore,
    gateway: Arc<StubGateway>,
    catalog: Option<Arc<StubCatalog>>,
) -> IntakePipeline {
    let resolver = match catalog {
        Some(catalog) => ProductResolver::new(vec![catalog as Arc<dyn ProductCatalog>], 5),
        None => ProductResolver::without_catalogs(),
    };
    IntakePipeline::new(Arc::new(store.clone()), gateway, resolver)
}

fn evening_in_los_angeles() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 21, 30, 0)
        .single()
        .expect("valid timestamp")
}

fn request(user_id: Uuid, raw_text: &str) -> IntakeRequest {
    IntakeRequest::new(user_id, raw_text)
        .with_time_zone("America/Los_Angeles")
        .at(evening_in_los_angeles())
}

fn classification(event_type: &str, event_data: serde_json::Value, confidence: u8) -> String {
    json!({
        "event_type": event_type,
        "event_data": event_data,
        "event_time": "2026-10-19T13:45:00-07:00",
        "confidence": confidence,
    })
    .to_string()
}

fn candidate(name: &str, brand: Option<&str>) -> ProductCandidate {
    ProductCandidate {
        source: "stub_catalog".to_string(),
        source_id: name.to_lowercase(),
        name: name.to_string(),
        brand: brand.map(ToString::to_string),
        facts: BTreeMap::from([("calories".to_string(), "100".to_string())]),
        serving_size: Some("170 g".to_string()),
        confidence: 90.0,
    }
}

#[tokio::test]
async fn sauna_range_persists_start_time_and_duration_without_search() {
    let store = MemoryStore::new();
    let gateway = StubGateway::replying(vec![Ok(json!({
        "event_type": "sauna",
        "event_data": { "duration": 25 },
        "event_time": "2026-10-19T14:00:00",
        "confidence": 96,
    })
    .to_string())]);
    let catalog = StubCatalog::with(vec![candidate("Sauna Salt", None)]);
    let user_id = Uuid::new_v4();

    let outcome = pipeline(&store, gateway.clone(), Some(catalog.clone()))
        .submit(request(user_id, "sauna 2-2:25pm"))
        .await
        .expect("sauna should be logged");

    assert!(outcome.complete);
    assert_eq!(outcome.source, OutcomeSource::Classifier);
    assert_eq!(outcome.event_type, EventType::Sauna);
    assert!(!outcome.search_performed);
    assert_eq!(catalog.calls(), 0);

    let event = outcome.event.expect("event persisted");
    assert_eq!(event.event_data["duration"], "25");
    assert_eq!(
        event.event_time,
        Utc.with_ymd_and_hms(2026, 10, 19, 21, 0, 0).unwrap()
    );

    let audit = &store.audit_records()[0];
    assert_eq!(audit.status, AuditStatus::Success);
    assert_eq!(audit.record_type, Some(EventType::Sauna));
    assert_eq!(audit.value, Some(25.0));
    assert_eq!(audit.unit.as_deref(), Some("minutes"));
    assert_eq!(audit.nlp_model.as_deref(), Some("stub-model"));

    let seen = gateway.seen_requests.lock().await;
    assert_eq!(seen[0].context_payload["note"], "sauna 2-2:25pm");
    assert_eq!(seen[0].requester_id.as_deref(), Some(audit.id.to_string().as_str()));
    assert!(seen[0].system_prompt.contains("America/Los_Angeles"));
}

#[tokio::test]
async fn sound_alike_input_resolves_from_registry_without_the_classifier() {
    let store = MemoryStore::new();
    let user_id = Uuid::new_v4();
    store
        .upsert_registry_entry(NewRegistryEntry {
            user_id,
            product_key: "citrus lmnt".to_string(),
            event_type: EventType::Supplement,
            product_name: "LMNT Citrus Salt".to_string(),
            brand: Some("LMNT".to_string()),
        })
        .await
        .expect("seed registry");
    let gateway = StubGateway::silent();

    let outcome = pipeline(&store, gateway.clone(), None)
        .submit(request(user_id, "citrus element"))
        .await
        .expect("registry hit should complete");

    assert!(outcome.complete);
    assert_eq!(outcome.source, OutcomeSource::UserRegistry);
    assert_eq!(outcome.event_type, EventType::Supplement);
    assert_eq!(gateway.calls(), 0);

    let registry_match = outcome.registry_match.expect("match reported");
    assert_eq!(registry_match.source, RegistryMatchSource::UserRegistryFuzzy);
    assert_eq!(registry_match.entry.times_logged, 2);

    let event = outcome.event.expect("event persisted");
    assert_eq!(event.event_data["name"], "LMNT Citrus Salt");
    assert_eq!(event.event_data["brand"], "LMNT");
    assert_eq!(event.event_time, evening_in_los_angeles());

    let audit = &store.audit_records()[0];
    assert_eq!(audit.status, AuditStatus::Success);
    assert_eq!(audit.nlp_model.as_deref(), Some("user_registry_fuzzy"));
}

#[tokio::test]
async fn rejected_identity_writes_nothing_and_calls_nothing() {
    let store = MemoryStore::new();
    let gateway = StubGateway::silent();
    let pipeline = pipeline(&store, gateway.clone(), None);

    for candidate in [
        UserIdCandidate::Undefined,
        UserIdCandidate::Null,
        UserIdCandidate::from(""),
        UserIdCandidate::from("user-123"),
        UserIdCandidate::from(42_i64),
    ] {
        let err = pipeline
            .submit(IntakeRequest::new(candidate, "coffee with milk"))
            .await
            .expect_err("identity must be rejected");
        assert!(matches!(err, IntakeError::InvalidIdentity(_)), "{err:?}");
    }

    let err = pipeline
        .submit(IntakeRequest::new(Uuid::new_v4(), "   "))
        .await
        .expect_err("blank text must be rejected");
    assert!(matches!(err, IntakeError::EmptyInput));

    assert_eq!(store.write_attempts(), 0);
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn food_waits_for_confirmation_then_learns_the_product() {
    let store = MemoryStore::new();
    let user_id = Uuid::new_v4();
    let gateway = StubGateway::replying(vec![Ok(classification(
        "food",
        json!({ "description": "greek yogurt", "carbs_g": 6 }),
        90,
    ))]);
    let catalog = StubCatalog::with(vec![candidate("Plain Greek Yogurt", Some("Fage"))]);
    let pipeline = pipeline(&store, gateway.clone(), Some(catalog.clone()));

    let first = pipeline
        .submit(request(user_id, "Greek yogurt"))
        .await
        .expect("food should reach confirmation");
    assert!(!first.complete);
    assert!(first.search_performed);
    assert!(first.event.is_none());
    assert_eq!(first.product_options.len(), 1);
    assert_eq!(
        store.audit_records()[0].status,
        AuditStatus::AwaitingUserClarification
    );
    assert!(store.voice_events().is_empty());

    let pending = first.pending.expect("pending confirmation");
    let err = pipeline
        .confirm(user_id, pending.clone(), Some(3))
        .await
        .expect_err("selection beyond the list");
    assert!(matches!(
        err,
        IntakeError::CandidateOutOfRange {
            index: 3,
            available: 1
        }
    ));
    assert!(store.voice_events().is_empty());

    let confirmed = pipeline
        .confirm(user_id, pending, Some(0))
        .await
        .expect("confirmation should persist");
    assert!(confirmed.complete);
    let event = confirmed.event.expect("event persisted");
    assert_eq!(event.event_data["description"], "Plain Greek Yogurt");
    assert_eq!(event.event_data["brand"], "Fage");
    assert_eq!(event.event_data["calories"], 100.0);
    assert_eq!(event.event_data["carbs_g"], 6.0);
    assert_eq!(
        event.event_time,
        Utc.with_ymd_and_hms(2026, 10, 19, 20, 45, 0).unwrap()
    );
    assert_eq!(
        store.audit_records()[0].status,
        AuditStatus::AwaitingUserClarificationSuccess
    );

    let registry = store.registry_entries();
    assert_eq!(registry.len(), 1);
    assert_eq!(registry[0].product_key, "greek yogurt");
    assert_eq!(registry[0].product_name, "Fage Plain Greek Yogurt");
    assert_eq!(registry[0].times_logged, 1);

    let again = pipeline
        .submit(request(user_id, "greek yogurt!"))
        .await
        .expect("second log should hit the registry");
    assert!(again.complete);
    assert_eq!(again.source, OutcomeSource::UserRegistry);
    assert_eq!(
        again.registry_match.map(|found| found.source),
        Some(RegistryMatchSource::UserRegistry)
    );
    assert_eq!(gateway.calls(), 1);
    assert_eq!(catalog.calls(), 1);

    let registry = store.registry_entries();
    assert_eq!(registry.len(), 1);
    assert_eq!(registry[0].times_logged, 2);
    assert_eq!(store.voice_events().len(), 2);
}

#[tokio::test]
async fn unbranded_supplement_saves_directly_when_search_fails() {
    let store = MemoryStore::new();
    let gateway = StubGateway::replying(vec![Ok(classification(
        "supplement",
        json!({ "name": "Vitamin D3", "dosage": 2000, "units": "IU" }),
        97,
    ))]);
    let catalog = StubCatalog::failing();

    let outcome = pipeline(&store, gateway, Some(catalog.clone()))
        .submit(request(Uuid::new_v4(), "vitamin d 2000 iu"))
        .await
        .expect("catalog outage should not fail the intake");

    assert!(outcome.complete);
    assert!(outcome.search_performed);
    assert_eq!(catalog.calls(), 1);
    assert!(outcome.product_options.is_empty());
    match EventData::from_value(EventType::Supplement, outcome.event.expect("event").event_data)
        .expect("stored payload decodes")
    {
        EventData::Supplement(dose) => {
            assert_eq!(dose.name, "Vitamin D3");
            assert_eq!(dose.dosage, Some(2000.0));
        }
        other => panic!("expected supplement, got {other:?}"),
    }

    let audit = &store.audit_records()[0];
    assert_eq!(audit.status, AuditStatus::Success);
    assert_eq!(audit.value, Some(2000.0));
    assert_eq!(audit.unit.as_deref(), Some("IU"));
}

#[tokio::test]
async fn confident_branded_supplement_skips_search() {
    let store = MemoryStore::new();
    let gateway = StubGateway::replying(vec![Ok(classification(
        "supplement",
        json!({ "name": "Citrus Salt", "brand": "LMNT" }),
        90,
    ))]);
    let catalog = StubCatalog::with(vec![candidate("Citrus Salt", Some("LMNT"))]);

    let outcome = pipeline(&store, gateway, Some(catalog.clone()))
        .submit(request(Uuid::new_v4(), "LMNT citrus salt"))
        .await
        .expect("should save directly");

    assert!(outcome.complete);
    assert!(!outcome.search_performed);
    assert_eq!(catalog.calls(), 0);
}

#[tokio::test]
async fn food_named_after_a_supplement_brand_is_retyped_and_verified() {
    let store = MemoryStore::new();
    let gateway = StubGateway::replying(vec![Ok(classification(
        "food",
        json!({ "description": "citrus salt" }),
        95,
    ))]);
    let catalog = StubCatalog::with(vec![candidate("Citrus Salt", Some("LMNT"))]);

    let outcome = pipeline(&store, gateway, Some(catalog.clone()))
        .submit(request(Uuid::new_v4(), "citrus element"))
        .await
        .expect("retyped supplement should reach confirmation");

    assert_eq!(outcome.event_type, EventType::Supplement);
    assert!(outcome.search_performed);
    assert!(!outcome.complete);
    let parsed = outcome.parsed.expect("parsed event");
    assert_eq!(parsed.data.brand(), Some("LMNT"));
    assert_eq!(catalog.calls(), 1);
}

#[tokio::test]
async fn classifier_failures_mark_the_audit_failed() {
    let store = MemoryStore::new();
    let gateway = StubGateway::replying(vec![
        Ok("Sorry, I can't classify that.".to_string()),
        Err(LlmGatewayError::Timeout),
    ]);
    let pipeline = pipeline(&store, gateway, None);
    let user_id = Uuid::new_v4();

    let err = pipeline
        .submit(request(user_id, "something odd"))
        .await
        .expect_err("unparseable response");
    match err {
        IntakeError::ClassificationParseFailure { raw_response, .. } => {
            assert_eq!(raw_response, "Sorry, I can't classify that.");
        }
        other => panic!("expected parse failure, got {other:?}"),
    }

    let err = pipeline
        .submit(request(user_id, "another note"))
        .await
        .expect_err("provider timeout");
    assert!(matches!(
        err,
        IntakeError::ClassificationApiFailure(LlmGatewayError::Timeout)
    ));

    let statuses: Vec<_> = store
        .audit_records()
        .iter()
        .map(|record| record.status)
        .collect();
    assert_eq!(statuses, vec![AuditStatus::Failed, AuditStatus::Failed]);
    assert!(store.voice_events().is_empty());
}

#[tokio::test]
async fn persistence_failure_is_reported_and_audited() {
    let store = MemoryStore::new();
    let failing = store.clone().with_failing_event_inserts();
    let gateway = StubGateway::replying(vec![Ok(classification(
        "glucose",
        json!({ "value": 112, "units": "mg/dL", "context": "fasting" }),
        99,
    ))]);

    let err = IntakePipeline::new(
        Arc::new(failing),
        gateway,
        ProductResolver::without_catalogs(),
    )
    .submit(request(Uuid::new_v4(), "glucose 112 fasting"))
    .await
    .expect_err("event insert fails");

    assert!(matches!(err, IntakeError::PersistenceFailure(_)));
    assert_eq!(store.audit_records()[0].status, AuditStatus::Failed);
}

#[tokio::test]
async fn replayed_confirmation_writes_nothing_twice() {
    let store = MemoryStore::new();
    let user_id = Uuid::new_v4();
    let gateway = StubGateway::replying(vec![Ok(classification(
        "food",
        json!({ "description": "greek yogurt" }),
        90,
    ))]);
    let catalog = StubCatalog::with(vec![candidate("Plain Greek Yogurt", Some("Fage"))]);
    let pipeline = pipeline(&store, gateway, Some(catalog));

    let pending = pipeline
        .submit(request(user_id, "greek yogurt"))
        .await
        .expect("food should reach confirmation")
        .pending
        .expect("pending confirmation");

    let err = pipeline
        .confirm(Uuid::new_v4(), pending.clone(), Some(0))
        .await
        .expect_err("another user's intake");
    assert!(matches!(err, IntakeError::PersistenceFailure(_)), "{err:?}");
    assert!(store.voice_events().is_empty());

    pipeline
        .confirm(user_id, pending.clone(), Some(0))
        .await
        .expect("first confirmation");
    let err = pipeline
        .confirm(user_id, pending, Some(0))
        .await
        .expect_err("second confirmation of the same intake");
    assert!(matches!(
        err,
        IntakeError::InvalidStatusTransition(AuditStatus::AwaitingUserClarificationSuccess)
    ));

    assert_eq!(store.voice_events().len(), 1);
    assert_eq!(store.registry_entries()[0].times_logged, 1);
    assert_eq!(
        store.audit_records()[0].status,
        AuditStatus::AwaitingUserClarificationSuccess
    );
}

#[tokio::test]
async fn registry_usage_failure_keeps_the_logged_event() {
    let store = MemoryStore::new();
    let user_id = Uuid::new_v4();
    store
        .upsert_registry_entry(NewRegistryEntry {
            user_id,
            product_key: "citrus lmnt".to_string(),
            event_type: EventType::Supplement,
            product_name: "LMNT Citrus Salt".to_string(),
            brand: Some("LMNT".to_string()),
        })
        .await
        .expect("seed registry");
    let failing = store.clone().with_failing_registry_increments();

    let outcome = IntakePipeline::new(
        Arc::new(failing),
        StubGateway::silent(),
        ProductResolver::without_catalogs(),
    )
    .submit(request(user_id, "citrus lmnt"))
    .await
    .expect("usage bump is not part of the outcome");

    assert!(outcome.complete);
    assert_eq!(outcome.source, OutcomeSource::UserRegistry);
    assert_eq!(store.voice_events().len(), 1);
    assert_eq!(store.registry_entries()[0].times_logged, 1);
    assert_eq!(store.audit_records()[0].status, AuditStatus::Success);
}

#[tokio::test]
async fn search_without_hits_saves_directly() {
    let store = MemoryStore::new();
    let gateway = StubGateway::replying(vec![Ok(classification(
        "supplement",
        json!({ "name": "Vitamin D3", "dosage": 5000, "units": "IU" }),
        92,
    ))]);
    let catalog = StubCatalog::with(Vec::new());

    let outcome = pipeline(&store, gateway, Some(catalog.clone()))
        .submit(request(Uuid::new_v4(), "vitamin d 5000"))
        .await
        .expect("empty search result is not an error");

    assert!(outcome.complete);
    assert!(outcome.search_performed);
    assert!(outcome.pending.is_none());
    assert_eq!(catalog.calls(), 1);
    assert_eq!(store.voice_events().len(), 1);
    assert_eq!(store.audit_records()[0].status, AuditStatus::Success);
}

#[tokio::test]
async fn grocery_brand_food_stays_food() {
    let store = MemoryStore::new();
    let gateway = StubGateway::replying(vec![Ok(classification(
        "food",
        json!({ "description": "rotisserie chicken", "brand": "Kirkland" }),
        88,
    ))]);
    let catalog = StubCatalog::with(vec![candidate("Rotisserie Chicken", Some("Kirkland Signature"))]);

    let outcome = pipeline(&store, gateway, Some(catalog))
        .submit(request(Uuid::new_v4(), "kirkland rotisserie chicken"))
        .await
        .expect("food should reach confirmation");

    assert_eq!(outcome.event_type, EventType::Food);
    let parsed = outcome.parsed.expect("parsed event");
    assert!(matches!(parsed.data, EventData::Food(_)));
}
