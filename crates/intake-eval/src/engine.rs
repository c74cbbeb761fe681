use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use serde_json::Value;
use shared::identity::UserIdCandidate;
use shared::intake::{IntakeError, IntakeOutcome, IntakePipeline, IntakeRequest};
use shared::llm::{
    LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
    OpenRouterConfigError, OpenRouterGateway, OpenRouterGatewayConfig,
};
use shared::models::{EventType, ProductCandidate};
use shared::repos::{MemoryStore, NewRegistryEntry, RegistryStore};
use shared::search::{CatalogFuture, ProductCatalog, ProductResolver, SearchError};
use thiserror::Error;
use uuid::Uuid;

use crate::case::{ExpectedOutcome, IntakeEvalCase};
use crate::cli::{CliOptions, EvalMode};
use crate::fixture_io::{FixtureIoError, load_cases};

#[derive(Debug)]
pub struct EvalSummary {
    mode: EvalMode,
    results: Vec<CaseResult>,
}

impl EvalSummary {
    pub fn has_failures(&self) -> bool {
        self.results
            .iter()
            .any(|result| !result.failures.is_empty())
    }

    pub fn print(&self) {
        println!("Intake Eval Harness ({})", self.mode.as_str());

        let mut passed = 0usize;
        for result in &self.results {
            if result.failures.is_empty() {
                passed += 1;
                println!("[PASS] {}: {}", result.case_id, result.description);
            } else {
                println!("[FAIL] {}: {}", result.case_id, result.description);
                for failure in &result.failures {
                    println!("  - {failure}");
                }
            }

            for note in &result.notes {
                println!("  * {note}");
            }
        }

        let total = self.results.len();
        let failed = total.saturating_sub(passed);
        println!("Summary: {total} total, {passed} passed, {failed} failed");
    }
}

#[derive(Debug)]
struct CaseResult {
    case_id: String,
    description: String,
    failures: Vec<String>,
    notes: Vec<String>,
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Fixtures(#[from] FixtureIoError),
    #[error("failed to initialize OpenRouter in live mode: {0}")]
    OpenRouterConfig(#[from] OpenRouterConfigError),
    #[error("no fixture matched the selection")]
    NoCases,
}

pub async fn run_eval(options: &CliOptions) -> Result<EvalSummary, EvalError> {
    let mut cases = load_cases()?;
    cases.sort_by(|left, right| left.case_id.cmp(&right.case_id));

    if let Some(filter) = options.case_filter.as_deref() {
        cases.retain(|case| case.case_id == filter);
    }
    if options.mode == EvalMode::Live {
        cases.retain(|case| case.include_in_live_smoke);
    }
    if cases.is_empty() {
        return Err(EvalError::NoCases);
    }

    let live_gateway: Option<Arc<dyn LlmGateway>> = if options.mode == EvalMode::Live {
        Some(Arc::new(OpenRouterGateway::new(
            OpenRouterGatewayConfig::from_env()?,
        )?))
    } else {
        None
    };

    let mut results = Vec::with_capacity(cases.len());
    for case in &cases {
        results.push(run_case(case, live_gateway.clone()).await);
    }

    Ok(EvalSummary {
        mode: options.mode,
        results,
    })
}

async fn run_case(case: &IntakeEvalCase, live_gateway: Option<Arc<dyn LlmGateway>>) -> CaseResult {
    let mut failures = Vec::new();
    let mut notes = Vec::new();

    let store = MemoryStore::new();
    let seed_user = case
        .user_id
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .unwrap_or_else(Uuid::new_v4);
    for seed in &case.registry {
        let seeded = store
            .upsert_registry_entry(NewRegistryEntry {
                user_id: seed_user,
                product_key: seed.product_key.clone(),
                event_type: seed.event_type,
                product_name: seed.product_name.clone(),
                brand: seed.brand.clone(),
            })
            .await;
        if let Err(err) = seeded {
            failures.push(format!("registry_seed: {err}"));
        }
    }

    let scripted = Arc::new(ScriptedGateway::new(case.mocked_model_output.as_ref()));
    let gateway: Arc<dyn LlmGateway> = match live_gateway {
        Some(gateway) => Arc::new(CountingGateway::new(gateway, Arc::clone(&scripted.calls))),
        None => scripted.clone() as Arc<dyn LlmGateway>,
    };
    let catalog = Arc::new(FixtureCatalog {
        candidates: case.catalog_results.clone(),
        unavailable: case.catalog_unavailable,
    });
    let pipeline = IntakePipeline::new(
        Arc::new(store.clone()),
        gateway,
        ProductResolver::new(vec![catalog as Arc<dyn ProductCatalog>], 5),
    );

    let user_id = match case.user_id.clone() {
        Some(value) => UserIdCandidate::from(value),
        None => UserIdCandidate::from(seed_user),
    };
    let request = IntakeRequest::new(user_id, case.raw_text.clone())
        .with_time_zone(case.time_zone.clone())
        .at(case.now);

    let started = Instant::now();
    let result = pipeline.submit(request).await;
    notes.push(format!("latency_ms={}", started.elapsed().as_millis()));

    let expectations = &case.expectations;
    let actual_outcome = outcome_label(&result);
    if actual_outcome != expectations.outcome.as_str() {
        failures.push(format!(
            "outcome: expected={}, actual={actual_outcome}",
            expectations.outcome.as_str()
        ));
    }

    let calls = scripted.calls.load(Ordering::SeqCst);
    if let Some(expected_called) = expectations.classifier_called
        && expected_called != (calls > 0)
    {
        failures.push(format!(
            "classifier_called: expected={expected_called}, actual calls={calls}"
        ));
    }

    match &result {
        Ok(outcome) => check_outcome(case, outcome, &mut failures),
        Err(err) => notes.push(format!("error: {err}")),
    }

    if expectations.outcome == ExpectedOutcome::InvalidIdentity && store.write_attempts() != 0 {
        failures.push(format!(
            "writes: rejected identity must not write, saw {} write attempts",
            store.write_attempts()
        ));
    }

    CaseResult {
        case_id: case.case_id.clone(),
        description: case.description.clone(),
        failures,
        notes,
    }
}

fn check_outcome(case: &IntakeEvalCase, outcome: &IntakeOutcome, failures: &mut Vec<String>) {
    let expectations = &case.expectations;

    if let Some(expected) = expectations.event_type
        && expected != outcome.event_type
    {
        failures.push(format!(
            "event_type: expected={expected}, actual={}",
            outcome.event_type
        ));
    }
    if let Some(expected) = expectations.source
        && expected != outcome.source
    {
        failures.push(format!(
            "source: expected={}, actual={}",
            expected.as_str(),
            outcome.source.as_str()
        ));
    }
    if let Some(expected) = expectations.search_performed
        && expected != outcome.search_performed
    {
        failures.push(format!(
            "search_performed: expected={expected}, actual={}",
            outcome.search_performed
        ));
    }
    if let Some(minimum) = expectations.min_candidates
        && outcome.product_options.len() < minimum
    {
        failures.push(format!(
            "candidates: expected at least {minimum}, actual={}",
            outcome.product_options.len()
        ));
    }

    let (event_time, event_data) = match (&outcome.event, &outcome.parsed) {
        (Some(event), _) => (Some(event.event_time), Some(event.event_data.clone())),
        (None, Some(parsed)) => (Some(parsed.event_time), Some(parsed.data.data_value())),
        (None, None) => (None, None),
    };

    if let Some(expected) = expectations.event_time
        && event_time != Some(expected)
    {
        failures.push(format!(
            "event_time: expected={}, actual={}",
            expected.to_rfc3339(),
            event_time.map_or_else(|| "none".to_string(), |time| time.to_rfc3339())
        ));
    }

    if let Some(expected) = expectations.event_data.as_ref() {
        let actual = event_data.unwrap_or(Value::Null);
        for (key, expected_value) in expected {
            let actual_value = actual.get(key).cloned().unwrap_or(Value::Null);
            if !values_match(expected_value, &actual_value) {
                failures.push(format!(
                    "event_data.{key}: expected={expected_value}, actual={actual_value}"
                ));
            }
        }
    }
}

/// Numbers compare by value so `25` matches `25.0`.
fn values_match(expected: &Value, actual: &Value) -> bool {
    match (expected.as_f64(), actual.as_f64()) {
        (Some(left), Some(right)) => (left - right).abs() < 1e-9,
        _ => expected == actual,
    }
}

fn outcome_label(result: &Result<IntakeOutcome, IntakeError>) -> &'static str {
    match result {
        Ok(outcome) if outcome.complete => "complete",
        Ok(_) => "pending",
        Err(err) => err.kind(),
    }
}

struct ScriptedGateway {
    content: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedGateway {
    fn new(output: Option<&Value>) -> Self {
        let content = output.map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        });
        Self {
            content,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl LlmGateway for ScriptedGateway {
    fn generate<'a>(&'a self, _request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let content = self.content.clone().ok_or_else(|| {
                LlmGatewayError::ProviderFailure("missing_mocked_model_output".to_string())
            })?;
            Ok(LlmGatewayResponse {
                model: "intake-eval-mock".to_string(),
                provider_request_id: None,
                content,
                usage: None,
            })
        })
    }
}

struct CountingGateway {
    inner: Arc<dyn LlmGateway>,
    calls: Arc<AtomicUsize>,
}

impl CountingGateway {
    fn new(inner: Arc<dyn LlmGateway>, calls: Arc<AtomicUsize>) -> Self {
        Self { inner, calls }
    }
}

impl LlmGateway for CountingGateway {
    fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.generate(request)
    }
}

struct FixtureCatalog {
    candidates: Vec<ProductCandidate>,
    unavailable: bool,
}

impl ProductCatalog for FixtureCatalog {
    fn name(&self) -> &'static str {
        "fixture_catalog"
    }

    fn serves(&self, event_type: EventType) -> bool {
        event_type.is_product()
    }

    fn search<'a>(&'a self, _query: &'a str, _event_type: EventType) -> CatalogFuture<'a> {
        Box::pin(async move {
            if self.unavailable {
                return Err(SearchError::Unavailable {
                    catalog: "fixture_catalog",
                });
            }
            Ok(self.candidates.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::values_match;

    #[test]
    fn numeric_values_match_across_representations() {
        assert!(values_match(&json!(25), &json!(25.0)));
        assert!(values_match(&json!("25"), &json!("25")));
        assert!(!values_match(&json!("25"), &json!(25)));
        assert!(!values_match(&json!(2000), &json!(200)));
    }
}
