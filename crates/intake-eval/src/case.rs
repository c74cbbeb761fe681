use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use shared::intake::OutcomeSource;
use shared::models::{EventType, ProductCandidate};

#[derive(Debug, Clone, Deserialize)]
pub struct IntakeEvalCase {
    pub case_id: String,
    pub description: String,
    #[serde(default)]
    pub include_in_live_smoke: bool,
    /// Defaults to a fresh random user.
    #[serde(default)]
    pub user_id: Option<Value>,
    pub raw_text: String,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    pub now: DateTime<Utc>,
    #[serde(default)]
    pub registry: Vec<RegistrySeed>,
    /// Assistant message content; objects are sent as their JSON text.
    #[serde(default)]
    pub mocked_model_output: Option<Value>,
    #[serde(default)]
    pub catalog_results: Vec<ProductCandidate>,
    #[serde(default)]
    pub catalog_unavailable: bool,
    pub expectations: IntakeExpectations,
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySeed {
    pub product_key: String,
    pub event_type: EventType,
    pub product_name: String,
    #[serde(default)]
    pub brand: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntakeExpectations {
    pub outcome: ExpectedOutcome,
    #[serde(default)]
    pub event_type: Option<EventType>,
    #[serde(default)]
    pub source: Option<OutcomeSource>,
    #[serde(default)]
    pub search_performed: Option<bool>,
    #[serde(default)]
    pub classifier_called: Option<bool>,
    #[serde(default)]
    pub event_time: Option<DateTime<Utc>>,
    /// Keys that must appear with these exact values.
    #[serde(default)]
    pub event_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub min_candidates: Option<usize>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedOutcome {
    Complete,
    Pending,
    InvalidIdentity,
    ClassificationParseFailure,
    ClassificationApiFailure,
}

impl ExpectedOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Pending => "pending",
            Self::InvalidIdentity => "invalid_identity",
            Self::ClassificationParseFailure => "classification_parse_failure",
            Self::ClassificationApiFailure => "classification_api_failure",
        }
    }
}
