use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{
    ActivityData, DoseData, EventType, FoodData, GlucoseData, InsulinData, SaunaData, SymptomData,
};

pub const CLASSIFICATION_CONTRACT_VERSION_V1: &str = "2026-10-01";

/// The single JSON object the model must answer with.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ClassificationEnvelope {
    pub event_type: EventType,
    pub event_data: Map<String, Value>,
    /// ISO-8601, with or without an offset.
    pub event_time: String,
    #[schemars(range(min = 0, max = 100))]
    pub confidence: u8,
}

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("schema for {0} could not be rendered: {1}")]
    SchemaRender(&'static str, String),
}

pub fn envelope_schema() -> Result<Value, ContractError> {
    serde_json::to_value(schema_for!(ClassificationEnvelope))
        .map_err(|err| ContractError::SchemaRender("envelope", err.to_string()))
}

/// Schema of the `event_data` object for one event type.
pub fn event_data_schema(event_type: EventType) -> Result<Value, ContractError> {
    let rendered = match event_type {
        EventType::Food => serde_json::to_value(schema_for!(FoodData)),
        EventType::Supplement | EventType::Medication => {
            serde_json::to_value(schema_for!(DoseData))
        }
        EventType::Insulin => serde_json::to_value(schema_for!(InsulinData)),
        EventType::Glucose => serde_json::to_value(schema_for!(GlucoseData)),
        EventType::Activity => serde_json::to_value(schema_for!(ActivityData)),
        EventType::Sauna => serde_json::to_value(schema_for!(SaunaData)),
        EventType::Symptom => serde_json::to_value(schema_for!(SymptomData)),
    };
    rendered.map_err(|err| ContractError::SchemaRender(event_type.as_str(), err.to_string()))
}

/// Field cheat-sheet shown to the model next to the envelope schema.
pub const fn field_guide(event_type: EventType) -> &'static str {
    match event_type {
        EventType::Food => {
            "description (required), brand, serving_size, calories, carbs_g, protein_g, fat_g"
        }
        EventType::Supplement | EventType::Medication => {
            "name (required), brand, dosage (number), units"
        }
        EventType::Insulin => "value (required), units (required), insulin_type (required), site",
        EventType::Glucose => "value (required), units (required), context",
        EventType::Activity => "activity_type (required), duration (minutes), intensity, distance",
        EventType::Sauna => "duration (required, minutes), temperature",
        EventType::Symptom => "description (required), severity (1-10), duration",
    }
}
