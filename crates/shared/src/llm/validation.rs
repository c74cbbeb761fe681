use jsonschema::JSONSchema;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

use super::contracts::{ClassificationEnvelope, envelope_schema, event_data_schema};
use crate::models::{EventData, EventType};

#[derive(Debug, Error)]
pub enum OutputValidationError {
    #[error("classification output is not valid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("classification schema for {target} failed to compile: {message}")]
    SchemaCompile {
        target: &'static str,
        message: String,
    },
    #[error("classification output failed schema validation for {target}: {errors:?}")]
    SchemaViolation {
        target: &'static str,
        errors: Vec<String>,
    },
}

pub fn validate_envelope_json(raw_json: &str) -> Result<ClassificationEnvelope, OutputValidationError> {
    let payload: Value = serde_json::from_str(raw_json)?;
    validate_envelope_value(&payload)
}

pub fn validate_envelope_value(
    payload: &Value,
) -> Result<ClassificationEnvelope, OutputValidationError> {
    check_against(&ENVELOPE_VALIDATOR, "envelope", payload)?;
    Ok(serde_json::from_value(payload.clone())?)
}

/// Validates `event_data` against the schema of `event_type` and decodes it.
pub fn validate_event_data(
    event_type: EventType,
    event_data: &Value,
) -> Result<EventData, OutputValidationError> {
    check_against(validator_for_event_type(event_type), event_type.as_str(), event_data)?;
    Ok(EventData::from_value(event_type, event_data.clone())?)
}

fn check_against(
    validator: &'static Result<JSONSchema, String>,
    target: &'static str,
    payload: &Value,
) -> Result<(), OutputValidationError> {
    let validator = validator
        .as_ref()
        .map_err(|message| OutputValidationError::SchemaCompile {
            target,
            message: message.clone(),
        })?;

    if let Err(validation_errors) = validator.validate(payload) {
        let errors = validation_errors
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(OutputValidationError::SchemaViolation { target, errors });
    }
    Ok(())
}

fn compile(schema: Result<Value, super::contracts::ContractError>) -> Result<JSONSchema, String> {
    let schema = schema.map_err(|err| err.to_string())?;
    JSONSchema::compile(&schema).map_err(|err| err.to_string())
}

static ENVELOPE_VALIDATOR: LazyLock<Result<JSONSchema, String>> =
    LazyLock::new(|| compile(envelope_schema()));

static FOOD_VALIDATOR: LazyLock<Result<JSONSchema, String>> =
    LazyLock::new(|| compile(event_data_schema(EventType::Food)));

static DOSE_VALIDATOR: LazyLock<Result<JSONSchema, String>> =
    LazyLock::new(|| compile(event_data_schema(EventType::Supplement)));

static INSULIN_VALIDATOR: LazyLock<Result<JSONSchema, String>> =
    LazyLock::new(|| compile(event_data_schema(EventType::Insulin)));

static GLUCOSE_VALIDATOR: LazyLock<Result<JSONSchema, String>> =
    LazyLock::new(|| compile(event_data_schema(EventType::Glucose)));

static ACTIVITY_VALIDATOR: LazyLock<Result<JSONSchema, String>> =
    LazyLock::new(|| compile(event_data_schema(EventType::Activity)));

static SAUNA_VALIDATOR: LazyLock<Result<JSONSchema, String>> =
    LazyLock::new(|| compile(event_data_schema(EventType::Sauna)));

static SYMPTOM_VALIDATOR: LazyLock<Result<JSONSchema, String>> =
    LazyLock::new(|| compile(event_data_schema(EventType::Symptom)));

fn validator_for_event_type(event_type: EventType) -> &'static Result<JSONSchema, String> {
    match event_type {
        EventType::Food => &FOOD_VALIDATOR,
        EventType::Supplement | EventType::Medication => &DOSE_VALIDATOR,
        EventType::Insulin => &INSULIN_VALIDATOR,
        EventType::Glucose => &GLUCOSE_VALIDATOR,
        EventType::Activity => &ACTIVITY_VALIDATOR,
        EventType::Sauna => &SAUNA_VALIDATOR,
        EventType::Symptom => &SYMPTOM_VALIDATOR,
    }
}
