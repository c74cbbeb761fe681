use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Food,
    Supplement,
    Medication,
    Insulin,
    Glucose,
    Activity,
    Sauna,
    Symptom,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        Self::Food,
        Self::Supplement,
        Self::Medication,
        Self::Insulin,
        Self::Glucose,
        Self::Activity,
        Self::Sauna,
        Self::Symptom,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Supplement => "supplement",
            Self::Medication => "medication",
            Self::Insulin => "insulin",
            Self::Glucose => "glucose",
            Self::Activity => "activity",
            Self::Sauna => "sauna",
            Self::Symptom => "symptom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|event_type| event_type.as_str() == normalized)
    }

    /// Event types that name a purchasable product and can live in the registry.
    pub const fn is_product(self) -> bool {
        matches!(self, Self::Food | Self::Supplement | Self::Medication)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Pending,
    Success,
    AwaitingUserClarification,
    AwaitingUserClarificationSuccess,
    Failed,
}

impl AuditStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::AwaitingUserClarification => "awaiting_user_clarification",
            Self::AwaitingUserClarificationSuccess => "awaiting_user_clarification_success",
            Self::Failed => "failed",
        }
    }

    /// Terminal statuses close the audit trail; no further status writes apply.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::AwaitingUserClarificationSuccess | Self::Failed
        )
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "awaiting_user_clarification" => Some(Self::AwaitingUserClarification),
            "awaiting_user_clarification_success" => Some(Self::AwaitingUserClarificationSuccess),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    #[default]
    Voice,
    Manual,
    Template,
}

impl CaptureMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Manual => "manual",
            Self::Template => "template",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "voice" => Some(Self::Voice),
            "manual" => Some(Self::Manual),
            "template" => Some(Self::Template),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FoodData {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs_g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein_g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat_g: Option<f64>,
}

/// Shared shape for supplements and medications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DoseData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dosage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InsulinData {
    pub value: f64,
    pub units: String,
    pub insulin_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GlucoseData {
    pub value: f64,
    pub units: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActivityData {
    pub activity_type: String,
    #[serde(
        default,
        deserialize_with = "optional_text_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<TextOrNumber>")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SaunaData {
    #[serde(deserialize_with = "text_or_number")]
    #[schemars(with = "TextOrNumber")]
    pub duration: String,
    #[serde(
        default,
        deserialize_with = "optional_text_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<TextOrNumber>")]
    pub temperature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SymptomData {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    #[serde(
        default,
        deserialize_with = "optional_text_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<TextOrNumber>")]
    pub duration: Option<String>,
}

/// Models sometimes answer `"duration": 25` and sometimes `"duration": "25"`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TextOrNumber {
    Text(String),
    Number(serde_json::Number),
}

impl TextOrNumber {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Number(number) => number.to_string(),
        }
    }
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    TextOrNumber::deserialize(deserializer).map(TextOrNumber::into_text)
}

fn optional_text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<TextOrNumber>::deserialize(deserializer).map(|value| value.map(TextOrNumber::into_text))
}

/// Type-specific event payload. Serializes as `{"event_type": .., "event_data": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "event_data", rename_all = "snake_case")]
pub enum EventData {
    Food(FoodData),
    Supplement(DoseData),
    Medication(DoseData),
    Insulin(InsulinData),
    Glucose(GlucoseData),
    Activity(ActivityData),
    Sauna(SaunaData),
    Symptom(SymptomData),
}

impl EventData {
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Food(_) => EventType::Food,
            Self::Supplement(_) => EventType::Supplement,
            Self::Medication(_) => EventType::Medication,
            Self::Insulin(_) => EventType::Insulin,
            Self::Glucose(_) => EventType::Glucose,
            Self::Activity(_) => EventType::Activity,
            Self::Sauna(_) => EventType::Sauna,
            Self::Symptom(_) => EventType::Symptom,
        }
    }

    pub fn from_value(event_type: EventType, data: Value) -> Result<Self, serde_json::Error> {
        Ok(match event_type {
            EventType::Food => Self::Food(serde_json::from_value(data)?),
            EventType::Supplement => Self::Supplement(serde_json::from_value(data)?),
            EventType::Medication => Self::Medication(serde_json::from_value(data)?),
            EventType::Insulin => Self::Insulin(serde_json::from_value(data)?),
            EventType::Glucose => Self::Glucose(serde_json::from_value(data)?),
            EventType::Activity => Self::Activity(serde_json::from_value(data)?),
            EventType::Sauna => Self::Sauna(serde_json::from_value(data)?),
            EventType::Symptom => Self::Symptom(serde_json::from_value(data)?),
        })
    }

    /// The inner payload without the type tag, as stored in `event_data`.
    pub fn data_value(&self) -> Value {
        let serialized = match self {
            Self::Food(data) => serde_json::to_value(data),
            Self::Supplement(data) | Self::Medication(data) => serde_json::to_value(data),
            Self::Insulin(data) => serde_json::to_value(data),
            Self::Glucose(data) => serde_json::to_value(data),
            Self::Activity(data) => serde_json::to_value(data),
            Self::Sauna(data) => serde_json::to_value(data),
            Self::Symptom(data) => serde_json::to_value(data),
        };
        serialized.unwrap_or(Value::Null)
    }

    /// Name the model (or the user) gave the item, for product-bearing events.
    pub fn item_label(&self) -> Option<&str> {
        match self {
            Self::Food(data) => Some(data.description.as_str()),
            Self::Supplement(data) | Self::Medication(data) => Some(data.name.as_str()),
            _ => None,
        }
    }

    pub fn brand(&self) -> Option<&str> {
        match self {
            Self::Food(data) => data.brand.as_deref(),
            Self::Supplement(data) | Self::Medication(data) => data.brand.as_deref(),
            _ => None,
        }
    }

    /// Numeric value and unit mirrored onto the audit row.
    pub fn primary_measure(&self) -> (Option<f64>, Option<String>) {
        match self {
            Self::Insulin(data) => (Some(data.value), Some(data.units.clone())),
            Self::Glucose(data) => (Some(data.value), Some(data.units.clone())),
            Self::Supplement(data) | Self::Medication(data) => (data.dosage, data.units.clone()),
            Self::Food(data) => (data.calories, data.calories.map(|_| "kcal".to_string())),
            Self::Sauna(data) => minutes(Some(&data.duration)),
            Self::Activity(data) => minutes(data.duration.as_ref()),
            Self::Symptom(data) => (data.severity.map(f64::from), data.severity.map(|_| "severity".to_string())),
        }
    }

    /// Rebuilds a product payload under another product type, keeping name and brand.
    pub fn retyped_product(&self, target: EventType) -> Option<Self> {
        let (name, brand) = (self.item_label()?.to_string(), self.brand().map(ToString::to_string));
        let carried_dose = match self {
            Self::Supplement(data) | Self::Medication(data) => Some((data.dosage, data.units.clone())),
            _ => None,
        };
        let (dosage, units) = carried_dose.unwrap_or((None, None));

        match target {
            EventType::Food => Some(Self::Food(FoodData {
                description: name,
                brand,
                serving_size: None,
                calories: None,
                carbs_g: None,
                protein_g: None,
                fat_g: None,
            })),
            EventType::Supplement => Some(Self::Supplement(DoseData {
                name,
                brand,
                dosage,
                units,
            })),
            EventType::Medication => Some(Self::Medication(DoseData {
                name,
                brand,
                dosage,
                units,
            })),
            _ => None,
        }
    }
}

fn minutes(duration: Option<&String>) -> (Option<f64>, Option<String>) {
    match duration.and_then(|value| value.trim().parse::<f64>().ok()) {
        Some(value) => (Some(value), Some("minutes".to_string())),
        None => (None, None),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEvent {
    pub event_type: EventType,
    pub data: EventData,
    pub event_time: DateTime<Utc>,
    pub confidence: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditMetadata {
    pub capture_method: CaptureMethod,
    #[serde(default)]
    pub history_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub raw_text: String,
    pub record_type: Option<EventType>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub status: AuditStatus,
    pub nlp_model: Option<String>,
    pub metadata: AuditMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_key: String,
    pub event_type: EventType,
    pub product_name: String,
    pub brand: Option<String>,
    pub times_logged: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCandidate {
    pub source: String,
    pub source_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// Nutrients per serving for foods, active ingredients for supplements and drugs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub facts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_size: Option<String>,
    pub confidence: f64,
}

impl ProductCandidate {
    /// Name with the brand prefixed when the name does not already carry it.
    pub fn display_name(&self) -> String {
        match self.brand.as_deref().map(str::trim) {
            Some(brand)
                if !brand.is_empty()
                    && !self.name.to_lowercase().contains(&brand.to_lowercase()) =>
            {
                format!("{brand} {}", self.name)
            }
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_type: EventType,
    pub event_data: Value,
    pub event_time: DateTime<Utc>,
    pub source_record_id: Uuid,
    pub capture_method: CaptureMethod,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{EventData, EventType};

    #[test]
    fn sauna_duration_accepts_numbers_and_text() {
        let numeric = EventData::from_value(EventType::Sauna, json!({ "duration": 25 }))
            .expect("numeric duration should parse");
        let textual = EventData::from_value(EventType::Sauna, json!({ "duration": " 25 " }))
            .expect("text duration should parse");

        assert_eq!(numeric, textual);
        assert_eq!(numeric.data_value()["duration"], "25");
        assert_eq!(numeric.primary_measure().0, Some(25.0));
    }

    #[test]
    fn insulin_requires_its_fields() {
        let err = EventData::from_value(EventType::Insulin, json!({ "value": 6 }));
        assert!(err.is_err(), "units and insulin_type are required");
    }

    #[test]
    fn retyping_food_to_supplement_keeps_name_and_brand() {
        let food = EventData::from_value(
            EventType::Food,
            json!({ "description": "Citrus Salt", "brand": "LMNT" }),
        )
        .expect("food payload should parse");

        let retyped = food
            .retyped_product(EventType::Supplement)
            .expect("food can become a supplement");

        assert_eq!(retyped.event_type(), EventType::Supplement);
        assert_eq!(retyped.item_label(), Some("Citrus Salt"));
        assert_eq!(retyped.brand(), Some("LMNT"));
        assert!(food.retyped_product(EventType::Sauna).is_none());
    }

    #[test]
    fn event_type_parse_is_case_insensitive() {
        assert_eq!(EventType::parse(" Supplement "), Some(EventType::Supplement));
        assert_eq!(EventType::parse("meal"), None);
    }
}
