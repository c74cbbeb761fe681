use serde_json::Value;

use crate::brands::detect_brand;
use crate::models::EventType;
use crate::registry::normalize::normalize_product_key;
use crate::registry::phonetic::detect_phonetic_transformation;

/// Supplements and medications skip search only above this confidence (strict).
pub const SKIP_SEARCH_CONFIDENCE_FLOOR: u8 = 83;

/// Decides whether the model's product guess must be verified against catalogs.
pub fn should_search(
    event_type: EventType,
    event_data: Option<&Value>,
    confidence: u8,
    user_input_text: &str,
    model_output_text: &str,
) -> bool {
    match event_type {
        EventType::Food => true,
        EventType::Supplement | EventType::Medication => {
            let Some(data) = event_data.and_then(Value::as_object) else {
                return true;
            };

            let item = ["name", "description"]
                .iter()
                .filter_map(|key| data.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .find(|value| !value.is_empty());
            let Some(item) = item else {
                return true;
            };

            let brand = data.get("brand").and_then(Value::as_str).unwrap_or_default();
            let brand_present =
                detect_brand(item).is_some() || detect_brand(brand).is_some();
            let drift = detect_phonetic_transformation(
                &normalize_product_key(user_input_text),
                &normalize_product_key(model_output_text),
            );

            !(confidence > SKIP_SEARCH_CONFIDENCE_FLOOR && brand_present && !drift)
        }
        EventType::Insulin
        | EventType::Glucose
        | EventType::Activity
        | EventType::Sauna
        | EventType::Symptom => false,
    }
}
