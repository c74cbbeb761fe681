use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use super::gateway::{LlmGateway, LlmGatewayError, LlmGatewayRequest};
use super::prompts::{classification_context, classification_template};
use super::validation::{validate_envelope_json, validate_event_data};
use crate::brands::detect_brand_phonetic;
use crate::models::{EventData, EventType, ParsedEvent};
use crate::timezone::{DEFAULT_USER_TIME_ZONE, resolve_event_time};

#[derive(Debug, Clone)]
pub struct ClassificationContext {
    pub now: DateTime<Utc>,
    pub time_zone: String,
    pub requester_id: Option<String>,
}

impl ClassificationContext {
    pub fn new(now: DateTime<Utc>, time_zone: impl Into<String>) -> Self {
        Self {
            now,
            time_zone: time_zone.into(),
            requester_id: None,
        }
    }
}

impl Default for ClassificationContext {
    fn default() -> Self {
        Self::new(Utc::now(), DEFAULT_USER_TIME_ZONE)
    }
}

#[derive(Debug, Clone)]
pub struct ClassifiedEvent {
    pub parsed: ParsedEvent,
    pub model: String,
    pub raw_response: String,
    /// Type the model chose before the brand rule rewrote it.
    pub reclassified_from: Option<EventType>,
}

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("classification provider call failed: {0}")]
    ApiFailure(#[from] LlmGatewayError),
    #[error("classification response could not be parsed: {reason}")]
    ParseFailure { reason: String, raw_response: String },
    #[error("classification prompt could not be built: {0}")]
    Prompt(String),
}

#[derive(Clone)]
pub struct EventClassifier {
    gateway: Arc<dyn LlmGateway>,
}

impl EventClassifier {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }

    pub async fn classify(
        &self,
        raw_text: &str,
        context: &ClassificationContext,
    ) -> Result<ClassifiedEvent, ClassificationError> {
        let template = classification_template(context.now, &context.time_zone)
            .map_err(|err| ClassificationError::Prompt(err.to_string()))?;
        let payload = classification_context(raw_text, context.now, &context.time_zone);
        let mut request = LlmGatewayRequest::from_template(template, payload);
        if let Some(requester_id) = context.requester_id.as_deref() {
            request = request.with_requester_id(requester_id);
        }

        let response = self.gateway.generate(request).await?;
        let raw_response = response.content;

        let mut parsed = match parse_classification(&raw_response, &context.time_zone) {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!(
                    model = %response.model,
                    reason = %reason,
                    raw_response = %raw_response,
                    "classification response rejected"
                );
                return Err(ClassificationError::ParseFailure {
                    reason,
                    raw_response,
                });
            }
        };

        let reclassified_from = apply_brand_reclassification(&mut parsed, raw_text);
        if let Some(original) = reclassified_from {
            info!(
                from = %original,
                to = %parsed.event_type,
                "known brand moved item out of food"
            );
        }

        Ok(ClassifiedEvent {
            parsed,
            model: response.model,
            raw_response,
            reclassified_from,
        })
    }
}

/// Validates the response text and decodes it. Errors are human-readable reasons.
pub fn parse_classification(raw_response: &str, time_zone: &str) -> Result<ParsedEvent, String> {
    let object = extract_json_object(raw_response)
        .ok_or_else(|| "response does not contain a JSON object".to_string())?;
    let envelope = validate_envelope_json(object).map_err(|err| err.to_string())?;
    let data = validate_event_data(envelope.event_type, &Value::Object(envelope.event_data))
        .map_err(|err| err.to_string())?;
    let event_time = resolve_event_time(&envelope.event_time, time_zone)
        .ok_or_else(|| format!("event_time is not ISO-8601: {}", envelope.event_time))?;

    Ok(ParsedEvent {
        event_type: envelope.event_type,
        data,
        event_time,
        confidence: envelope.confidence,
    })
}

/// First balanced `{...}` in `text`, honouring string literals and escapes.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// A model-typed `food` whose item (or the user's own words, through sound-alike
/// spellings) names a known supplement or medication brand becomes that type.
/// Returns the original type when a rewrite happened.
fn apply_brand_reclassification(parsed: &mut ParsedEvent, raw_text: &str) -> Option<EventType> {
    if parsed.event_type != EventType::Food {
        return None;
    }

    let item_text = format!(
        "{} {}",
        parsed.data.brand().unwrap_or_default(),
        parsed.data.item_label().unwrap_or_default()
    );
    let known = detect_brand_phonetic(&item_text).or_else(|| detect_brand_phonetic(raw_text))?;
    if known.event_type == EventType::Food {
        return None;
    }

    let mut retyped = parsed.data.retyped_product(known.event_type)?;
    if let EventData::Supplement(dose) | EventData::Medication(dose) = &mut retyped
        && dose.brand.is_none()
    {
        dose.brand = Some(known.display.to_string());
    }

    parsed.event_type = known.event_type;
    parsed.data = retyped;
    Some(EventType::Food)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike, Utc};

    use super::{apply_brand_reclassification, extract_json_object, parse_classification};
    use crate::models::{EventData, EventType, FoodData, ParsedEvent};

    #[test]
    fn extracts_first_balanced_object_around_prose() {
        let text = r#"Sure! {"a": {"b": "}"}, "c": "say \"hi\""} trailing {"x": 1}"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"a": {"b": "}"}, "c": "say \"hi\""}"#)
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object(r#"{"open": true"#), None);
    }

    #[test]
    fn parses_fenced_sauna_response_in_local_time() {
        let raw = "```json\n{\"event_type\":\"sauna\",\"event_data\":{\"duration\":\"25\"},\"event_time\":\"2026-10-19T14:00:00\",\"confidence\":95}\n```";
        let parsed = parse_classification(raw, "UTC").expect("sauna response should parse");

        assert_eq!(parsed.event_type, EventType::Sauna);
        assert_eq!(parsed.event_time.hour(), 14);
        match parsed.data {
            EventData::Sauna(sauna) => assert_eq!(sauna.duration, "25"),
            other => panic!("expected sauna data, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_time_and_missing_fields_with_reasons() {
        let reason = parse_classification(
            r#"{"event_type":"glucose","event_data":{"value":110,"units":"mg/dL"},"event_time":"after lunch","confidence":90}"#,
            "UTC",
        )
        .expect_err("free-text time should fail");
        assert!(reason.contains("event_time"), "{reason}");

        let reason = parse_classification(
            r#"{"event_type":"glucose","event_data":{"value":110},"event_time":"2026-10-19T14:00:00Z","confidence":90}"#,
            "UTC",
        )
        .expect_err("missing units should fail");
        assert!(reason.contains("glucose"), "{reason}");
    }

    #[test]
    fn food_with_known_supplement_brand_is_retyped() {
        let mut parsed = ParsedEvent {
            event_type: EventType::Food,
            data: EventData::Food(FoodData {
                description: "citrus element drink mix".to_string(),
                brand: None,
                serving_size: None,
                calories: None,
                carbs_g: None,
                protein_g: None,
                fat_g: None,
            }),
            event_time: Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap(),
            confidence: 70,
        };

        let original = apply_brand_reclassification(&mut parsed, "citrus element");

        assert_eq!(original, Some(EventType::Food));
        assert_eq!(parsed.event_type, EventType::Supplement);
        assert_eq!(parsed.data.brand(), Some("LMNT"));
        assert_eq!(parsed.data.item_label(), Some("citrus element drink mix"));
    }

    #[test]
    fn grocery_brands_and_embedded_brand_names_stay_food() {
        for (description, brand, raw_text) in [
            ("rotisserie chicken", Some("Kirkland"), "kirkland rotisserie chicken"),
            ("hawthorne berry tea", None, "hawthorne berry tea"),
        ] {
            let mut parsed = ParsedEvent {
                event_type: EventType::Food,
                data: EventData::Food(FoodData {
                    description: description.to_string(),
                    brand: brand.map(ToString::to_string),
                    serving_size: None,
                    calories: None,
                    carbs_g: None,
                    protein_g: None,
                    fat_g: None,
                }),
                event_time: Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap(),
                confidence: 90,
            };

            assert_eq!(apply_brand_reclassification(&mut parsed, raw_text), None, "{raw_text}");
            assert_eq!(parsed.event_type, EventType::Food, "{raw_text}");
        }
    }

    #[test]
    fn event_time_inside_a_dst_gap_still_parses() {
        let parsed = parse_classification(
            r#"{"event_type":"sauna","event_data":{"duration":"20"},"event_time":"2026-03-08T02:30:00","confidence":92}"#,
            "America/Los_Angeles",
        )
        .expect("skipped wall-clock time should resolve");
        assert_eq!(parsed.event_time, Utc.with_ymd_and_hms(2026, 3, 8, 10, 30, 0).unwrap());
    }

    #[test]
    fn plain_food_is_left_alone() {
        let mut parsed = ParsedEvent {
            event_type: EventType::Food,
            data: EventData::Food(FoodData {
                description: "oatmeal with berries".to_string(),
                brand: None,
                serving_size: None,
                calories: None,
                carbs_g: None,
                protein_g: None,
                fat_g: None,
            }),
            event_time: Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap(),
            confidence: 88,
        };

        assert_eq!(apply_brand_reclassification(&mut parsed, "oatmeal with berries"), None);
        assert_eq!(parsed.event_type, EventType::Food);
    }
}
