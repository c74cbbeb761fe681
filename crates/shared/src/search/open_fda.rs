use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use super::catalog::{CatalogFuture, ProductCatalog, SearchError, rank_confidence};
use crate::models::{EventType, ProductCandidate};

const CATALOG: &str = "open_fda";
const RESULT_LIMIT: &str = "10";

/// Drug-label search against openFDA.
#[derive(Clone)]
pub struct OpenFdaCatalog {
    client: reqwest::Client,
    label_url: Url,
}

impl OpenFdaCatalog {
    pub fn new(label_url: &str, timeout_ms: u64) -> Result<Self, SearchError> {
        let label_url = Url::parse(label_url).map_err(|err| SearchError::InvalidUrl {
            catalog: CATALOG,
            message: err.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| SearchError::HttpClient {
                catalog: CATALOG,
                message: err.to_string(),
            })?;

        Ok(Self { client, label_url })
    }

    fn request_url(&self, query: &str) -> Url {
        let term = query.replace('"', " ");
        let term = term.trim();
        let mut url = self.label_url.clone();
        url.query_pairs_mut()
            .append_pair(
                "search",
                &format!("openfda.brand_name:\"{term}\" OR openfda.generic_name:\"{term}\""),
            )
            .append_pair("limit", RESULT_LIMIT);
        url
    }

    async fn fetch(&self, query: &str) -> Result<Vec<ProductCandidate>, SearchError> {
        let response = self
            .client
            .get(self.request_url(query))
            .send()
            .await
            .map_err(|err| SearchError::from_reqwest(CATALOG, &err))?;

        let status = response.status();
        // openFDA answers 404 when nothing matches.
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(SearchError::Status {
                catalog: CATALOG,
                status: status.as_u16(),
            });
        }

        let body: LabelResponse =
            response
                .json()
                .await
                .map_err(|err| SearchError::InvalidPayload {
                    catalog: CATALOG,
                    message: err.to_string(),
                })?;

        Ok(candidates_from_labels(body.results))
    }
}

impl ProductCatalog for OpenFdaCatalog {
    fn name(&self) -> &'static str {
        CATALOG
    }

    fn serves(&self, event_type: EventType) -> bool {
        event_type == EventType::Medication
    }

    fn search<'a>(&'a self, query: &'a str, _event_type: EventType) -> CatalogFuture<'a> {
        Box::pin(async move { self.fetch(query).await })
    }
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    #[serde(default)]
    results: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct Label {
    id: Option<String>,
    #[serde(default)]
    openfda: OpenFdaFields,
    #[serde(default)]
    active_ingredient: Vec<String>,
    #[serde(default)]
    package_label_principal_display_panel: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenFdaFields {
    #[serde(default)]
    brand_name: Vec<String>,
    #[serde(default)]
    generic_name: Vec<String>,
    #[serde(default)]
    manufacturer_name: Vec<String>,
    #[serde(default)]
    route: Vec<String>,
}

fn candidates_from_labels(labels: Vec<Label>) -> Vec<ProductCandidate> {
    labels
        .into_iter()
        .filter_map(|label| {
            let source_id = label.id.as_deref().map(str::trim).filter(|id| !id.is_empty())?;
            let name = first_non_empty(&label.openfda.brand_name)
                .or_else(|| first_non_empty(&label.openfda.generic_name))?;

            let mut facts = BTreeMap::new();
            if let Some(generic) = first_non_empty(&label.openfda.generic_name) {
                facts.insert("generic_name".to_string(), generic);
            }
            if let Some(ingredient) = first_non_empty(&label.active_ingredient) {
                facts.insert("active_ingredient".to_string(), ingredient);
            }
            if let Some(route) = first_non_empty(&label.openfda.route) {
                facts.insert("route".to_string(), route);
            }

            Some(ProductCandidate {
                source: CATALOG.to_string(),
                source_id: source_id.to_string(),
                name,
                brand: first_non_empty(&label.openfda.manufacturer_name),
                facts,
                serving_size: first_non_empty(&label.package_label_principal_display_panel),
                confidence: 0.0,
            })
        })
        .enumerate()
        .map(|(index, mut candidate)| {
            candidate.confidence = rank_confidence(index);
            candidate
        })
        .collect()
}

fn first_non_empty(values: &[String]) -> Option<String> {
    values
        .iter()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{LabelResponse, OpenFdaCatalog, candidates_from_labels};

    #[test]
    fn request_url_searches_brand_and_generic_names() {
        let catalog =
            OpenFdaCatalog::new("https://api.fda.gov/drug/label.json", 1000).expect("catalog");
        let url = catalog.request_url("tylenol \"extra\"");
        let search = url
            .query_pairs()
            .find(|(key, _)| key == "search")
            .map(|(_, value)| value.into_owned())
            .expect("search parameter");

        assert_eq!(
            search,
            "openfda.brand_name:\"tylenol  extra\" OR openfda.generic_name:\"tylenol  extra\""
        );
    }

    #[test]
    fn labels_map_to_candidates_with_ingredients() {
        let response: LabelResponse = serde_json::from_value(json!({
            "results": [
                {
                    "id": "label-1",
                    "openfda": {
                        "brand_name": ["Tylenol Extra Strength"],
                        "generic_name": ["ACETAMINOPHEN"],
                        "manufacturer_name": ["Kenvue"],
                        "route": ["ORAL"]
                    },
                    "active_ingredient": ["Acetaminophen 500 mg"]
                },
                { "id": "label-2", "openfda": {} }
            ]
        }))
        .expect("fixture should deserialize");

        let candidates = candidates_from_labels(response.results);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Tylenol Extra Strength");
        assert_eq!(candidates[0].brand.as_deref(), Some("Kenvue"));
        assert_eq!(
            candidates[0].facts.get("active_ingredient").map(String::as_str),
            Some("Acetaminophen 500 mg")
        );
        assert_eq!(candidates[0].confidence, 90.0);
    }
}
