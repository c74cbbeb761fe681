use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::catalog::{CatalogFuture, ProductCatalog, SearchError, rank_confidence};
use crate::models::{EventType, ProductCandidate};

const CATALOG: &str = "open_food_facts";
const PAGE_SIZE: &str = "10";

/// Serving-level nutriment keys and the fact names they are exposed under.
const NUTRIMENT_FACTS: &[(&str, &str)] = &[
    ("energy-kcal_serving", "calories"),
    ("carbohydrates_serving", "carbs_g"),
    ("proteins_serving", "protein_g"),
    ("fat_serving", "fat_g"),
    ("sodium_serving", "sodium_g"),
    ("potassium_serving", "potassium_g"),
];

#[derive(Clone)]
pub struct OpenFoodFactsCatalog {
    client: reqwest::Client,
    search_url: Url,
}

impl OpenFoodFactsCatalog {
    pub fn new(search_url: &str, timeout_ms: u64) -> Result<Self, SearchError> {
        let search_url = Url::parse(search_url).map_err(|err| SearchError::InvalidUrl {
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

        Ok(Self { client, search_url })
    }

    fn request_url(&self, query: &str) -> Url {
        let mut url = self.search_url.clone();
        url.query_pairs_mut()
            .append_pair("search_terms", query)
            .append_pair("search_simple", "1")
            .append_pair("action", "process")
            .append_pair("json", "1")
            .append_pair("page_size", PAGE_SIZE);
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
        if !status.is_success() {
            return Err(SearchError::Status {
                catalog: CATALOG,
                status: status.as_u16(),
            });
        }

        let body: SearchResponse =
            response
                .json()
                .await
                .map_err(|err| SearchError::InvalidPayload {
                    catalog: CATALOG,
                    message: err.to_string(),
                })?;

        Ok(candidates_from_products(body.products))
    }
}

impl ProductCatalog for OpenFoodFactsCatalog {
    fn name(&self) -> &'static str {
        CATALOG
    }

    fn serves(&self, event_type: EventType) -> bool {
        matches!(event_type, EventType::Food | EventType::Supplement)
    }

    fn search<'a>(&'a self, query: &'a str, _event_type: EventType) -> CatalogFuture<'a> {
        Box::pin(async move { self.fetch(query).await })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
struct Product {
    code: Option<String>,
    product_name: Option<String>,
    brands: Option<String>,
    serving_size: Option<String>,
    #[serde(default)]
    nutriments: BTreeMap<String, Value>,
}

fn candidates_from_products(products: Vec<Product>) -> Vec<ProductCandidate> {
    products
        .into_iter()
        .filter_map(|product| {
            let name = product.product_name?.trim().to_string();
            let source_id = product.code?.trim().to_string();
            if name.is_empty() || source_id.is_empty() {
                return None;
            }
            Some((source_id, name, product.brands, product.serving_size, product.nutriments))
        })
        .enumerate()
        .map(|(index, (source_id, name, brands, serving_size, nutriments))| ProductCandidate {
            source: CATALOG.to_string(),
            source_id,
            name,
            brand: brands.as_deref().and_then(first_brand),
            facts: nutrient_facts(&nutriments),
            serving_size: serving_size
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            confidence: rank_confidence(index),
        })
        .collect()
}

/// The catalog stores brands as a comma-separated list; the first is the owner.
fn first_brand(brands: &str) -> Option<String> {
    brands
        .split(',')
        .map(str::trim)
        .find(|brand| !brand.is_empty())
        .map(ToString::to_string)
}

fn nutrient_facts(nutriments: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    NUTRIMENT_FACTS
        .iter()
        .filter_map(|(source_key, fact)| {
            let value = match nutriments.get(*source_key)? {
                Value::Number(number) => number.to_string(),
                Value::String(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => return None,
            };
            Some(((*fact).to_string(), value))
        })
        .collect()
}
