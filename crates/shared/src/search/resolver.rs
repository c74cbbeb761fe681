use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::catalog::ProductCatalog;
use crate::models::{EventType, ProductCandidate};
use crate::registry::matcher::similarity_score;
use crate::registry::normalize::normalize_product_key;

pub const DEFAULT_MAX_CANDIDATES: usize = 5;

const SIMILARITY_WEIGHT: f64 = 0.6;
const CATALOG_WEIGHT: f64 = 0.4;

#[derive(Clone)]
pub struct ProductResolver {
    catalogs: Vec<Arc<dyn ProductCatalog>>,
    max_candidates: usize,
}

impl ProductResolver {
    pub fn new(catalogs: Vec<Arc<dyn ProductCatalog>>, max_candidates: usize) -> Self {
        Self {
            catalogs,
            max_candidates: max_candidates.max(1),
        }
    }

    pub fn without_catalogs() -> Self {
        Self::new(Vec::new(), DEFAULT_MAX_CANDIDATES)
    }

    /// Ranked candidates for `query`. Catalog failures are logged and count
    /// as zero results, so the worst case is an empty list.
    pub async fn resolve(&self, query: &str, event_type: EventType) -> Vec<ProductCandidate> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let mut collected = Vec::new();
        for catalog in self.catalogs.iter().filter(|catalog| catalog.serves(event_type)) {
            let started = Instant::now();
            match catalog.search(query, event_type).await {
                Ok(candidates) => {
                    debug!(
                        catalog = catalog.name(),
                        event_type = %event_type,
                        results = candidates.len(),
                        latency_ms = started.elapsed().as_millis() as u64,
                        "catalog search finished"
                    );
                    collected.extend(candidates);
                }
                Err(err) => {
                    warn!(
                        catalog = catalog.name(),
                        event_type = %event_type,
                        latency_ms = started.elapsed().as_millis() as u64,
                        error = %err,
                        "catalog search failed; continuing without its results"
                    );
                }
            }
        }

        rank_candidates(query, collected, self.max_candidates)
    }
}

/// Rescores by `0.6 * similarity * 100 + 0.4 * catalog confidence`, keeps the
/// best candidate per normalized name, and truncates to `max_candidates`.
pub fn rank_candidates(
    query: &str,
    candidates: Vec<ProductCandidate>,
    max_candidates: usize,
) -> Vec<ProductCandidate> {
    let query_key = normalize_product_key(query);
    let mut best_by_key: HashMap<String, ProductCandidate> = HashMap::new();

    for mut candidate in candidates {
        let key = normalize_product_key(&candidate.display_name());
        if key.is_empty() {
            continue;
        }

        let similarity = similarity_score(&query_key, &key);
        let catalog_confidence = candidate.confidence.clamp(0.0, 100.0);
        candidate.confidence =
            SIMILARITY_WEIGHT * similarity * 100.0 + CATALOG_WEIGHT * catalog_confidence;

        match best_by_key.get(&key) {
            Some(existing) if existing.confidence >= candidate.confidence => {}
            _ => {
                best_by_key.insert(key, candidate);
            }
        }
    }

    let mut ranked: Vec<(String, ProductCandidate)> = best_by_key.into_iter().collect();
    ranked.sort_by(|(left_key, left), (right_key, right)| {
        right
            .confidence
            .partial_cmp(&left.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left_key.cmp(right_key))
    });
    ranked.truncate(max_candidates);
    ranked.into_iter().map(|(_, candidate)| candidate).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::rank_candidates;
    use crate::models::ProductCandidate;

    fn candidate(name: &str, brand: Option<&str>, confidence: f64) -> ProductCandidate {
        ProductCandidate {
            source: "test".to_string(),
            source_id: name.to_string(),
            name: name.to_string(),
            brand: brand.map(ToString::to_string),
            facts: BTreeMap::new(),
            serving_size: None,
            confidence,
        }
    }

    #[test]
    fn blends_similarity_with_catalog_confidence() {
        let ranked = rank_candidates(
            "lmnt citrus salt",
            vec![
                candidate("Raspberry Salt", Some("LMNT"), 60.0),
                candidate("Citrus Salt", Some("LMNT"), 50.0),
            ],
            5,
        );

        assert_eq!(ranked[0].name, "Citrus Salt");
        assert!((ranked[0].confidence - (60.0 + 20.0)).abs() < 1e-9);
        assert!(ranked[1].confidence < ranked[0].confidence);
    }

    #[test]
    fn duplicates_collapse_to_their_best_score() {
        let ranked = rank_candidates(
            "vitamin d3",
            vec![
                candidate("Vitamin D3", None, 40.0),
                candidate("vitamin d3!", None, 80.0),
                candidate("Vitamin C", None, 90.0),
            ],
            5,
        );

        let d3: Vec<_> = ranked
            .iter()
            .filter(|candidate| candidate.name.to_lowercase().starts_with("vitamin d3"))
            .collect();
        assert_eq!(d3.len(), 1);
        assert_eq!(d3[0].source_id, "vitamin d3!");
    }

    #[test]
    fn truncates_to_the_limit_and_tolerates_empty_input() {
        let many = (0..9)
            .map(|index| candidate(&format!("Magnesium {index}"), None, f64::from(index)))
            .collect();
        assert_eq!(rank_candidates("magnesium", many, 5).len(), 5);
        assert!(rank_candidates("magnesium", Vec::new(), 5).is_empty());
    }
}
