use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identity::ValidatedUserId;
use crate::models::RegistryEntry;
use crate::repos::{RegistryStore, StoreError};

use super::normalize::normalize_product_key;
use super::phonetic::canonicalize_key;

pub const DEFAULT_FUZZY_MIN_SCORE: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryMatchSource {
    UserRegistry,
    UserRegistryFuzzy,
}

impl RegistryMatchSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserRegistry => "user_registry",
            Self::UserRegistryFuzzy => "user_registry_fuzzy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryMatch {
    pub entry: RegistryEntry,
    pub source: RegistryMatchSource,
    pub score: f64,
    pub query_key: String,
}

#[derive(Clone)]
pub struct RegistryMatcher {
    store: Arc<dyn RegistryStore>,
    min_fuzzy_score: f64,
}

impl RegistryMatcher {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self {
            store,
            min_fuzzy_score: DEFAULT_FUZZY_MIN_SCORE,
        }
    }

    pub fn with_min_fuzzy_score(mut self, min_fuzzy_score: f64) -> Self {
        self.min_fuzzy_score = min_fuzzy_score.clamp(0.0, 1.0);
        self
    }

    /// Exact phase, then the phonetic-fuzzy phase. A miss is `Ok(None)`.
    pub async fn lookup(
        &self,
        user_id: &ValidatedUserId,
        query: &str,
    ) -> Result<Option<RegistryMatch>, StoreError> {
        if let Some(exact) = self.find_exact(user_id, query).await? {
            return Ok(Some(exact));
        }
        self.find_fuzzy(user_id, query).await
    }

    pub async fn find_exact(
        &self,
        user_id: &ValidatedUserId,
        query: &str,
    ) -> Result<Option<RegistryMatch>, StoreError> {
        let query_key = normalize_product_key(query);
        if query_key.is_empty() {
            return Ok(None);
        }

        let entry = self
            .store
            .find_registry_entry(user_id.as_uuid(), &query_key)
            .await?;

        Ok(entry.map(|entry| RegistryMatch {
            entry,
            source: RegistryMatchSource::UserRegistry,
            score: 1.0,
            query_key,
        }))
    }

    pub async fn find_fuzzy(
        &self,
        user_id: &ValidatedUserId,
        query: &str,
    ) -> Result<Option<RegistryMatch>, StoreError> {
        let query_key = normalize_product_key(query);
        if query_key.is_empty() {
            return Ok(None);
        }

        let entries = self
            .store
            .list_registry_entries(user_id.as_uuid())
            .await?;
        let best = best_fuzzy_match(&query_key, &entries, self.min_fuzzy_score);

        debug!(
            user_id = %user_id,
            candidates = entries.len(),
            matched = best.is_some(),
            "registry fuzzy lookup finished"
        );

        Ok(best.map(|(entry, score)| RegistryMatch {
            entry: entry.clone(),
            source: RegistryMatchSource::UserRegistryFuzzy,
            score,
            query_key,
        }))
    }
}

/// Highest-scoring entry at or above `min_score`. Ties prefer the entry
/// logged more often, then the lexicographically smaller key.
pub fn best_fuzzy_match<'a>(
    query_key: &str,
    entries: &'a [RegistryEntry],
    min_score: f64,
) -> Option<(&'a RegistryEntry, f64)> {
    entries
        .iter()
        .map(|entry| (entry, similarity_score(query_key, &entry.product_key)))
        .filter(|(_, score)| *score >= min_score)
        .max_by(|(left, left_score), (right, right_score)| {
            left_score
                .partial_cmp(right_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| left.times_logged.cmp(&right.times_logged))
                .then_with(|| right.product_key.cmp(&left.product_key))
        })
}

/// Symmetric token-overlap score in `[0, 1]` over phonetically canonical tokens.
/// Token pairs are compared with normalized Levenshtein similarity.
pub fn similarity_score(left_key: &str, right_key: &str) -> f64 {
    let left = canonicalize_key(left_key);
    let right = canonicalize_key(right_key);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let mut left_sorted = left.clone();
    let mut right_sorted = right.clone();
    left_sorted.sort();
    right_sorted.sort();
    if left_sorted == right_sorted {
        return 1.0;
    }

    (directional_overlap(&left, &right) + directional_overlap(&right, &left)) / 2.0
}

fn directional_overlap(from: &[String], to: &[String]) -> f64 {
    let total: f64 = from
        .iter()
        .map(|token| {
            to.iter()
                .map(|other| strsim::normalized_levenshtein(token, other))
                .fold(0.0_f64, f64::max)
        })
        .sum();
    total / from.len() as f64
}
