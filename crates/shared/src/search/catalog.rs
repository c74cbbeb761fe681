use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::models::{EventType, ProductCandidate};

pub type CatalogFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<ProductCandidate>, SearchError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("catalog {catalog} timed out")]
    Timeout { catalog: &'static str },
    #[error("catalog {catalog} unreachable")]
    Unavailable { catalog: &'static str },
    #[error("catalog {catalog} answered with status {status}")]
    Status { catalog: &'static str, status: u16 },
    #[error("catalog {catalog} returned an invalid payload: {message}")]
    InvalidPayload {
        catalog: &'static str,
        message: String,
    },
    #[error("catalog {catalog} has an invalid url: {message}")]
    InvalidUrl {
        catalog: &'static str,
        message: String,
    },
    #[error("failed to build http client for catalog {catalog}: {message}")]
    HttpClient {
        catalog: &'static str,
        message: String,
    },
}

impl SearchError {
    pub(crate) fn from_reqwest(catalog: &'static str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { catalog }
        } else {
            Self::Unavailable { catalog }
        }
    }
}

/// External product lookup. Implementations return unranked candidates with a
/// catalog-local confidence in `[0, 100]`.
pub trait ProductCatalog: Send + Sync {
    fn name(&self) -> &'static str;

    fn serves(&self, event_type: EventType) -> bool;

    fn search<'a>(&'a self, query: &'a str, event_type: EventType) -> CatalogFuture<'a>;
}

/// Positional confidence for catalogs that rank but do not score.
pub(crate) fn rank_confidence(index: usize) -> f64 {
    (90.0 - 10.0 * index as f64).max(10.0)
}

#[cfg(test)]
mod tests {
    use super::rank_confidence;

    #[test]
    fn rank_confidence_decays_and_floors() {
        assert_eq!(rank_confidence(0), 90.0);
        assert_eq!(rank_confidence(3), 60.0);
        assert_eq!(rank_confidence(40), 10.0);
    }
}
