use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::config_env::{
    optional_trimmed_env, parse_f64_env, parse_u32_env, parse_u64_env, parse_usize_env,
};
use crate::registry::matcher::DEFAULT_FUZZY_MIN_SCORE;
use crate::timezone::{DEFAULT_USER_TIME_ZONE, normalize_time_zone};

const DEFAULT_OPEN_FOOD_FACTS_SEARCH_URL: &str = "https://world.openfoodfacts.org/cgi/search.pl";
const DEFAULT_OPEN_FDA_LABEL_URL: &str = "https://api.fda.gov/drug/label.json";
const DEFAULT_CATALOG_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SEARCH_MAX_CANDIDATES: usize = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid number in env var {0}")]
    ParseFloat(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Pipeline settings outside the model provider, which reads its own keys.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub migrations_dir: PathBuf,
    pub search: SearchConfig,
    pub registry_fuzzy_min_score: f64,
    pub default_time_zone: String,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub open_food_facts_search_url: String,
    pub open_fda_label_url: String,
    pub catalog_timeout_ms: u64,
    pub max_candidates: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            open_food_facts_search_url: DEFAULT_OPEN_FOOD_FACTS_SEARCH_URL.to_string(),
            open_fda_label_url: DEFAULT_OPEN_FDA_LABEL_URL.to_string(),
            catalog_timeout_ms: DEFAULT_CATALOG_TIMEOUT_MS,
            max_candidates: DEFAULT_SEARCH_MAX_CANDIDATES,
        }
    }
}

impl IntakeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let registry_fuzzy_min_score =
            parse_f64_env("REGISTRY_FUZZY_MIN_SCORE", DEFAULT_FUZZY_MIN_SCORE)?;
        if !(0.0..=1.0).contains(&registry_fuzzy_min_score) {
            return Err(ConfigError::InvalidConfiguration(
                "REGISTRY_FUZZY_MIN_SCORE must be between 0 and 1".to_string(),
            ));
        }

        let default_time_zone = match optional_trimmed_env("DEFAULT_TIME_ZONE") {
            Some(raw) => normalize_time_zone(&raw).ok_or_else(|| {
                ConfigError::InvalidConfiguration(format!(
                    "DEFAULT_TIME_ZONE is not an IANA time zone: {raw}"
                ))
            })?,
            None => DEFAULT_USER_TIME_ZONE.to_string(),
        };

        Ok(Self {
            database_url: optional_trimmed_env("DATABASE_URL"),
            database_max_connections: parse_u32_env("DATABASE_MAX_CONNECTIONS", 5)?,
            migrations_dir: env::var("MIGRATIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../db/migrations")
                }),
            search: SearchConfig::from_env()?,
            registry_fuzzy_min_score,
            default_time_zone,
        })
    }
}

impl SearchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            open_food_facts_search_url: optional_trimmed_env("OPEN_FOOD_FACTS_SEARCH_URL")
                .unwrap_or_else(|| DEFAULT_OPEN_FOOD_FACTS_SEARCH_URL.to_string()),
            open_fda_label_url: optional_trimmed_env("OPEN_FDA_LABEL_URL")
                .unwrap_or_else(|| DEFAULT_OPEN_FDA_LABEL_URL.to_string()),
            catalog_timeout_ms: parse_u64_env("CATALOG_TIMEOUT_MS", DEFAULT_CATALOG_TIMEOUT_MS)?,
            max_candidates: parse_usize_env(
                "SEARCH_MAX_CANDIDATES",
                DEFAULT_SEARCH_MAX_CANDIDATES,
            )?,
        };

        for (key, url) in [
            ("OPEN_FOOD_FACTS_SEARCH_URL", &config.open_food_facts_search_url),
            ("OPEN_FDA_LABEL_URL", &config.open_fda_label_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "{key} must start with http:// or https://"
                )));
            }
        }
        if config.max_candidates == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "SEARCH_MAX_CANDIDATES must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }
}
