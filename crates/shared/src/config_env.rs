use std::env;
use std::str::FromStr;

use crate::config::ConfigError;

pub(crate) fn require_env(key: &str) -> Result<String, ConfigError> {
    optional_trimmed_env(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()))
}

pub(crate) fn parse_u32_env(key: &str, default: u32) -> Result<u32, ConfigError> {
    parse_env(key, default, ConfigError::ParseInt)
}

pub(crate) fn parse_u64_env(key: &str, default: u64) -> Result<u64, ConfigError> {
    parse_env(key, default, ConfigError::ParseInt)
}

pub(crate) fn parse_usize_env(key: &str, default: usize) -> Result<usize, ConfigError> {
    parse_env(key, default, ConfigError::ParseInt)
}

pub(crate) fn parse_f64_env(key: &str, default: f64) -> Result<f64, ConfigError> {
    let value = parse_env(key, default, ConfigError::ParseFloat)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::ParseFloat(key.to_string()))
    }
}

pub(crate) fn optional_trimmed_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_env<T: FromStr>(
    key: &str,
    default: T,
    on_error: fn(String) -> ConfigError,
) -> Result<T, ConfigError> {
    match optional_trimmed_env(key) {
        Some(raw) => raw.parse::<T>().map_err(|_| on_error(key.to_string())),
        None => Ok(default),
    }
}
