use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub busy_timeout: Duration,
    pub max_push_batch: usize,
    pub max_scope_uuids: usize,
    pub rate_limit_window: Duration,
    pub pull_rate_limit_per_window: u32,
    pub push_rate_limit_per_window: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "FIELDSYNC_BIND_ADDR", "127.0.0.1:8080");
        let database_path = PathBuf::from(value_or_default(
            &lookup,
            "FIELDSYNC_DATABASE_PATH",
            "fieldsync.db",
        ));

        let busy_timeout_ms: u64 =
            bounded(&lookup, "FIELDSYNC_BUSY_TIMEOUT_MS", "5000", 0..=60_000)?;
        let max_push_batch = bounded(&lookup, "FIELDSYNC_MAX_PUSH_BATCH", "500", 1..=10_000)?;
        let max_scope_uuids = bounded(&lookup, "FIELDSYNC_MAX_SCOPE_UUIDS", "2000", 1..=20_000)?;
        let rate_limit_window_secs: u64 =
            bounded(&lookup, "RATE_LIMIT_WINDOW_SECS", "60", 10..=3_600)?;
        let pull_rate_limit_per_window =
            bounded(&lookup, "PULL_RATE_LIMIT_PER_WINDOW", "120", 1..=5_000)?;
        let push_rate_limit_per_window =
            bounded(&lookup, "PUSH_RATE_LIMIT_PER_WINDOW", "60", 1..=5_000)?;

        Ok(Self {
            bind_addr,
            database_path,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
            max_push_batch,
            max_scope_uuids,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            pull_rate_limit_per_window,
            push_rate_limit_per_window,
        })
    }
}

/// Parse an integer variable and check it falls within `range`
fn bounded<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Display,
{
    let value = value_or_default(lookup, name, default)
        .parse::<T>()
        .map_err(|_| {
            ConfigError::Invalid(format!(
                "{name} must be an integer in [{}, {}]",
                range.start(),
                range.end()
            ))
        })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.database_path, PathBuf::from("fieldsync.db"));
        assert_eq!(config.busy_timeout, Duration::from_millis(5_000));
        assert_eq!(config.max_push_batch, 500);
        assert_eq!(config.max_scope_uuids, 2_000);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.pull_rate_limit_per_window, 120);
        assert_eq!(config.push_rate_limit_per_window, 60);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("FIELDSYNC_DATABASE_PATH", "   "),
            ("FIELDSYNC_MAX_PUSH_BATCH", " 25 "),
        ])
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("fieldsync.db"));
        assert_eq!(config.max_push_batch, 25);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = config_from(&[("RATE_LIMIT_WINDOW_SECS", "5")]).unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_WINDOW_SECS"));

        let err = config_from(&[("FIELDSYNC_MAX_PUSH_BATCH", "0")]).unwrap_err();
        assert!(err.to_string().contains("FIELDSYNC_MAX_PUSH_BATCH"));
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        let err = config_from(&[("PUSH_RATE_LIMIT_PER_WINDOW", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
