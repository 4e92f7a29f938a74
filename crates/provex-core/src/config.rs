//! Executor configuration and its environment overrides.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to read '{path}': {message}")]
    Io { path: String, message: String },
    #[error("failed to parse '{path}': {message}")]
    Parse { path: String, message: String },
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

/// How plugin registration failures are handled at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Any invalid plugin aborts catalog construction.
    #[default]
    Strict,
    /// Invalid plugins are skipped with a warning.
    Permissive,
}

impl std::str::FromStr for LoadMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            other => Err(ConfigError::InvalidValue {
                key: String::from("PROVEX_LOAD_MODE"),
                value: other.to_owned(),
            }),
        }
    }
}

/// Runtime knobs for a [`CommandExecutor`](crate::executor::CommandExecutor).
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Per-invocation deadline covering every provider request.
    pub timeout: Duration,
    /// Upper bound on concurrent sub-requests during fan-out.
    pub fan_out_limit: usize,
    /// Cache TTL for providers that do not declare one.
    pub cache_ttl: Duration,
    /// Higher wins; unlisted providers rank 0 and keep declaration order.
    pub provider_priorities: HashMap<String, i32>,
    pub load_mode: LoadMode,
    /// Replaces every provider's retry policy when set.
    pub retry_override: Option<RetryConfig>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            fan_out_limit: 4,
            cache_ttl: Duration::from_secs(300),
            provider_priorities: HashMap::new(),
            load_mode: LoadMode::Strict,
            retry_override: None,
        }
    }
}

impl ExecutorConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fan_out_limit(mut self, limit: usize) -> Self {
        self.fan_out_limit = limit.max(1);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_priority(mut self, provider: impl Into<String>, priority: i32) -> Self {
        self.provider_priorities.insert(provider.into(), priority);
        self
    }

    pub fn with_load_mode(mut self, mode: LoadMode) -> Self {
        self.load_mode = mode;
        self
    }

    pub fn with_retry_override(mut self, retry: RetryConfig) -> Self {
        self.retry_override = Some(retry);
        self
    }

    /// Defaults overlaid with `PROVEX_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Recognized keys: `PROVEX_TIMEOUT_MS`, `PROVEX_FAN_OUT_LIMIT`,
    /// `PROVEX_CACHE_TTL_SECS`, `PROVEX_LOAD_MODE`, `PROVEX_MAX_RETRIES`
    /// and `PROVEX_PROVIDER_PRIORITY` (`fred=10,federal_reserve=5`).
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup("PROVEX_TIMEOUT_MS") {
            config.timeout = Duration::from_millis(parse_number("PROVEX_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = lookup("PROVEX_FAN_OUT_LIMIT") {
            let limit: u64 = parse_number("PROVEX_FAN_OUT_LIMIT", &value)?;
            config = config.with_fan_out_limit(limit as usize);
        }
        if let Some(value) = lookup("PROVEX_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(parse_number("PROVEX_CACHE_TTL_SECS", &value)?);
        }
        if let Some(value) = lookup("PROVEX_LOAD_MODE") {
            config.load_mode = value.parse()?;
        }
        if let Some(value) = lookup("PROVEX_MAX_RETRIES") {
            let retries = parse_number("PROVEX_MAX_RETRIES", &value)?;
            config.retry_override = Some(if retries == 0 {
                RetryConfig::no_retry()
            } else {
                RetryConfig::exponential(retries as u32)
            });
        }
        if let Some(value) = lookup("PROVEX_PROVIDER_PRIORITY") {
            for entry in value.split(',').filter(|entry| !entry.trim().is_empty()) {
                let invalid = || ConfigError::InvalidValue {
                    key: String::from("PROVEX_PROVIDER_PRIORITY"),
                    value: entry.to_owned(),
                };
                let (provider, rank) = entry.split_once('=').ok_or_else(invalid)?;
                let rank: i32 = rank.trim().parse().map_err(|_| invalid())?;
                config
                    .provider_priorities
                    .insert(provider.trim().to_owned(), rank);
            }
        }
        Ok(config)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ExecutorConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.fan_out_limit, 4);
        assert_eq!(config.load_mode, LoadMode::Strict);
        assert!(config.retry_override.is_none());
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = ExecutorConfig::from_lookup(lookup(&[
            ("PROVEX_TIMEOUT_MS", "1500"),
            ("PROVEX_FAN_OUT_LIMIT", "0"),
            ("PROVEX_LOAD_MODE", "Permissive"),
            ("PROVEX_MAX_RETRIES", "0"),
            ("PROVEX_PROVIDER_PRIORITY", "federal_reserve=10, fred=1"),
        ]))
        .expect("config should parse");

        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.fan_out_limit, 1);
        assert_eq!(config.load_mode, LoadMode::Permissive);
        assert_eq!(config.retry_override, Some(RetryConfig::no_retry()));
        assert_eq!(config.provider_priorities.get("federal_reserve"), Some(&10));
    }

    #[test]
    fn invalid_values_are_reported_with_their_key() {
        let error = ExecutorConfig::from_lookup(lookup(&[("PROVEX_TIMEOUT_MS", "soon")]))
            .expect_err("non-numeric timeout");
        assert_eq!(
            error,
            ConfigError::InvalidValue {
                key: String::from("PROVEX_TIMEOUT_MS"),
                value: String::from("soon"),
            }
        );
    }
}
