//! Dispatch engine configuration.
//!
//! This module provides the tunables of the batch dispatch engine: the
//! concurrency cap, per-task timeout, retry policy, optional batch deadline
//! and whether a shared execution-context pool is acquired per batch.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default maximum number of tasks executed simultaneously.
pub const DEFAULT_MAX_CONCURRENCY: usize = 6;

/// Default per-attempt timeout.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_millis(120_000);

/// Default number of retries after a failed first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Configuration for the dispatch controller.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    // Scheduling
    /// Upper bound on concurrently executing tasks.
    pub max_concurrency: usize,
    /// Time allowed for a single attempt of a task.
    pub task_timeout: Duration,
    /// Retries after the first attempt (total attempts = retries + 1).
    pub max_retries: u32,
    /// Pause between a failed attempt and its retry.
    pub retry_backoff: Duration,
    /// Optional wall-clock ceiling for a whole batch.
    pub batch_timeout: Option<Duration>,

    // Resources
    /// Whether a shared pool of execution contexts is acquired per batch.
    pub use_context_pool: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::ZERO,
            batch_timeout: None,
            use_context_pool: true,
        }
    }
}

/// On-disk representation of [`DispatchConfig`]. Every field is optional
/// and falls back to the default.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct DispatchConfigFile {
    max_concurrency: Option<usize>,
    task_timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    retry_backoff_ms: Option<u64>,
    batch_timeout_ms: Option<u64>,
    use_context_pool: Option<bool>,
}

impl DispatchConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DISPATCH_MAX_CONCURRENCY`: Concurrency cap (default: 6)
    /// - `DISPATCH_TASK_TIMEOUT_MS`: Per-attempt timeout in ms (default: 120000)
    /// - `DISPATCH_MAX_RETRIES`: Retries after the first attempt (default: 1)
    /// - `DISPATCH_RETRY_BACKOFF_MS`: Pause before a retry in ms (default: 0)
    /// - `DISPATCH_BATCH_TIMEOUT_MS`: Batch wall-clock ceiling in ms (default: unset)
    /// - `DISPATCH_USE_CONTEXT_POOL`: Acquire an execution-context pool (default: true)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary key lookup using the same
    /// variable names as [`DispatchConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("DISPATCH_MAX_CONCURRENCY") {
            config.max_concurrency = parse_env_value(&val, "DISPATCH_MAX_CONCURRENCY")?;
        }

        if let Some(val) = lookup("DISPATCH_TASK_TIMEOUT_MS") {
            let ms: u64 = parse_env_value(&val, "DISPATCH_TASK_TIMEOUT_MS")?;
            config.task_timeout = Duration::from_millis(ms);
        }

        if let Some(val) = lookup("DISPATCH_MAX_RETRIES") {
            config.max_retries = parse_env_value(&val, "DISPATCH_MAX_RETRIES")?;
        }

        if let Some(val) = lookup("DISPATCH_RETRY_BACKOFF_MS") {
            let ms: u64 = parse_env_value(&val, "DISPATCH_RETRY_BACKOFF_MS")?;
            config.retry_backoff = Duration::from_millis(ms);
        }

        if let Some(val) = lookup("DISPATCH_BATCH_TIMEOUT_MS") {
            let ms: u64 = parse_env_value(&val, "DISPATCH_BATCH_TIMEOUT_MS")?;
            config.batch_timeout = Some(Duration::from_millis(ms));
        }

        if let Some(val) = lookup("DISPATCH_USE_CONTEXT_POOL") {
            config.use_context_pool = parse_env_bool(&val, "DISPATCH_USE_CONTEXT_POOL")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    ///
    /// Durations are given in milliseconds (`task_timeout_ms`,
    /// `retry_backoff_ms`, `batch_timeout_ms`).
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parses configuration from a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let file: DispatchConfigFile = serde_yaml::from_str(content)?;
        let defaults = Self::default();

        let config = Self {
            max_concurrency: file.max_concurrency.unwrap_or(defaults.max_concurrency),
            task_timeout: file
                .task_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.task_timeout),
            max_retries: file.max_retries.unwrap_or(defaults.max_retries),
            retry_backoff: file
                .retry_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            batch_timeout: file.batch_timeout_ms.map(Duration::from_millis),
            use_context_pool: file.use_context_pool.unwrap_or(defaults.use_context_pool),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.task_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "task_timeout must be greater than 0".to_string(),
            ));
        }

        if let Some(batch_timeout) = self.batch_timeout {
            if batch_timeout.is_zero() {
                return Err(ConfigError::ValidationFailed(
                    "batch_timeout must be greater than 0 when set".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Total attempts a task gets before it is reported failed.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Number of workers for a batch of `task_count` tasks.
    pub fn concurrency_for(&self, task_count: usize) -> usize {
        self.max_concurrency.min(task_count)
    }

    /// Builder method to set the concurrency cap.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Builder method to set the per-attempt timeout.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Builder method to set the retry count.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Builder method to set the retry back-off.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Builder method to set the batch deadline.
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    /// Builder method to enable or disable the execution-context pool.
    pub fn with_context_pool(mut self, enabled: bool) -> Self {
        self.use_context_pool = enabled;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = DispatchConfig::default();
        assert_eq!(config.max_concurrency, 6);
        assert_eq!(config.task_timeout, Duration::from_millis(120_000));
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.max_attempts(), 2);
        assert_eq!(config.retry_backoff, Duration::ZERO);
        assert!(config.batch_timeout.is_none());
        assert!(config.use_context_pool);
    }

    #[test]
    fn test_config_builder() {
        let config = DispatchConfig::new()
            .with_max_concurrency(2)
            .with_task_timeout(Duration::from_secs(5))
            .with_max_retries(3)
            .with_retry_backoff(Duration::from_millis(50))
            .with_batch_timeout(Duration::from_secs(60))
            .with_context_pool(false);

        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.task_timeout, Duration::from_secs(5));
        assert_eq!(config.max_attempts(), 4);
        assert_eq!(config.retry_backoff, Duration::from_millis(50));
        assert_eq!(config.batch_timeout, Some(Duration::from_secs(60)));
        assert!(!config.use_context_pool);
    }

    #[test]
    fn test_concurrency_for() {
        let config = DispatchConfig::default();
        assert_eq!(config.concurrency_for(0), 0);
        assert_eq!(config.concurrency_for(3), 3);
        assert_eq!(config.concurrency_for(100), 6);
    }

    #[test]
    fn test_validation_invalid_concurrency() {
        let result = DispatchConfig::default().with_max_concurrency(0).validate();
        assert!(result.unwrap_err().to_string().contains("max_concurrency"));
    }

    #[test]
    fn test_validation_invalid_timeout() {
        let result = DispatchConfig::default()
            .with_task_timeout(Duration::ZERO)
            .validate();
        assert!(result.unwrap_err().to_string().contains("task_timeout"));
    }

    #[test]
    fn test_validation_invalid_batch_timeout() {
        let result = DispatchConfig::default()
            .with_batch_timeout(Duration::ZERO)
            .validate();
        assert!(result.unwrap_err().to_string().contains("batch_timeout"));
    }

    #[test]
    fn test_from_lookup() {
        let config = DispatchConfig::from_lookup(lookup_from(&[
            ("DISPATCH_MAX_CONCURRENCY", "3"),
            ("DISPATCH_TASK_TIMEOUT_MS", "2500"),
            ("DISPATCH_MAX_RETRIES", "0"),
            ("DISPATCH_BATCH_TIMEOUT_MS", "10000"),
            ("DISPATCH_USE_CONTEXT_POOL", "off"),
        ]))
        .unwrap();

        assert_eq!(config.max_concurrency, 3);
        assert_eq!(config.task_timeout, Duration::from_millis(2500));
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.batch_timeout, Some(Duration::from_secs(10)));
        assert!(!config.use_context_pool);
    }

    #[test]
    fn test_from_lookup_empty_is_default() {
        let config = DispatchConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, DispatchConfig::default());
    }

    #[test]
    fn test_from_lookup_invalid_value() {
        let err = DispatchConfig::from_lookup(lookup_from(&[("DISPATCH_MAX_RETRIES", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("DISPATCH_MAX_RETRIES"));

        let err =
            DispatchConfig::from_lookup(lookup_from(&[("DISPATCH_MAX_CONCURRENCY", "0")]))
                .unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn test_from_yaml_str() {
        let config = DispatchConfig::from_yaml_str(
            "max_concurrency: 4\ntask_timeout_ms: 30000\nretry_backoff_ms: 250\n",
        )
        .unwrap();

        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.task_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_backoff, Duration::from_millis(250));
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_from_yaml_str_rejects_unknown_keys() {
        let result = DispatchConfig::from_yaml_str("max_workers: 4\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("YES", "test").unwrap());
        assert!(!parse_env_bool("off", "test").unwrap());
        assert!(!parse_env_bool("0", "test").unwrap());
        assert!(parse_env_bool("maybe", "test").is_err());
    }
}
