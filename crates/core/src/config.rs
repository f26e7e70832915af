use crate::error::{DecisionError, DecisionResult};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Poll-period value that turns a polling loop off entirely.
pub const POLL_DISABLED_MS: i64 = -1;

/// Root service configuration. Loaded from environment variables
/// with the prefix `DECISION_SERVICE__` or built in code.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub authorization_token: String,
    /// Salt for seed derivation. Falls back to the authorization token.
    #[serde(default)]
    pub application_key: Option<String>,
    #[serde(default)]
    pub offline_mode: bool,
    #[serde(default)]
    pub blob_output_dir: Option<PathBuf>,
    #[serde(default)]
    pub join_server: JoinServerType,
    #[serde(default)]
    pub logging_service_address: Option<String>,
    #[serde(default = "default_poll_period_ms")]
    pub settings_poll_period_ms: i64,
    #[serde(default = "default_poll_period_ms")]
    pub model_poll_period_ms: i64,
    #[serde(default = "default_num_actions")]
    pub default_num_actions: u32,
    #[serde(default)]
    pub record_all_decisions: bool,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default)]
    pub batching: BatchConfig,
}

/// Which telemetry backend receives decisions, rewards and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinServerType {
    /// Built-in batching uploader.
    #[default]
    DecisionService,
    /// Caller-supplied recorder receives every record.
    CustomSolution,
}

/// What the batch writer does with a batch once all upload retries failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryExhaustedPolicy {
    /// Drop the batch and report it through the failure callback.
    #[default]
    Drop,
    /// Put the records back at the head of the buffer if there is room.
    Requeue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_records_per_batch")]
    pub max_records_per_batch: usize,
    #[serde(default = "default_max_flush_latency_ms")]
    pub max_flush_latency_ms: u64,
    #[serde(default = "default_max_buffered_records")]
    pub max_buffered_records: usize,
    #[serde(default = "default_max_upload_retries")]
    pub max_upload_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub on_retry_exhausted: RetryExhaustedPolicy,
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

/// A validated polling period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPeriod {
    Disabled,
    Every(Duration),
}

impl PollPeriod {
    pub fn from_millis(ms: i64) -> DecisionResult<Self> {
        match ms {
            POLL_DISABLED_MS => Ok(Self::Disabled),
            ms if ms > 0 => Ok(Self::Every(Duration::from_millis(ms as u64))),
            ms => Err(DecisionError::Config(format!(
                "invalid polling period {ms}ms: must be positive or {POLL_DISABLED_MS} to disable"
            ))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Every(_))
    }
}

// Default functions
fn default_poll_period_ms() -> i64 {
    5000
}
fn default_num_actions() -> u32 {
    2
}
fn default_stop_timeout_ms() -> u64 {
    5000
}
fn default_max_records_per_batch() -> usize {
    1024
}
fn default_max_flush_latency_ms() -> u64 {
    5000
}
fn default_max_buffered_records() -> usize {
    100_000
}
fn default_max_upload_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    200
}
fn default_drain_timeout_ms() -> u64 {
    5000
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_records_per_batch: default_max_records_per_batch(),
            max_flush_latency_ms: default_max_flush_latency_ms(),
            max_buffered_records: default_max_buffered_records(),
            max_upload_retries: default_max_upload_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            on_retry_exhausted: RetryExhaustedPolicy::default(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> DecisionResult<()> {
        if self.max_records_per_batch == 0 {
            return Err(DecisionError::Config(
                "batching.max_records_per_batch must be positive".to_string(),
            ));
        }
        if self.max_flush_latency_ms == 0 {
            return Err(DecisionError::Config(
                "batching.max_flush_latency_ms must be positive".to_string(),
            ));
        }
        if self.max_buffered_records < self.max_records_per_batch {
            return Err(DecisionError::Config(format!(
                "batching.max_buffered_records ({}) must be at least max_records_per_batch ({})",
                self.max_buffered_records, self.max_records_per_batch
            )));
        }
        Ok(())
    }

    pub fn max_flush_latency(&self) -> Duration {
        Duration::from_millis(self.max_flush_latency_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl ServiceConfig {
    /// A configuration with defaults for everything but the token.
    pub fn new(authorization_token: impl Into<String>) -> Self {
        Self {
            authorization_token: authorization_token.into(),
            application_key: None,
            offline_mode: false,
            blob_output_dir: None,
            join_server: JoinServerType::default(),
            logging_service_address: None,
            settings_poll_period_ms: default_poll_period_ms(),
            model_poll_period_ms: default_poll_period_ms(),
            default_num_actions: default_num_actions(),
            record_all_decisions: false,
            stop_timeout_ms: default_stop_timeout_ms(),
            batching: BatchConfig::default(),
        }
    }

    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("DECISION_SERVICE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Reject every invalid field before any component is built.
    pub fn validate(&self) -> DecisionResult<()> {
        if self.authorization_token.trim().is_empty() {
            return Err(DecisionError::Config(
                "authorization_token cannot be empty".to_string(),
            ));
        }
        if let Some(address) = &self.logging_service_address {
            if address.trim().is_empty() {
                return Err(DecisionError::Config(
                    "logging_service_address cannot be empty".to_string(),
                ));
            }
        }
        if self.default_num_actions == 0 {
            return Err(DecisionError::Config(
                "default_num_actions must be positive".to_string(),
            ));
        }
        self.settings_poll_period()?;
        self.model_poll_period()?;
        self.batching.validate()
    }

    pub fn settings_poll_period(&self) -> DecisionResult<PollPeriod> {
        PollPeriod::from_millis(self.settings_poll_period_ms)
    }

    pub fn model_poll_period(&self) -> DecisionResult<PollPeriod> {
        PollPeriod::from_millis(self.model_poll_period_ms)
    }

    /// Seed salt shared by every decision of this service instance.
    pub fn application_key(&self) -> &str {
        self.application_key
            .as_deref()
            .unwrap_or(&self.authorization_token)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn disable_polling(mut self) -> Self {
        self.settings_poll_period_ms = POLL_DISABLED_MS;
        self.model_poll_period_ms = POLL_DISABLED_MS;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_rejected_online() {
        let config = ServiceConfig::new("  ");
        assert!(matches!(config.validate(), Err(DecisionError::Config(_))));
    }

    #[test]
    fn test_empty_token_rejected_offline() {
        let mut config = ServiceConfig::new("");
        config.offline_mode = true;
        assert!(matches!(config.validate(), Err(DecisionError::Config(_))));
    }

    #[test]
    fn test_poll_period_sentinel() {
        assert_eq!(PollPeriod::from_millis(-1).unwrap(), PollPeriod::Disabled);
        assert_eq!(
            PollPeriod::from_millis(250).unwrap(),
            PollPeriod::Every(Duration::from_millis(250))
        );
        assert!(PollPeriod::from_millis(0).is_err());
        assert!(PollPeriod::from_millis(-5).is_err());
    }

    #[test]
    fn test_blank_logging_address_rejected() {
        let mut config = ServiceConfig::new("token");
        config.logging_service_address = Some(" ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_batch_config_bounds() {
        let mut batching = BatchConfig::default();
        batching.max_records_per_batch = 0;
        assert!(batching.validate().is_err());

        let mut batching = BatchConfig::default();
        batching.max_buffered_records = batching.max_records_per_batch - 1;
        assert!(batching.validate().is_err());
    }

    #[test]
    fn test_application_key_falls_back_to_token() {
        let mut config = ServiceConfig::new("token-1");
        assert_eq!(config.application_key(), "token-1");
        config.application_key = Some("app".to_string());
        assert_eq!(config.application_key(), "app");
    }
}
