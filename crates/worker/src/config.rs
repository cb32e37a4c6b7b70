//! Layered worker configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1. `config/default.toml` (optional)
//! 2. `config/<APP_ENV>.toml` (optional, `APP_ENV` defaults to `dev`)
//! 3. environment variables prefixed `DATAACCESS__`, nested with `__`
//!    (e.g. `DATAACCESS__WORKER__CONCURRENCY=8`)
//!
//! Every field has a default, so no source is required.

use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use dataaccess_access::{ClaimRetryPolicy, LeaseConfig};
use dataaccess_observability::LogFormat;
use serde::Deserialize;
use thiserror::Error;

pub const ENV_PREFIX: &str = "DATAACCESS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub lease: LeaseConfig,
    pub worker: WorkerSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Mongodb,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Connection string; only used by networked backends.
    pub uri: String,
    pub database: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            uri: "mongodb://localhost:27017".to_string(),
            database: "dataaccess".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    /// Deadline for each store call; 0 disables it.
    pub operation_timeout_ms: u64,
    pub claim_max_attempts: u32,
    pub claim_base_delay_ms: u64,
    pub claim_max_delay_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 1_000,
            operation_timeout_ms: 5_000,
            claim_max_attempts: 5,
            claim_base_delay_ms: 20,
            claim_max_delay_ms: 1_000,
        }
    }
}

impl WorkerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_ms > 0).then(|| Duration::from_millis(self.operation_timeout_ms))
    }

    pub fn retry_policy(&self) -> ClaimRetryPolicy {
        ClaimRetryPolicy::exponential(
            self.claim_max_attempts,
            Duration::from_millis(self.claim_base_delay_ms),
            Duration::from_millis(self.claim_max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub format: LogFormat,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "worker.concurrency must be at least 1".to_string(),
            ));
        }
        if self.lease.lease_duration_secs == 0 {
            return Err(ConfigError::Invalid(
                "lease.lease_duration_secs must be positive".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Mongodb && self.store.uri.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "store.uri is required for the mongodb backend".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings from `config/default.toml`, `config/<env>.toml`, and env overrides.
pub fn load() -> Result<Settings, ConfigError> {
    let env_name = std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{env_name}")).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
    from_builder(builder)
}

/// Build and validate settings from arbitrary sources.
pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Settings, ConfigError> {
    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<Settings, ConfigError> {
        from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn empty_configuration_uses_defaults() {
        let settings = from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.lease.lease_duration_secs, 30 * 60);
        assert_eq!(settings.log.format, LogFormat::Json);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let settings = from_toml(
            r#"
            [store]
            backend = "mongodb"
            uri = "mongodb://db:27017"

            [lease]
            lease_duration_secs = 90

            [worker]
            concurrency = 8
            operation_timeout_ms = 0

            [log]
            format = "pretty"
            "#,
        )
        .unwrap();

        assert_eq!(settings.store.backend, StoreBackend::Mongodb);
        assert_eq!(settings.store.database, "dataaccess");
        assert_eq!(settings.lease.lease_duration_secs, 90);
        assert_eq!(settings.worker.concurrency, 8);
        assert_eq!(settings.worker.poll_interval_ms, 1_000);
        assert_eq!(settings.worker.operation_timeout(), None);
        assert_eq!(settings.log.format, LogFormat::Pretty);
    }

    #[test]
    fn zero_lease_is_rejected() {
        let err = from_toml("[lease]\nlease_duration_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = from_toml("[worker]\nconcurrency = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_backend_fails_to_load() {
        let err = from_toml("[store]\nbackend = \"cassandra\"").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn retry_policy_follows_worker_settings() {
        let worker = WorkerSettings {
            claim_max_attempts: 2,
            claim_base_delay_ms: 10,
            claim_max_delay_ms: 40,
            ..Default::default()
        };
        let policy = worker.retry_policy();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_millis(40));
    }
}
