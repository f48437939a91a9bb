//! Configuration for the lifeline daemon and CLI.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use lifeline_delivery::{ClientConfig, RetryPolicy};
use lifeline_sync::PayloadMeta;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "lifeline.toml";
const ENV_PREFIX: &str = "LIFELINE_";

/// Process configuration with defaults, file, and environment overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed `LIFELINE_` (highest priority)
/// 2. Configuration file (`lifeline.toml`, or the path given with `--config`)
/// 3. Built-in defaults (lowest priority)
///
/// Webhook URLs, categories, intervals and watermarks are user settings and
/// live in the settings database, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Storage
    /// SQLite connection URL of the settings database.
    ///
    /// Environment variable: `LIFELINE_DATABASE_URL`
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Maximum number of database connections in the pool.
    ///
    /// Environment variable: `LIFELINE_DATABASE_MAX_CONNECTIONS`
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    // Sources
    /// JSON export of health records.
    ///
    /// Environment variable: `LIFELINE_HEALTH_RECORDS_PATH`
    #[serde(default = "default_health_records_path")]
    pub health_records_path: PathBuf,
    /// JSON export of usage events.
    ///
    /// Environment variable: `LIFELINE_USAGE_EVENTS_PATH`
    #[serde(default = "default_usage_events_path")]
    pub usage_events_path: PathBuf,

    // Payload
    /// Device description reported in usage payloads.
    ///
    /// Environment variable: `LIFELINE_DEVICE_NAME`
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Version reported as `app_version` in payloads.
    ///
    /// Environment variable: `LIFELINE_APP_VERSION`
    #[serde(default = "default_app_version")]
    pub app_version: String,

    // Delivery
    /// Connect and read timeout per webhook request, in seconds.
    ///
    /// Environment variable: `LIFELINE_DELIVERY_TIMEOUT_SECONDS`
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_seconds: u64,
    /// Attempts per webhook target, including the first.
    ///
    /// Environment variable: `LIFELINE_MAX_DELIVERY_ATTEMPTS`
    #[serde(default = "default_delivery_attempts")]
    pub max_delivery_attempts: u32,
    /// Delay after the first failed attempt in milliseconds; doubles after
    /// each further failure.
    ///
    /// Environment variable: `LIFELINE_RETRY_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    // Daemon
    /// Whether `lifeline run` starts the periodic sync loops.
    ///
    /// Environment variable: `LIFELINE_SCHEDULER_ENABLED`
    #[serde(default = "default_scheduler_enabled")]
    pub scheduler_enabled: bool,
    /// Time in-flight syncs get to finish after a shutdown signal.
    ///
    /// Environment variable: `LIFELINE_SHUTDOWN_GRACE_SECONDS`
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,

    // Logging
    /// Log filter used when `RUST_LOG` is not set.
    ///
    /// Environment variable: `LIFELINE_RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

impl Config {
    /// Loads configuration from defaults, the config file, and environment
    /// overrides, then validates it.
    ///
    /// A missing config file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path.unwrap_or_else(|| Path::new(CONFIG_FILE));
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Converts to the delivery client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_secs(self.delivery_timeout_seconds),
            read_timeout: Duration::from_secs(self.delivery_timeout_seconds),
            user_agent: format!("lifeline/{}", self.app_version),
            ..ClientConfig::default()
        }
    }

    /// Converts to the per-target retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_delivery_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            ..RetryPolicy::default()
        }
    }

    /// Metadata stamped on every payload.
    pub fn to_payload_meta(&self) -> PayloadMeta {
        PayloadMeta { app_version: self.app_version.clone(), device: self.device_name.clone() }
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.database_max_connections == 0 {
            anyhow::bail!("database_max_connections must be greater than 0");
        }

        if self.max_delivery_attempts == 0 {
            anyhow::bail!("max_delivery_attempts must be greater than 0");
        }

        if self.delivery_timeout_seconds == 0 {
            anyhow::bail!("delivery_timeout_seconds must be greater than 0");
        }

        if self.device_name.trim().is_empty() {
            anyhow::bail!("device_name must not be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            database_max_connections: default_max_connections(),
            health_records_path: default_health_records_path(),
            usage_events_path: default_usage_events_path(),
            device_name: default_device_name(),
            app_version: default_app_version(),
            delivery_timeout_seconds: default_delivery_timeout(),
            max_delivery_attempts: default_delivery_attempts(),
            retry_base_delay_ms: default_base_delay_ms(),
            scheduler_enabled: default_scheduler_enabled(),
            shutdown_grace_seconds: default_shutdown_grace(),
            rust_log: default_log_level(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://lifeline.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_health_records_path() -> PathBuf {
    PathBuf::from("health_records.json")
}

fn default_usage_events_path() -> PathBuf {
    PathBuf::from("usage_events.json")
}

fn default_device_name() -> String {
    "lifeline".to_string()
}

fn default_app_version() -> String {
    "1.0".to_string()
}

fn default_delivery_timeout() -> u64 {
    lifeline_delivery::DEFAULT_TIMEOUT_SECONDS
}

fn default_delivery_attempts() -> u32 {
    lifeline_delivery::DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    lifeline_delivery::DEFAULT_BASE_DELAY_MS
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_shutdown_grace() -> u64 {
    30
}

fn default_log_level() -> String {
    "info,lifeline=debug".to_string()
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env, io::Write, sync::Mutex};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct TestEnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        originals: HashMap<String, Option<String>>,
    }

    impl TestEnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _lock: lock, originals: HashMap::new() }
        }

        fn set_var(&mut self, key: &str, value: &str) {
            self.originals.entry(key.to_string()).or_insert_with(|| env::var(key).ok());
            env::set_var(key, value);
        }
    }

    impl Drop for TestEnvGuard {
        fn drop(&mut self) {
            for (var, original) in &self.originals {
                match original {
                    Some(value) => env::set_var(var, value),
                    None => env::remove_var(var),
                }
            }
        }
    }

    fn missing_file() -> PathBuf {
        PathBuf::from("does-not-exist/lifeline.toml")
    }

    #[test]
    fn default_config_snapshot() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        insta::assert_json_snapshot!(config, @r#"
        {
          "database_url": "sqlite://lifeline.db?mode=rwc",
          "database_max_connections": 4,
          "health_records_path": "health_records.json",
          "usage_events_path": "usage_events.json",
          "device_name": "lifeline",
          "app_version": "1.0",
          "delivery_timeout_seconds": 10,
          "max_delivery_attempts": 3,
          "retry_base_delay_ms": 1000,
          "scheduler_enabled": true,
          "shutdown_grace_seconds": 30,
          "rust_log": "info,lifeline=debug"
        }
        "#);
    }

    #[test]
    fn env_overrides_file_and_defaults() {
        let mut guard = TestEnvGuard::new();
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "device_name = \"Pixel 8\"\nmax_delivery_attempts = 5").expect("write config");
        guard.set_var("LIFELINE_MAX_DELIVERY_ATTEMPTS", "7");
        guard.set_var("LIFELINE_SCHEDULER_ENABLED", "false");

        let config = Config::load(Some(file.path())).expect("config loads");

        assert_eq!(config.device_name, "Pixel 8");
        assert_eq!(config.max_delivery_attempts, 7);
        assert!(!config.scheduler_enabled);
        assert_eq!(config.app_version, "1.0");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let _guard = TestEnvGuard::new();
        let config = Config::load(Some(&missing_file())).expect("config loads");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn conversions_feed_delivery_types() {
        let config = Config {
            delivery_timeout_seconds: 5,
            max_delivery_attempts: 4,
            retry_base_delay_ms: 250,
            app_version: "2.1".into(),
            ..Config::default()
        };

        let client = config.to_client_config();
        assert_eq!(client.connect_timeout, Duration::from_secs(5));
        assert_eq!(client.read_timeout, Duration::from_secs(5));
        assert_eq!(client.user_agent, "lifeline/2.1");

        let policy = config.to_retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.jitter_factor, 0.0);

        assert_eq!(config.to_payload_meta().app_version, "2.1");
    }

    #[test]
    fn invalid_config_validation_fails() {
        let mut config = Config::default();
        config.database_max_connections = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.max_delivery_attempts = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.delivery_timeout_seconds = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.device_name = "  ".into();
        assert!(config.validate().is_err());
    }
}
