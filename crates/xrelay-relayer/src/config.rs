//! Relayer Configuration
//!
//! Loaded from an optional file, `config/default`, `config/local` and
//! `XRELAY__*` environment variables, in increasing priority.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Relayer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayerConfig {
    #[serde(default)]
    pub proof_service: ProofServiceConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub relay: RelaySettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Attestation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofServiceConfig {
    /// Remote service base URL; the in-process prover is used when absent
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Hex ed25519 verifying key of the remote prover
    #[serde(default)]
    pub trusted_key: Option<String>,
}

impl Default for ProofServiceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: default_request_timeout(),
            trusted_key: None,
        }
    }
}

impl ProofServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Proof job polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Wait before the first poll
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Polls before the attempt fails with a timeout
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PollingConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Concurrent relay attempts per direction
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// First block scanned when a monitor starts
    #[serde(default)]
    pub from_block: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            from_block: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_request_timeout() -> u64 {
    30
}

fn default_initial_delay() -> u64 {
    2_000
}

fn default_poll_interval() -> u64 {
    3_000
}

fn default_max_attempts() -> u32 {
    20
}

fn default_max_in_flight() -> usize {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl RelayerConfig {
    /// Load configuration from environment and optional config file
    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("XRELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let relayer_config: RelayerConfig = builder.build()?.try_deserialize()?;
        relayer_config.validate()?;
        Ok(relayer_config)
    }

    /// Reject settings the relayer cannot run with
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.polling.max_attempts == 0 {
            return Err(config::ConfigError::Message(
                "polling.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.relay.max_in_flight == 0 {
            return Err(config::ConfigError::Message(
                "relay.max_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Fast polling for demos and tests
    pub fn development() -> Self {
        Self {
            proof_service: ProofServiceConfig::default(),
            polling: PollingConfig {
                initial_delay_ms: 20,
                interval_ms: 20,
                max_attempts: 50,
            },
            relay: RelaySettings::default(),
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
