//! Master configuration: network/addressing/timing/retry/logging settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a DNP3 master session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Dnp3Config {
    pub host: String,
    pub port: u16,

    pub master_address: u16,
    pub outstation_address: u16,

    #[serde(with = "humantime_serde")]
    pub response_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub select_timeout: Duration,

    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    pub confirm_required: bool,
    pub max_frame_size: usize,

    pub max_apdu_size: usize,
    pub enable_unsolicited: bool,

    #[serde(with = "humantime_serde")]
    pub class_0_poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub class_1_poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub class_2_poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub class_3_poll_interval: Duration,

    pub log_level: LogLevel,
    pub log_raw_frames: bool,
}

/// Tracing level selector, mirroring the teacher's `AgentConfig::LogLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error | LogLevel::Critical => tracing::Level::ERROR,
        }
    }
}

impl Default for Dnp3Config {
    fn default() -> Self {
        Dnp3Config {
            host: "127.0.0.1".to_string(),
            port: 20000,
            master_address: 1,
            outstation_address: 10,
            response_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(10),
            select_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            confirm_required: true,
            max_frame_size: 250,
            max_apdu_size: 2048,
            enable_unsolicited: true,
            class_0_poll_interval: Duration::from_secs(60),
            class_1_poll_interval: Duration::from_secs(5),
            class_2_poll_interval: Duration::from_secs(10),
            class_3_poll_interval: Duration::from_secs(30),
            log_level: LogLevel::Info,
            log_raw_frames: false,
        }
    }
}

/// Addresses 65520-65535 are reserved; 65535 is the broadcast address.
pub const MAX_VALID_ADDRESS: u16 = 65519;

#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("host must be a non-empty string")]
    EmptyHost,
    #[error("{field} must be 0-{MAX_VALID_ADDRESS} (addresses 65520-65535 are reserved), got {value}")]
    InvalidAddress { field: &'static str, value: u16 },
    #[error("{field} must be positive, got {value:?}")]
    NonPositiveDuration { field: &'static str, value: Duration },
    #[error("max_frame_size must be 1-250, got {0}")]
    InvalidMaxFrameSize(usize),
    #[error("max_apdu_size must be 1-65536, got {0}")]
    InvalidMaxApduSize(usize),
}

impl Dnp3Config {
    /// Validate range constraints that `serde`'s type system can't express.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.host.trim().is_empty() {
            return Err(ConfigValidationError::EmptyHost);
        }
        if self.master_address > MAX_VALID_ADDRESS {
            return Err(ConfigValidationError::InvalidAddress {
                field: "master_address",
                value: self.master_address,
            });
        }
        if self.outstation_address > MAX_VALID_ADDRESS {
            return Err(ConfigValidationError::InvalidAddress {
                field: "outstation_address",
                value: self.outstation_address,
            });
        }
        for (field, value) in [
            ("response_timeout", self.response_timeout),
            ("connection_timeout", self.connection_timeout),
            ("select_timeout", self.select_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigValidationError::NonPositiveDuration { field, value });
            }
        }
        if self.max_frame_size == 0 || self.max_frame_size > 250 {
            return Err(ConfigValidationError::InvalidMaxFrameSize(self.max_frame_size));
        }
        if self.max_apdu_size == 0 || self.max_apdu_size > 65536 {
            return Err(ConfigValidationError::InvalidMaxApduSize(self.max_apdu_size));
        }
        Ok(())
    }
}

/// Load configuration layered file -> environment (`DNP3_*`) -> defaults,
/// mirroring the teacher's `agent-core` `load_config` pattern.
pub fn load_config(path: Option<&std::path::Path>) -> Result<Dnp3Config, config::ConfigError> {
    let mut builder = config::Config::builder().add_source(config::Config::try_from(&Dnp3Config::default())?);

    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(config::Environment::with_prefix("DNP3").separator("__"));

    builder.build()?.try_deserialize()
}
