//! System configuration parameters
//!
//! All tunable parameters for the chamber controller. The firmware bakes a
//! provisioning document in at build time (`SOILRESP_CONFIG_JSON`); anything
//! it leaves out falls back to [`ChamberConfig::default`].

use core::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fsm::MAX_SAMPLING_PERIOD_MS;

/// Bounds accepted by the gas sensor's internal measurement interval.
pub const SENSOR_INTERVAL_MIN_SECS: u16 = 2;
pub const SENSOR_INTERVAL_MAX_SECS: u16 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The provisioning document is not valid JSON for this schema.
    Malformed,
    /// A value is outside its accepted range.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed configuration document"),
            Self::ValidationFailed(field) => write!(f, "invalid value for {field}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChamberConfig {
    // --- Network ---
    /// Station SSID used by the link adapter
    pub wifi_ssid: String,
    /// Station passphrase (empty for an open network)
    pub wifi_password: String,

    // --- Broker ---
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// MQTT keep-alive interval (seconds)
    pub keep_alive_secs: u16,
    /// Topic samples are published on
    pub sample_topic: String,
    /// Topic carrying sampling-period overrides
    pub period_topic: String,
    /// Firmware-trigger topics (both treated identically)
    pub update_topics: [String; 2],

    // --- Broker retry policy ---
    /// Connect attempts per connection round
    pub connect_attempts: u8,
    /// Pause between attempts inside one round (milliseconds)
    pub connect_retry_interval_ms: u32,
    /// Per-attempt CONNACK wait (milliseconds)
    pub connect_timeout_ms: u32,
    /// Pause before a new round after exhaustion or loss (milliseconds)
    pub reconnect_interval_ms: u32,
    /// Inbound poll timeout outside Dwell (milliseconds)
    pub command_poll_timeout_ms: u32,

    // --- Duty cycle ---
    /// Sampling period applied at boot (milliseconds)
    pub sampling_period_ms: u32,

    // --- Sensor ---
    /// Sensor internal measurement interval (seconds)
    pub sensor_interval_secs: u16,
    /// Data-ready poll cadence while Sampling (milliseconds)
    pub sample_poll_interval_ms: u32,
    /// Sleep between state checks outside Sampling (milliseconds)
    pub sampler_idle_interval_ms: u32,

    // --- Firmware update ---
    pub update_port: u16,
    pub update_path: String,
    /// Failed attempts tolerated per update request
    pub update_max_attempts: u8,
    /// Pause between failed attempts (milliseconds)
    pub update_backoff_ms: u32,

    /// Version string reported by the diagnostic status hook
    pub firmware_version: String,
}

impl Default for ChamberConfig {
    fn default() -> Self {
        Self {
            // Network
            wifi_ssid: String::new(),
            wifi_password: String::new(),

            // Broker
            broker_host: "mqtt.tago.io".into(),
            broker_port: 1883,
            client_id: "soil-chamber".into(),
            username: Some("Token".into()),
            password: None,
            keep_alive_secs: 60,
            sample_topic: "sensor/data".into(),
            period_topic: "period/".into(),
            update_topics: ["fota/".into(), "fota/d/".into()],

            // Broker retry policy
            connect_attempts: 10,
            connect_retry_interval_ms: 500,
            connect_timeout_ms: 2_000,
            reconnect_interval_ms: 30_000,
            command_poll_timeout_ms: 1_000,

            // Duty cycle
            sampling_period_ms: 900_000, // 15 min

            // Sensor
            sensor_interval_secs: 10,
            sample_poll_interval_ms: 100,
            sampler_idle_interval_ms: 5_000,

            // Firmware update
            update_port: 80,
            update_path: "/soilresp.signed.bin".into(),
            update_max_attempts: 5,
            update_backoff_ms: 30_000,

            firmware_version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

impl ChamberConfig {
    /// Parse a provisioning document. Missing fields take their defaults;
    /// the result is validated before it is returned.
    pub fn from_json(doc: &str) -> core::result::Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(doc).map_err(|_| ConfigError::Malformed)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration to boot with: the baked-in provisioning document when
    /// there is one, the defaults otherwise.
    pub fn load(baked: Option<&str>) -> Result<Self> {
        let config = match baked {
            Some(doc) => Self::from_json(doc)?,
            None => {
                warn!("no provisioning document baked in, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values instead of clamping them.
    pub fn validate(&self) -> core::result::Result<(), ConfigError> {
        if self.broker_host.is_empty() {
            return Err(ConfigError::ValidationFailed("broker_host"));
        }
        if self.sample_topic.is_empty() || self.period_topic.is_empty() {
            return Err(ConfigError::ValidationFailed("topics"));
        }
        if self.update_topics.iter().any(String::is_empty) {
            return Err(ConfigError::ValidationFailed("update_topics"));
        }
        if self.connect_attempts == 0 {
            return Err(ConfigError::ValidationFailed("connect_attempts"));
        }
        if self.keep_alive_secs == 0 {
            return Err(ConfigError::ValidationFailed("keep_alive_secs"));
        }
        if self.sampling_period_ms > MAX_SAMPLING_PERIOD_MS {
            return Err(ConfigError::ValidationFailed("sampling_period_ms"));
        }
        if !(SENSOR_INTERVAL_MIN_SECS..=SENSOR_INTERVAL_MAX_SECS)
            .contains(&self.sensor_interval_secs)
        {
            return Err(ConfigError::ValidationFailed("sensor_interval_secs"));
        }
        if self.update_max_attempts == 0 {
            return Err(ConfigError::ValidationFailed("update_max_attempts"));
        }
        if !self.update_path.starts_with('/') {
            return Err(ConfigError::ValidationFailed("update_path"));
        }
        Ok(())
    }
}
