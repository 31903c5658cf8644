//! Unified error types for the chamber firmware.
//!
//! Every subsystem has its own small `Copy` error enum so ports can return
//! precise failures; [`Error`] is the funnel library start-up paths such as
//! [`ChamberConfig::load`](crate::config::ChamberConfig::load) convert into
//! with `?`.

use core::fmt;

use crate::app::ports::BrokerError;
use crate::config::ConfigError;
use crate::ota::OtaError;
use crate::telemetry::command::CommandError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The gas sensor could not be configured or read.
    Sensor(SensorError),
    /// A lid motor output could not be driven.
    Actuator(ActuatorError),
    /// Broker connection, subscription or publish failed.
    Broker(BrokerError),
    /// An inbound command could not be decoded.
    Command(CommandError),
    /// A firmware update step failed.
    Update(OtaError),
    /// Configuration is invalid or could not be parsed.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Broker(e) => write!(f, "broker: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
            Self::Update(e) => write!(f, "update: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Requested measurement interval is outside [2, 1800] s.
    IntervalOutOfRange,
    /// The bus transaction failed or timed out.
    BusFailed,
    /// A received word failed its CRC check.
    Checksum,
    /// The reading contained NaN or infinity.
    NotFinite,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntervalOutOfRange => write!(f, "interval out of range (2-1800 s)"),
            Self::BusFailed => write!(f, "bus transaction failed"),
            Self::Checksum => write!(f, "CRC mismatch"),
            Self::NotFinite => write!(f, "reading not finite"),
        }
    }
}

impl std::error::Error for SensorError {}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// GPIO set failed.
    GpioWriteFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
        }
    }
}

impl std::error::Error for ActuatorError {}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Conversions from subsystem errors defined next to their ports
// ---------------------------------------------------------------------------

impl From<BrokerError> for Error {
    fn from(e: BrokerError) -> Self {
        Self::Broker(e)
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

impl From<OtaError> for Error {
    fn from(e: OtaError) -> Self {
        Self::Update(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
