//! Port traits, the hexagonal boundary between the chamber logic and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DutyCycleController / Sampler / TelemetryChannel
//! ```
//!
//! Driven adapters (lid motor, gas sensor, broker, flash slot, clock)
//! implement these traits. The three units consume them via generics, so
//! the domain core never touches hardware directly and every unit can be
//! driven by mocks and a manual clock on the host.

use core::fmt;

use super::events::AppEvent;
use super::store::Sample;
use crate::error::{ActuatorError, SensorError};
use crate::fsm::ActuatorCommand;
use crate::ota::{OtaError, UpdateReport};

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic time plus a timed wait. Every suspension in the units goes
/// through here, so tests substitute a clock that advances instantly.
pub trait Clock {
    /// Milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Block the calling unit for `ms` milliseconds.
    fn sleep_ms(&self, ms: u64);
}

// ───────────────────────────────────────────────────────────────
// Actuator port (domain → lid motor)
// ───────────────────────────────────────────────────────────────

/// Two-output lid motor. Implementations must never leave both outputs
/// asserted, not even transiently.
pub trait ActuatorPort {
    fn apply(&mut self, command: ActuatorCommand) -> Result<(), ActuatorError>;

    /// Command currently driven on the outputs.
    fn current(&self) -> ActuatorCommand;
}

// ───────────────────────────────────────────────────────────────
// Sensor port (gas sensor → domain)
// ───────────────────────────────────────────────────────────────

pub trait SensorPort {
    /// Set the sensor's internal measurement interval (2..=1800 s).
    fn configure_interval(&mut self, secs: u16) -> Result<(), SensorError>;

    /// True when a new measurement can be read.
    fn poll_ready(&mut self) -> bool;

    /// Read the CO2 / temperature / humidity triple.
    fn read_sample(&mut self) -> Result<Sample, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Broker port (telemetry channel ↔ MQTT broker)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerError {
    /// No connection is established.
    NotConnected,
    /// Broker did not acknowledge the connection in time.
    ConnectTimeout,
    /// Host lookup or TCP connect failed.
    ConnectFailed,
    /// The established connection dropped.
    ConnectionLost,
    SubscribeFailed,
    PublishFailed,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::ConnectTimeout => write!(f, "no CONNACK before timeout"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::PublishFailed => write!(f, "publish failed"),
        }
    }
}

impl std::error::Error for BrokerError {}

/// One application message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Publish/subscribe session. Publishes and subscriptions use QoS 1
/// (at-least-once).
pub trait BrokerPort {
    /// One connection attempt, blocking up to the adapter's connect timeout.
    fn connect(&mut self) -> Result<(), BrokerError>;

    fn is_connected(&self) -> bool;

    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError>;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Wait up to `timeout_ms` for an inbound message. `Ok(None)` on timeout.
    fn poll(&mut self, timeout_ms: u64) -> Result<Option<InboundMessage>, BrokerError>;

    /// Milliseconds until the next keep-alive is due (0 = due now).
    fn keepalive_remaining_ms(&self) -> u64;

    /// Service the keep-alive.
    fn live(&mut self) -> Result<(), BrokerError>;

    fn disconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Firmware image ports
// ───────────────────────────────────────────────────────────────

/// Status line and framing of an image download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub content_length: Option<u32>,
}

/// Where a new image is streamed from.
pub trait ImageSource {
    /// Issue the GET and return the response head. The body is then read
    /// with [`read`](Self::read).
    fn open(&mut self, host: &str, port: u16, path: &str) -> Result<ResponseHead, OtaError>;

    /// Read the next body bytes. `Ok(0)` marks the end of the body.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, OtaError>;

    /// Drop the connection. Safe to call when nothing is open.
    fn close(&mut self);
}

/// Secondary image slot. Nothing may be written before [`begin`](Self::begin).
pub trait SlotPort {
    /// Bytes the secondary slot can hold.
    fn capacity(&self) -> u32;

    /// Open (and erase) the secondary slot for writing.
    fn begin(&mut self) -> Result<(), OtaError>;

    fn write(&mut self, data: &[u8]) -> Result<(), OtaError>;

    /// Flush buffered bytes and close the written region.
    fn finish(&mut self) -> Result<(), OtaError>;

    /// Abandon a partially written image.
    fn abort(&mut self);
}

/// Boot manager requests.
pub trait BootPort {
    /// Boot the finished secondary image once; the bootloader reverts
    /// unless that image confirms itself.
    fn mark_test_boot(&mut self) -> Result<(), OtaError>;

    fn is_running_confirmed(&self) -> Result<bool, OtaError>;

    /// Make the running image permanent.
    fn confirm_running(&mut self) -> Result<(), OtaError>;

    /// Erase the slot that is not running.
    fn erase_secondary(&mut self) -> Result<(), OtaError>;
}

/// Runs one complete update against `host`. Implemented by
/// [`FirmwareUpdateManager`](crate::ota::FirmwareUpdateManager).
pub trait FirmwareUpdater {
    fn update(&mut self, host: &str) -> Result<UpdateReport, OtaError>;
}

// ───────────────────────────────────────────────────────────────
// System port
// ───────────────────────────────────────────────────────────────

pub trait SystemPort {
    /// Full process restart. On target this does not return.
    fn restart(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging)
// ───────────────────────────────────────────────────────────────

/// The units emit structured [`AppEvent`]s through this port.  Adapters
/// decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}
