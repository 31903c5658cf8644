//! Outbound application events.
//!
//! The three units emit these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them; in the firmware they become one-line
//! log records.

use super::ports::BrokerError;
use super::store::{HostName, Sample};
use crate::error::{ActuatorError, SensorError};
use crate::fsm::StateId;
use crate::ota::{ConfirmOutcome, OtaError};
use crate::telemetry::command::CommandError;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    // ── Duty cycle ──
    /// The controller is waiting for the link before doing anything.
    WaitingForLink,
    /// Boot strokes finished; the lid is closing.
    Calibrated,
    StateChanged { from: StateId, to: StateId, at_ms: u64 },
    /// Periodic report while dwelling.
    DwellRemaining { remaining_ms: u64 },
    /// The lid motor rejected a command; retried next tick.
    ActuatorFault(ActuatorError),
    /// Link went down after calibration; the cycle is suspended.
    LinkLost,

    // ── Sampler ──
    SampleStored(Sample),
    SampleRejected(SensorError),
    SensorConfigFailed(SensorError),

    // ── Broker ──
    BrokerConnectAttempt { attempt: u8, max: u8 },
    BrokerConnected { attempts: u8 },
    /// A whole connection round failed; the channel is disconnected.
    BrokerUnreachable { attempts: u8 },
    BrokerLost(BrokerError),
    SamplePublished(Sample),
    /// The sample was dropped.
    PublishFailed(BrokerError),

    // ── Commands ──
    PeriodChanged { period_ms: u32 },
    CommandRejected(CommandError),
    UpdateRequested { host: HostName },

    // ── Firmware update ──
    UpdateStarted { attempt: u8 },
    UpdateSucceeded { bytes: u32 },
    UpdateFailed { attempt: u8, error: OtaError },
    /// Retry ceiling reached; the request was dropped.
    UpdateAbandoned { attempts: u8 },
    ImageConfirm(ConfirmOutcome),
    ImageConfirmFailed(OtaError),

    // ── Diagnostics ──
    DiagnosticChannel { enabled: bool, version: String },
}
