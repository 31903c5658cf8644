//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing one structured line per
//! [`AppEvent`] to the logger (UART / USB-CDC in production), in the form
//! `TAG | key=value ...`.

use log::{debug, error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::WaitingForLink => info!("CYCLE | waiting for link"),
            AppEvent::Calibrated => info!("CYCLE | calibration strokes done"),
            AppEvent::StateChanged { from, to, at_ms } => {
                info!("STATE | {:?} -> {:?} | at={}ms", from, to, at_ms);
            }
            AppEvent::DwellRemaining { remaining_ms } => {
                info!("CYCLE | dwell remaining={}s", remaining_ms / 1_000);
            }
            AppEvent::ActuatorFault(e) => warn!("MOTOR | fault: {}", e),
            AppEvent::LinkLost => warn!("CYCLE | link lost, cycle suspended"),

            AppEvent::SampleStored(s) => debug!(
                "SCD30 | co2={:.2}ppm T={:.2}\u{00b0}C rh={:.2}%",
                s.co2_ppm, s.temperature_c, s.humidity_pct
            ),
            AppEvent::SampleRejected(e) => warn!("SCD30 | sample rejected: {}", e),
            AppEvent::SensorConfigFailed(e) => error!("SCD30 | configuration failed: {}", e),

            AppEvent::BrokerConnectAttempt { attempt, max } => {
                info!("MQTT | connecting attempt={}/{}", attempt, max);
            }
            AppEvent::BrokerConnected { attempts } => {
                info!("MQTT | connected attempts={}", attempts);
            }
            AppEvent::BrokerUnreachable { attempts } => {
                error!("MQTT | broker unreachable after {} attempts", attempts);
            }
            AppEvent::BrokerLost(e) => warn!("MQTT | connection lost: {}", e),
            AppEvent::SamplePublished(s) => info!(
                "MQTT | published co2={:.2} T={:.2} rh={:.2}",
                s.co2_ppm, s.temperature_c, s.humidity_pct
            ),
            AppEvent::PublishFailed(e) => warn!("MQTT | sample dropped: {}", e),

            AppEvent::PeriodChanged { period_ms } => {
                info!("CMD | sampling period={}ms (next cycle)", period_ms);
            }
            AppEvent::CommandRejected(e) => warn!("CMD | rejected: {}", e),
            AppEvent::UpdateRequested { host } => info!("CMD | update requested host={}", host),

            AppEvent::UpdateStarted { attempt } => info!("FOTA | start attempt={}", attempt),
            AppEvent::UpdateSucceeded { bytes } => {
                info!("FOTA | image written bytes={}, restarting", bytes);
            }
            AppEvent::UpdateFailed { attempt, error } => {
                warn!("FOTA | attempt={} failed: {}", attempt, error);
            }
            AppEvent::UpdateAbandoned { attempts } => {
                error!("FOTA | giving up after {} attempts", attempts);
            }
            AppEvent::ImageConfirm(outcome) => info!("FOTA | running image {:?}", outcome),
            AppEvent::ImageConfirmFailed(e) => error!("FOTA | confirm failed: {}", e),

            AppEvent::DiagnosticChannel { enabled, version } => {
                info!("DIAG | enabled={} version={}", enabled, version);
            }
        }
    }
}
