//! Sensor sampler, gated by the duty-cycle state.
//!
//! While the chamber is in Sampling the sampler polls the sensor's
//! data-ready flag and stores every finite reading in the shared store.
//! In every other state it only sleeps, leaving the bus idle.

use std::sync::Arc;

use super::events::AppEvent;
use super::ports::{Clock, EventSink, SensorPort};
use super::store::{Sample, SharedStore};
use crate::config::{ChamberConfig, SENSOR_INTERVAL_MAX_SECS, SENSOR_INTERVAL_MIN_SECS};
use crate::error::SensorError;
use crate::fsm::StateId;

/// Result of one sampler step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerStep {
    /// Not in Sampling; no bus activity.
    Idle,
    /// In Sampling, no new measurement yet.
    NotReady,
    Stored(Sample),
    Rejected(SensorError),
}

pub struct Sampler<S: SensorPort, C: Clock, E: EventSink> {
    sensor: S,
    clock: C,
    sink: E,
    store: Arc<SharedStore>,
    poll_interval_ms: u64,
    idle_interval_ms: u64,
}

impl<S: SensorPort, C: Clock, E: EventSink> Sampler<S, C, E> {
    pub fn new(sensor: S, clock: C, sink: E, store: Arc<SharedStore>, config: &ChamberConfig) -> Self {
        Self {
            sensor,
            clock,
            sink,
            store,
            poll_interval_ms: u64::from(config.sample_poll_interval_ms),
            idle_interval_ms: u64::from(config.sampler_idle_interval_ms),
        }
    }

    /// Set the sensor's measurement interval. Out-of-range values are
    /// rejected before the sensor is touched.
    pub fn configure(&mut self, interval_secs: u16) -> Result<(), SensorError> {
        if !(SENSOR_INTERVAL_MIN_SECS..=SENSOR_INTERVAL_MAX_SECS).contains(&interval_secs) {
            return Err(SensorError::IntervalOutOfRange);
        }
        self.sensor.configure_interval(interval_secs)
    }

    /// One poll against the current cycle snapshot.
    pub fn step(&mut self) -> SamplerStep {
        if self.store.state() != StateId::Sampling {
            return SamplerStep::Idle;
        }
        if !self.sensor.poll_ready() {
            return SamplerStep::NotReady;
        }

        let result = self.sensor.read_sample().and_then(|sample| {
            if sample.is_finite() {
                Ok(sample)
            } else {
                Err(SensorError::NotFinite)
            }
        });

        match result {
            Ok(sample) => {
                self.store.put_sample(sample);
                self.sink.emit(&AppEvent::SampleStored(sample));
                SamplerStep::Stored(sample)
            }
            Err(e) => {
                self.sink.emit(&AppEvent::SampleRejected(e));
                SamplerStep::Rejected(e)
            }
        }
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    /// Configure once, then poll forever.
    pub fn run(mut self, interval_secs: u16) -> ! {
        if let Err(e) = self.configure(interval_secs) {
            self.sink.emit(&AppEvent::SensorConfigFailed(e));
        }
        loop {
            let wait = match self.step() {
                SamplerStep::Idle => self.idle_interval_ms,
                _ => self.poll_interval_ms,
            };
            self.clock.sleep_ms(wait);
        }
    }
}
