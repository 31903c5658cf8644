//! Mock adapters for integration tests.
//!
//! Every mock keeps its record behind an `Rc`, so a test can hand a clone
//! to the unit under test and keep another one to assert on afterwards.

use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, OutputPin};
use soilresp::app::events::AppEvent;
use soilresp::app::ports::{Clock, EventSink, FirmwareUpdater, SensorPort, SystemPort};
use soilresp::app::store::Sample;
use soilresp::error::SensorError;
use soilresp::ota::{OtaError, UpdateReport};

// ── Clock ─────────────────────────────────────────────────────

/// Clock that only moves when something sleeps on it.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

#[allow(dead_code)]
impl ManualClock {
    pub fn at(ms: u64) -> Self {
        Self(Rc::new(Cell::new(ms)))
    }

    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }

    fn sleep_ms(&self, ms: u64) {
        self.advance(ms);
    }
}

// ── Event log ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<AppEvent>>>);

#[allow(dead_code)]
impl EventLog {
    pub fn events(&self) -> Vec<AppEvent> {
        self.0.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.0.borrow().iter().filter(|e| pred(e)).count()
    }

    pub fn contains(&self, event: &AppEvent) -> bool {
        self.0.borrow().contains(event)
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: &AppEvent) {
        self.0.borrow_mut().push(event.clone());
    }
}

// ── Motor bench ───────────────────────────────────────────────

/// Which H-bridge input a [`BenchPin`] is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Open,
    Close,
}

#[derive(Debug, Default)]
struct BenchState {
    open: bool,
    close: bool,
    overlapped: bool,
    edges: Vec<(Line, bool)>,
}

/// Records both bridge inputs and flags any instant where both were high.
#[derive(Debug, Clone, Default)]
pub struct MotorBench(Rc<RefCell<BenchState>>);

#[allow(dead_code)]
impl MotorBench {
    pub fn pins(&self) -> (BenchPin, BenchPin) {
        (
            BenchPin {
                line: Line::Open,
                bench: self.clone(),
            },
            BenchPin {
                line: Line::Close,
                bench: self.clone(),
            },
        )
    }

    pub fn levels(&self) -> (bool, bool) {
        let s = self.0.borrow();
        (s.open, s.close)
    }

    pub fn overlapped(&self) -> bool {
        self.0.borrow().overlapped
    }

    /// Rising edges on `line`.
    pub fn strokes(&self, line: Line) -> usize {
        let s = self.0.borrow();
        let mut level = false;
        let mut strokes = 0;
        for &(_, high) in s.edges.iter().filter(|(l, _)| *l == line) {
            if high && !level {
                strokes += 1;
            }
            level = high;
        }
        strokes
    }
}

pub struct BenchPin {
    line: Line,
    bench: MotorBench,
}

impl BenchPin {
    fn set(&mut self, high: bool) {
        let mut s = self.bench.0.borrow_mut();
        match self.line {
            Line::Open => s.open = high,
            Line::Close => s.close = high,
        }
        if s.open && s.close {
            s.overlapped = true;
        }
        s.edges.push((self.line, high));
    }
}

impl ErrorType for BenchPin {
    type Error = Infallible;
}

impl OutputPin for BenchPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.set(true);
        Ok(())
    }
}

// ── Sensor ────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SensorState {
    readings: VecDeque<Result<Sample, SensorError>>,
    intervals: Vec<u16>,
    reads: u32,
}

/// Sensor that reports ready while it has queued readings.
#[derive(Debug, Clone, Default)]
pub struct MockSensor(Rc<RefCell<SensorState>>);

#[allow(dead_code)]
impl MockSensor {
    pub fn queue(&self, reading: Result<Sample, SensorError>) {
        self.0.borrow_mut().readings.push_back(reading);
    }

    pub fn intervals(&self) -> Vec<u16> {
        self.0.borrow().intervals.clone()
    }

    pub fn reads(&self) -> u32 {
        self.0.borrow().reads
    }
}

impl SensorPort for MockSensor {
    fn configure_interval(&mut self, secs: u16) -> Result<(), SensorError> {
        self.0.borrow_mut().intervals.push(secs);
        Ok(())
    }

    fn poll_ready(&mut self) -> bool {
        !self.0.borrow().readings.is_empty()
    }

    fn read_sample(&mut self) -> Result<Sample, SensorError> {
        let mut s = self.0.borrow_mut();
        s.reads += 1;
        s.readings.pop_front().unwrap_or(Err(SensorError::BusFailed))
    }
}

pub fn sample(co2_ppm: f32) -> Sample {
    Sample {
        co2_ppm,
        temperature_c: 21.5,
        humidity_pct: 48.0,
    }
}

// ── Firmware updater ──────────────────────────────────────────

/// Replays scripted update results; fails with `Transport` once empty.
#[derive(Debug, Default)]
pub struct ScriptedUpdater {
    pub results: VecDeque<Result<UpdateReport, OtaError>>,
    pub hosts: Vec<String>,
}

#[allow(dead_code)]
impl ScriptedUpdater {
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn succeeding(bytes_written: u32) -> Self {
        Self {
            results: VecDeque::from([Ok(UpdateReport { bytes_written })]),
            hosts: Vec::new(),
        }
    }
}

impl FirmwareUpdater for ScriptedUpdater {
    fn update(&mut self, host: &str) -> Result<UpdateReport, OtaError> {
        self.hosts.push(host.into());
        self.results.pop_front().unwrap_or(Err(OtaError::Transport))
    }
}

// ── System ────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CountingSystem {
    pub restarts: u32,
}

impl SystemPort for CountingSystem {
    fn restart(&mut self) {
        self.restarts += 1;
    }
}

// ── Firmware images ───────────────────────────────────────

/// Deterministic image bytes.
pub fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
