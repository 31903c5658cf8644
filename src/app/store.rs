//! Shared state store between the three units of execution.
//!
//! ```text
//!   DutyCycleController ──CycleWriter──▶ cycle snapshot ──▶ Sampler, Channel
//!   Sampler ──put_sample──▶ sample slot ──take_sample──▶ Channel
//!   Channel ──set_period / request_update──▶ period, update slot
//!   Link adapter ──set_link_up──▶ link flag ──▶ everyone
//! ```
//!
//! Every field sits behind its own critical-section mutex or atomic.
//! Locks are never nested, so there is no acquisition order to violate.
//! The cycle snapshot can only be written through the [`CycleWriter`]
//! handed out once by [`SharedStore::new`].

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::fsm::{MAX_SAMPLING_PERIOD_MS, StateId, dwell_target_ms};

/// Longest update source host accepted from a command.
pub const MAX_HOST_LEN: usize = 63;

pub type HostName = heapless::String<{ MAX_HOST_LEN + 1 }>;

// ───────────────────────────────────────────────────────────────
// Values
// ───────────────────────────────────────────────────────────────

/// One gas-sensor measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub co2_ppm: f32,
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

impl Sample {
    pub fn is_finite(&self) -> bool {
        self.co2_ppm.is_finite() && self.temperature_c.is_finite() && self.humidity_pct.is_finite()
    }

    /// Wire payload: the three values, comma-joined.
    pub fn payload(&self) -> String {
        format!(
            "{:.2},{:.2},{:.2}",
            self.co2_ppm, self.temperature_c, self.humidity_pct
        )
    }
}

/// Immutable copy of the duty-cycle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSnapshot {
    pub state: StateId,
    /// CycleTimer of `state`.
    pub entered_at_ms: u64,
    /// Sampling period in force for the current cycle.
    pub period_ms: u32,
}

impl CycleSnapshot {
    pub const BOOT: Self = Self {
        state: StateId::Calibrate,
        entered_at_ms: 0,
        period_ms: 0,
    };

    /// Dwell length for the current cycle.
    pub fn dwell_target_ms(&self) -> u64 {
        dwell_target_ms(self.period_ms)
    }
}

/// A pending firmware update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub host: HostName,
    /// Bumped on every new request so retry bookkeeping can tell a fresh
    /// command from a retry of the old one.
    pub generation: u32,
}

// ───────────────────────────────────────────────────────────────
// Store
// ───────────────────────────────────────────────────────────────

pub struct SharedStore {
    cycle: Mutex<CriticalSectionRawMutex, Cell<CycleSnapshot>>,
    period_ms: AtomicU32,
    link_up: AtomicBool,
    sample: Mutex<CriticalSectionRawMutex, Cell<Option<Sample>>>,
    update: Mutex<CriticalSectionRawMutex, RefCell<Option<UpdateRequest>>>,
    update_generation: AtomicU32,
}

impl SharedStore {
    /// Create the store and the single writer of the cycle snapshot.
    pub fn new(period_ms: u32) -> (Arc<Self>, CycleWriter) {
        let store = Arc::new(Self {
            cycle: Mutex::new(Cell::new(CycleSnapshot {
                period_ms: clamp_period(period_ms),
                ..CycleSnapshot::BOOT
            })),
            period_ms: AtomicU32::new(clamp_period(period_ms)),
            link_up: AtomicBool::new(false),
            sample: Mutex::new(Cell::new(None)),
            update: Mutex::new(RefCell::new(None)),
            update_generation: AtomicU32::new(0),
        });
        let writer = CycleWriter {
            store: Arc::clone(&store),
        };
        (store, writer)
    }

    // ── Cycle ─────────────────────────────────────────────────

    pub fn cycle(&self) -> CycleSnapshot {
        self.cycle.lock(Cell::get)
    }

    pub fn state(&self) -> StateId {
        self.cycle().state
    }

    // ── Sampling period ───────────────────────────────────────

    pub fn period_ms(&self) -> u32 {
        self.period_ms.load(Ordering::Acquire)
    }

    /// Store a new period, clamped to the valid bound. Returns the stored value.
    pub fn set_period_ms(&self, period_ms: u32) -> u32 {
        let clamped = clamp_period(period_ms);
        self.period_ms.store(clamped, Ordering::Release);
        clamped
    }

    // ── Link ──────────────────────────────────────────────────

    pub fn link_up(&self) -> bool {
        self.link_up.load(Ordering::Acquire)
    }

    /// Written only by the link-establishment adapter.
    pub fn set_link_up(&self, up: bool) {
        self.link_up.store(up, Ordering::Release);
    }

    // ── Sample ────────────────────────────────────────────────

    /// Replace the ready sample.
    pub fn put_sample(&self, sample: Sample) {
        self.sample.lock(|s| s.set(Some(sample)));
    }

    /// Take the ready sample and clear the ready flag in one step.
    pub fn take_sample(&self) -> Option<Sample> {
        self.sample.lock(Cell::take)
    }

    pub fn sample_ready(&self) -> bool {
        self.sample.lock(|s| s.get().is_some())
    }

    // ── Update request ────────────────────────────────────────

    /// Record a request to update from `host`. Returns its generation.
    pub fn request_update(&self, host: HostName) -> u32 {
        let generation = self.update_generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.update
            .lock(|u| *u.borrow_mut() = Some(UpdateRequest { host, generation }));
        generation
    }

    pub fn pending_update(&self) -> Option<UpdateRequest> {
        self.update.lock(|u| u.borrow().clone())
    }

    /// Clear the request if it is still the one identified by `generation`.
    pub fn clear_update(&self, generation: u32) {
        self.update.lock(|u| {
            let mut slot = u.borrow_mut();
            if slot.as_ref().is_some_and(|r| r.generation == generation) {
                *slot = None;
            }
        });
    }
}

/// Sole write access to the cycle snapshot. Owned by the duty-cycle
/// controller; not `Clone`.
pub struct CycleWriter {
    store: Arc<SharedStore>,
}

impl CycleWriter {
    pub fn publish(&self, snapshot: CycleSnapshot) {
        self.store.cycle.lock(|c| c.set(snapshot));
    }
}

fn clamp_period(period_ms: u32) -> u32 {
    period_ms.min(MAX_SAMPLING_PERIOD_MS)
}
