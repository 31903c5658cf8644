//! Function-pointer finite state machine engine for the chamber duty cycle.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  StateTable                                                │
//! │  ┌────────────┬───────────┬──────────┬───────────────────┐ │
//! │  │ StateId    │ on_enter  │ on_exit  │ on_update         │ │
//! │  ├────────────┼───────────┼──────────┼───────────────────┤ │
//! │  │ Calibrate  │ fn(ctx)   │    -     │ fn(ctx)->Option<> │ │
//! │  │ SealBegin  │ fn(ctx)   │    -     │ fn(ctx)->Option<> │ │
//! │  │ Sampling   │ fn(ctx)   │    -     │ fn(ctx)->Option<> │ │
//! │  │ SealEnd    │ fn(ctx)   │    -     │ fn(ctx)->Option<> │ │
//! │  │ Dwell      │ fn(ctx)   │    -     │ fn(ctx)->Option<> │ │
//! │  └────────────┴───────────┴──────────┴───────────────────┘ │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! `on_update` handlers only read the [`CycleContext`] and decide; the
//! `on_enter` handlers only write the actuator command and latch the
//! sampling period. Clocks, GPIO and the shared store stay outside, in
//! [`DutyCycleController`](crate::app::duty_cycle::DutyCycleController).
//!
//! The engine keeps the CycleTimer (`entered_at_ms`). On a transition the
//! next state is seeded at the previous state's deadline when the tick
//! arrived within [`MAX_LATENESS_MS`] of it, so poll jitter never
//! accumulates and a cycle lasts exactly [`HOUR_TARGET_MS`].

pub mod context;
pub mod states;

use context::CycleContext;
use log::info;

// ---------------------------------------------------------------------------
// Timing constants
// ---------------------------------------------------------------------------

/// Time the lid motor is driven to seal or unseal the chamber.
pub const SEAL_DURATION_MS: u64 = 6_000;

/// Length of one full SealBegin → Sampling → SealEnd → Dwell cycle.
pub const HOUR_TARGET_MS: u64 = 3_600_000;

/// Full-travel stroke used by the boot calibration. Independent
/// from [`SEAL_DURATION_MS`]; the boot stroke overdrives to the end stops.
pub const CALIBRATION_TRAVEL_MS: u64 = 6_200;

/// Pause between the close and open calibration strokes.
pub const CALIBRATION_SETTLE_MS: u64 = 1_000;

/// Largest sampling period that still leaves room for both seal phases.
pub const MAX_SAMPLING_PERIOD_MS: u32 = (HOUR_TARGET_MS - 2 * SEAL_DURATION_MS) as u32;

/// A transition observed later than this after its deadline re-seeds the
/// CycleTimer at the observation instant instead of the deadline.
pub const MAX_LATENESS_MS: u64 = 2_000;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Operating state of the chamber.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Calibrate = 0,
    SealBegin = 1,
    Sampling = 2,
    SealEnd = 3,
    Dwell = 4,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 5;

    /// Convert a table index back to `StateId`.  Panics on out-of-range in
    /// debug builds; returns `Dwell` (no actuator output) in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Calibrate,
            1 => Self::SealBegin,
            2 => Self::Sampling,
            3 => Self::SealEnd,
            4 => Self::Dwell,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Dwell
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Actuator command
// ---------------------------------------------------------------------------

/// What the lid motor should be doing. A single value per instant, so the
/// "open" and "close" outputs can never be requested together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActuatorCommand {
    /// Both outputs de-asserted.
    #[default]
    Stop,
    /// Drive the "close" output only.
    Close,
    /// Drive the "open" output only.
    Open,
}

// ---------------------------------------------------------------------------
// Timing law
// ---------------------------------------------------------------------------

/// Dwell length that pins the whole cycle to [`HOUR_TARGET_MS`].
pub fn dwell_target_ms(period_ms: u32) -> u64 {
    HOUR_TARGET_MS.saturating_sub(u64::from(period_ms) + 2 * SEAL_DURATION_MS)
}

/// How long `state` lasts for a given sampling period.
pub fn target_ms(state: StateId, period_ms: u32) -> u64 {
    match state {
        StateId::Calibrate => 0,
        StateId::SealBegin | StateId::SealEnd => SEAL_DURATION_MS,
        StateId::Sampling => u64::from(period_ms),
        StateId::Dwell => dwell_target_ms(period_ms),
    }
}

/// CycleTimer value for the state entered after `deadline_ms` was reached
/// at `now_ms`.
pub fn next_entry_ms(deadline_ms: u64, now_ms: u64) -> u64 {
    if now_ms >= deadline_ms && now_ms - deadline_ms <= MAX_LATENESS_MS {
        deadline_ms
    } else {
        now_ms
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each state transition.
pub type StateActionFn = fn(&mut CycleContext);

/// Signature for the per-tick decision.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&CycleContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single state.
/// Stored in a fixed-size array, no heap, no `dyn`.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

/// Record of one executed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: StateId,
    pub to: StateId,
    /// CycleTimer value of the new state.
    pub entered_at_ms: u64,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    /// Index of the currently active state.
    current: usize,
    /// CycleTimer: when the current state was entered.
    entered_at_ms: u64,
    /// Completed SealBegin entries.
    cycles: u64,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            entered_at_ms: 0,
            cycles: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state and seed the timer.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut CycleContext, now_ms: u64) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        self.entered_at_ms = now_ms;
        ctx.elapsed_ms = 0;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Re-seed the CycleTimer without changing state.
    pub fn reseed(&mut self, now_ms: u64) {
        self.entered_at_ms = now_ms;
    }

    /// Advance the FSM against the clock reading `now_ms`.
    ///
    /// 1. Refresh `ctx.elapsed_ms` from the CycleTimer.
    /// 2. Call `on_update` for the current state.
    /// 3. If it returns `Some(next)`, execute the transition:
    ///    `on_exit(current)` → update pointer and timer → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut CycleContext, now_ms: u64) -> Option<Transition> {
        ctx.elapsed_ms = now_ms.saturating_sub(self.entered_at_ms);

        let next = (self.table[self.current].on_update)(ctx)?;

        let from = self.current_state();
        let deadline = self.entered_at_ms + target_ms(from, ctx.active_period_ms);
        let entered_at_ms = next_entry_ms(deadline, now_ms);
        self.transition(next, ctx, entered_at_ms);

        Some(Transition {
            from,
            to: next,
            entered_at_ms,
        })
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    /// CycleTimer of the current state.
    pub fn entered_at_ms(&self) -> u64 {
        self.entered_at_ms
    }

    /// Number of times SealBegin has been entered since boot.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut CycleContext, entered_at_ms: u64) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.entered_at_ms = entered_at_ms;
        ctx.elapsed_ms = 0;
        if next_id == StateId::SealBegin {
            self.cycles += 1;
        }

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
