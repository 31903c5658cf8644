//! Concrete state handler functions and table builder.
//!
//! ```text
//!  CALIBRATE ──[strokes done]──▶ SEAL_BEGIN ──[6 s]──▶ SAMPLING
//!  (once per boot)                   ▲                     │
//!                                    │                 [period]
//!                                 [dwell]                  ▼
//!                                  DWELL ◀──[6 s]─────── SEAL_END
//! ```
//!
//! | Entering   | Lid motor |
//! |------------|-----------|
//! | Calibrate  | stop      |
//! | SealBegin  | close     |
//! | Sampling   | stop      |
//! | SealEnd    | open      |
//! | Dwell      | stop      |

use super::context::CycleContext;
use super::{ActuatorCommand, StateDescriptor, StateId, target_ms};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Calibrate
        StateDescriptor {
            id: StateId::Calibrate,
            name: "Calibrate",
            on_enter: Some(stop_motor),
            on_exit: None,
            on_update: calibrate_update,
        },
        // Index 1: SealBegin
        StateDescriptor {
            id: StateId::SealBegin,
            name: "SealBegin",
            on_enter: Some(seal_begin_enter),
            on_exit: None,
            on_update: seal_begin_update,
        },
        // Index 2: Sampling
        StateDescriptor {
            id: StateId::Sampling,
            name: "Sampling",
            on_enter: Some(sampling_enter),
            on_exit: None,
            on_update: sampling_update,
        },
        // Index 3: SealEnd
        StateDescriptor {
            id: StateId::SealEnd,
            name: "SealEnd",
            on_enter: Some(seal_end_enter),
            on_exit: None,
            on_update: seal_end_update,
        },
        // Index 4: Dwell
        StateDescriptor {
            id: StateId::Dwell,
            name: "Dwell",
            on_enter: Some(stop_motor),
            on_exit: None,
            on_update: dwell_update,
        },
    ]
}

/// Pure decision step: given the state, its elapsed time and the sampling
/// period in force, return the next state and the lid command to apply on
/// entry, or `None` to stay.
pub fn transition(
    state: StateId,
    elapsed_ms: u64,
    period_ms: u32,
) -> Option<(StateId, ActuatorCommand)> {
    let table = build_state_table();
    let mut ctx = CycleContext::new(period_ms);
    ctx.elapsed_ms = elapsed_ms;

    let next = (table[state as usize].on_update)(&ctx)?;
    if let Some(enter) = table[next as usize].on_enter {
        enter(&mut ctx);
    }
    Some((next, ctx.command))
}

fn elapsed(ctx: &CycleContext, state: StateId) -> bool {
    ctx.elapsed_ms >= target_ms(state, ctx.active_period_ms)
}

fn stop_motor(ctx: &mut CycleContext) {
    ctx.command = ActuatorCommand::Stop;
}

// ═══════════════════════════════════════════════════════════════════════════
//  CALIBRATE: the strokes run in the controller before the first tick
// ═══════════════════════════════════════════════════════════════════════════

fn calibrate_update(_ctx: &CycleContext) -> Option<StateId> {
    Some(StateId::SealBegin)
}

// ═══════════════════════════════════════════════════════════════════════════
//  SEAL_BEGIN
// ═══════════════════════════════════════════════════════════════════════════

fn seal_begin_enter(ctx: &mut CycleContext) {
    ctx.command = ActuatorCommand::Close;
}

fn seal_begin_update(ctx: &CycleContext) -> Option<StateId> {
    elapsed(ctx, StateId::SealBegin).then_some(StateId::Sampling)
}

// ═══════════════════════════════════════════════════════════════════════════
//  SAMPLING
// ═══════════════════════════════════════════════════════════════════════════

fn sampling_enter(ctx: &mut CycleContext) {
    ctx.command = ActuatorCommand::Stop;
    ctx.active_period_ms = ctx.pending_period_ms;
}

fn sampling_update(ctx: &CycleContext) -> Option<StateId> {
    elapsed(ctx, StateId::Sampling).then_some(StateId::SealEnd)
}

// ═══════════════════════════════════════════════════════════════════════════
//  SEAL_END
// ═══════════════════════════════════════════════════════════════════════════

fn seal_end_enter(ctx: &mut CycleContext) {
    ctx.command = ActuatorCommand::Open;
}

fn seal_end_update(ctx: &CycleContext) -> Option<StateId> {
    elapsed(ctx, StateId::SealEnd).then_some(StateId::Dwell)
}

// ═══════════════════════════════════════════════════════════════════════════
//  DWELL
// ═══════════════════════════════════════════════════════════════════════════

fn dwell_update(ctx: &CycleContext) -> Option<StateId> {
    elapsed(ctx, StateId::Dwell).then_some(StateId::SealBegin)
}
