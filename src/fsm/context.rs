//! Blackboard threaded through every state handler.
//!
//! Handlers read timing and the sampling period from here and write the
//! actuator command back. The controller copies the command out to the
//! lid motor after each tick.

use super::ActuatorCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleContext {
    /// Milliseconds since the current state was entered.
    pub elapsed_ms: u64,
    /// Latest sampling period seen in the shared store.
    pub pending_period_ms: u32,
    /// Sampling period in force for the current cycle; latched from
    /// `pending_period_ms` on Sampling entry.
    pub active_period_ms: u32,
    /// Desired lid motor output.
    pub command: ActuatorCommand,
}

impl CycleContext {
    pub fn new(period_ms: u32) -> Self {
        Self {
            elapsed_ms: 0,
            pending_period_ms: period_ms,
            active_period_ms: period_ms,
            command: ActuatorCommand::Stop,
        }
    }
}
