//! Duty-cycle controller: the only unit that moves the chamber through its
//! states and drives the lid motor.
//!
//! One [`tick`](DutyCycleController::tick) per second:
//!
//! 1. Suspend (no transition, timer untouched) while the link is down.
//! 2. Feed the latest sampling period into the FSM context.
//! 3. Let the FSM decide; publish the new snapshot on a transition.
//! 4. Bring the lid motor in line with the FSM's command.
//! 5. While dwelling, report the remaining time once a minute.

use std::sync::Arc;

use super::events::AppEvent;
use super::ports::{ActuatorPort, Clock, EventSink};
use super::store::{CycleSnapshot, CycleWriter, SharedStore};
use crate::diagnostics::LinkWatch;
use crate::error::ActuatorError;
use crate::fsm::context::CycleContext;
use crate::fsm::{
    ActuatorCommand, CALIBRATION_SETTLE_MS, CALIBRATION_TRAVEL_MS, Fsm, StateId, Transition,
    states,
};

/// Cooperative polling cadence.
pub const POLL_INTERVAL_MS: u64 = 1_000;

/// Cadence while waiting for the link.
pub const LINK_WAIT_INTERVAL_MS: u64 = 100;

/// How often the remaining dwell time is reported.
pub const DWELL_REPORT_INTERVAL_MS: u64 = 60_000;

pub struct DutyCycleController<C: Clock, A: ActuatorPort, E: EventSink> {
    clock: C,
    motor: A,
    sink: E,
    store: Arc<SharedStore>,
    writer: CycleWriter,
    fsm: Fsm,
    ctx: CycleContext,
    calibrated: bool,
    link: LinkWatch,
    last_dwell_report: Option<u64>,
}

impl<C: Clock, A: ActuatorPort, E: EventSink> DutyCycleController<C, A, E> {
    pub fn new(clock: C, motor: A, sink: E, store: Arc<SharedStore>, writer: CycleWriter) -> Self {
        let ctx = CycleContext::new(store.period_ms());
        Self {
            clock,
            motor,
            sink,
            store,
            writer,
            fsm: Fsm::new(states::build_state_table(), StateId::Calibrate),
            ctx,
            calibrated: false,
            link: LinkWatch::new(),
            last_dwell_report: None,
        }
    }

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn motor(&self) -> &A {
        &self.motor
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    /// Number of SealBegin entries since boot.
    pub fn cycles(&self) -> u64 {
        self.fsm.cycles()
    }

    /// Run the boot strokes: close fully, settle, open fully, then leave the
    /// close output driven and seed the CycleTimer. Runs once per boot;
    /// later calls do nothing.
    pub fn calibrate(&mut self) -> Result<(), ActuatorError> {
        if self.calibrated {
            return Ok(());
        }

        self.fsm.start(&mut self.ctx, self.clock.now_ms());
        self.publish_snapshot();

        let strokes = [
            (ActuatorCommand::Close, CALIBRATION_TRAVEL_MS),
            (ActuatorCommand::Stop, CALIBRATION_SETTLE_MS),
            (ActuatorCommand::Open, CALIBRATION_TRAVEL_MS),
            (ActuatorCommand::Stop, 0),
            (ActuatorCommand::Close, 0),
        ];
        for (command, hold_ms) in strokes {
            self.motor.apply(command)?;
            if hold_ms > 0 {
                self.clock.sleep_ms(hold_ms);
            }
        }

        self.calibrated = true;
        self.link.arm();
        self.fsm.reseed(self.clock.now_ms());
        self.sink.emit(&AppEvent::Calibrated);
        Ok(())
    }

    /// One cooperative step. Returns the transition taken, if any.
    pub fn tick(&mut self) -> Option<Transition> {
        if let Some(event) = self.link.observe(self.store.link_up()) {
            self.sink.emit(&event);
        }
        if self.link.is_down() {
            return None;
        }

        self.ctx.pending_period_ms = self.store.period_ms();
        let now = self.clock.now_ms();
        let transition = self.fsm.tick(&mut self.ctx, now);

        if let Some(t) = transition {
            self.publish_snapshot();
            self.last_dwell_report = None;
            self.sink.emit(&AppEvent::StateChanged {
                from: t.from,
                to: t.to,
                at_ms: t.entered_at_ms,
            });
        }

        self.drive_motor();

        if self.fsm.current_state() == StateId::Dwell {
            self.report_dwell(now);
        }

        transition
    }

    /// Wait for the link, calibrate, then tick forever.
    pub fn run(mut self) -> ! {
        if !self.store.link_up() {
            self.sink.emit(&AppEvent::WaitingForLink);
            while !self.store.link_up() {
                self.clock.sleep_ms(LINK_WAIT_INTERVAL_MS);
            }
        }

        while let Err(e) = self.calibrate() {
            self.sink.emit(&AppEvent::ActuatorFault(e));
            self.clock.sleep_ms(POLL_INTERVAL_MS);
        }

        loop {
            self.tick();
            let wait = if self.link.is_down() {
                LINK_WAIT_INTERVAL_MS
            } else {
                POLL_INTERVAL_MS
            };
            self.clock.sleep_ms(wait);
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn publish_snapshot(&self) {
        self.writer.publish(CycleSnapshot {
            state: self.fsm.current_state(),
            entered_at_ms: self.fsm.entered_at_ms(),
            period_ms: self.ctx.active_period_ms,
        });
    }

    fn drive_motor(&mut self) {
        if self.motor.current() == self.ctx.command {
            return;
        }
        if let Err(e) = self.motor.apply(self.ctx.command) {
            self.sink.emit(&AppEvent::ActuatorFault(e));
        }
    }

    fn report_dwell(&mut self, now: u64) {
        let elapsed = now.saturating_sub(self.fsm.entered_at_ms());
        let slot = elapsed / DWELL_REPORT_INTERVAL_MS;
        if self.last_dwell_report == Some(slot) {
            return;
        }
        self.last_dwell_report = Some(slot);
        let target = crate::fsm::dwell_target_ms(self.ctx.active_period_ms);
        self.sink.emit(&AppEvent::DwellRemaining {
            remaining_ms: target.saturating_sub(elapsed),
        });
    }
}
