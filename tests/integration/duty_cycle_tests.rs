//! Duty-cycle controller driven over whole cycles with a manual clock and
//! the real lid motor driver on a pin bench.

use std::sync::Arc;

use soilresp::app::duty_cycle::{DutyCycleController, POLL_INTERVAL_MS};
use soilresp::app::events::AppEvent;
use soilresp::app::ports::{ActuatorPort, Clock};
use soilresp::app::sampler::{Sampler, SamplerStep};
use soilresp::app::store::SharedStore;
use soilresp::config::ChamberConfig;
use soilresp::drivers::motor::LidMotor;
use soilresp::fsm::{
    ActuatorCommand, CALIBRATION_SETTLE_MS, CALIBRATION_TRAVEL_MS, HOUR_TARGET_MS,
    MAX_LATENESS_MS, SEAL_DURATION_MS, StateId, Transition,
};

use crate::mock_hw::{BenchPin, EventLog, Line, ManualClock, MockSensor, MotorBench, sample};

type Controller = DutyCycleController<ManualClock, LidMotor<BenchPin, BenchPin>, EventLog>;

struct Rig {
    ctl: Controller,
    clock: ManualClock,
    bench: MotorBench,
    events: EventLog,
    store: Arc<SharedStore>,
}

fn rig(period_ms: u32) -> Rig {
    let clock = ManualClock::default();
    let bench = MotorBench::default();
    let (open, close) = bench.pins();
    let events = EventLog::default();
    let (store, writer) = SharedStore::new(period_ms);
    store.set_link_up(true);
    let ctl = DutyCycleController::new(
        clock.clone(),
        LidMotor::new(open, close).unwrap(),
        events.clone(),
        Arc::clone(&store),
        writer,
    );
    Rig {
        ctl,
        clock,
        bench,
        events,
        store,
    }
}

/// Advance by `step_ms` and tick until `n` transitions into `target` were seen.
fn run_until(rig: &mut Rig, step_ms: u64, target: StateId, n: usize) -> Vec<Transition> {
    let mut seen = Vec::new();
    let mut hits = 0;
    while hits < n {
        rig.clock.advance(step_ms);
        if let Some(t) = rig.ctl.tick() {
            if t.to == target {
                hits += 1;
            }
            seen.push(t);
        }
    }
    seen
}

fn started(rig: &mut Rig) -> Transition {
    rig.ctl.calibrate().unwrap();
    rig.ctl.tick().unwrap()
}

// ── Cycle timing ──────────────────────────────────────────────

#[test]
fn cycle_lasts_exactly_one_hour() {
    let mut rig = rig(900_000);
    let first = started(&mut rig);
    assert_eq!(first.to, StateId::SealBegin);

    let seen = run_until(&mut rig, POLL_INTERVAL_MS, StateId::SealBegin, 2);
    let starts: Vec<u64> = seen
        .iter()
        .filter(|t| t.to == StateId::SealBegin)
        .map(|t| t.entered_at_ms)
        .collect();

    assert_eq!(starts[0] - first.entered_at_ms, HOUR_TARGET_MS);
    assert_eq!(starts[1] - starts[0], HOUR_TARGET_MS);
    assert_eq!(rig.ctl.cycles(), 3);
}

#[test]
fn poll_jitter_does_not_accumulate() {
    let mut rig = rig(900_000);
    let first = started(&mut rig);

    // 1.3 s polls never land on a deadline but stay inside the lateness window.
    let seen = run_until(&mut rig, 1_300, StateId::SealBegin, 3);
    let last = seen.iter().rev().find(|t| t.to == StateId::SealBegin).unwrap();
    assert_eq!(last.entered_at_ms - first.entered_at_ms, 3 * HOUR_TARGET_MS);
}

#[test]
fn phase_lengths_follow_period() {
    let mut rig = rig(600_000);
    let first = started(&mut rig);
    let seen = run_until(&mut rig, POLL_INTERVAL_MS, StateId::SealBegin, 1);

    let at = |to: StateId| seen.iter().find(|t| t.to == to).unwrap().entered_at_ms;
    assert_eq!(at(StateId::Sampling) - first.entered_at_ms, SEAL_DURATION_MS);
    assert_eq!(at(StateId::SealEnd) - at(StateId::Sampling), 600_000);
    assert_eq!(at(StateId::Dwell) - at(StateId::SealEnd), SEAL_DURATION_MS);
    assert_eq!(
        at(StateId::SealBegin) - at(StateId::Dwell),
        HOUR_TARGET_MS - 600_000 - 2 * SEAL_DURATION_MS
    );
}

#[test]
fn states_cycle_in_order_and_calibrate_never_returns() {
    let mut rig = rig(60_000);
    started(&mut rig);
    let seen = run_until(&mut rig, POLL_INTERVAL_MS, StateId::SealBegin, 2);

    let order: Vec<StateId> = seen.iter().map(|t| t.to).collect();
    assert_eq!(
        order,
        vec![
            StateId::Sampling,
            StateId::SealEnd,
            StateId::Dwell,
            StateId::SealBegin,
            StateId::Sampling,
            StateId::SealEnd,
            StateId::Dwell,
            StateId::SealBegin,
        ]
    );
    assert!(seen.iter().all(|t| t.from != StateId::Calibrate));
}

// ── Sampling period ───────────────────────────────────────────

#[test]
fn period_change_applies_from_next_sampling() {
    let mut rig = rig(900_000);
    started(&mut rig);
    let sampling_entry = run_until(&mut rig, POLL_INTERVAL_MS, StateId::Sampling, 1)
        .last()
        .unwrap()
        .entered_at_ms;

    // Mid-Sampling override: the running phase keeps its length.
    rig.clock.advance(300_000);
    rig.ctl.tick();
    rig.store.set_period_ms(1_800_000);
    let seen = run_until(&mut rig, POLL_INTERVAL_MS, StateId::SealEnd, 1);
    assert_eq!(seen.last().unwrap().entered_at_ms - sampling_entry, 900_000);
    assert_eq!(rig.store.cycle().period_ms, 900_000);

    let seen = run_until(&mut rig, POLL_INTERVAL_MS, StateId::SealEnd, 1);
    let sampling = seen.iter().find(|t| t.to == StateId::Sampling).unwrap();
    let seal_end = seen.last().unwrap();
    assert_eq!(seal_end.entered_at_ms - sampling.entered_at_ms, 1_800_000);
    assert_eq!(rig.store.cycle().period_ms, 1_800_000);
}

#[test]
fn longer_period_shortens_dwell_and_keeps_the_hour() {
    let mut rig = rig(900_000);
    let first = started(&mut rig);
    rig.store.set_period_ms(1_800_000);

    let seen = run_until(&mut rig, POLL_INTERVAL_MS, StateId::SealBegin, 1);
    assert_eq!(seen.last().unwrap().entered_at_ms - first.entered_at_ms, HOUR_TARGET_MS);
    assert_eq!(
        rig.store.cycle().dwell_target_ms(),
        HOUR_TARGET_MS - 1_800_000 - 2 * SEAL_DURATION_MS
    );
}

// ── Lid motor ─────────────────────────────────────────────────

#[test]
fn lid_outputs_never_overlap_over_two_cycles() {
    let mut rig = rig(300_000);
    started(&mut rig);
    run_until(&mut rig, POLL_INTERVAL_MS, StateId::SealBegin, 2);

    assert!(!rig.bench.overlapped());
    // Calibration: close, open, close. Then per cycle: open at SealEnd,
    // close at SealBegin.
    assert_eq!(rig.bench.strokes(Line::Close), 2 + 2);
    assert_eq!(rig.bench.strokes(Line::Open), 1 + 2);
}

#[test]
fn motor_follows_state() {
    let mut rig = rig(120_000);
    started(&mut rig);
    assert_eq!(rig.ctl.motor().current(), ActuatorCommand::Close);

    run_until(&mut rig, POLL_INTERVAL_MS, StateId::Sampling, 1);
    assert_eq!(rig.bench.levels(), (false, false));

    run_until(&mut rig, POLL_INTERVAL_MS, StateId::SealEnd, 1);
    assert_eq!(rig.bench.levels(), (true, false));

    run_until(&mut rig, POLL_INTERVAL_MS, StateId::Dwell, 1);
    assert_eq!(rig.bench.levels(), (false, false));

    run_until(&mut rig, POLL_INTERVAL_MS, StateId::SealBegin, 1);
    assert_eq!(rig.bench.levels(), (false, true));
}

#[test]
fn calibration_takes_both_strokes_and_the_settle() {
    let mut rig = rig(900_000);
    rig.ctl.calibrate().unwrap();
    assert_eq!(
        rig.clock.now_ms(),
        2 * CALIBRATION_TRAVEL_MS + CALIBRATION_SETTLE_MS
    );
    assert!(rig.events.contains(&AppEvent::Calibrated));
    assert_eq!(rig.store.state(), StateId::Calibrate);
}

// ── Link loss ─────────────────────────────────────────────────

#[test]
fn link_loss_suspends_and_late_transition_reseeds() {
    let mut rig = rig(900_000);
    started(&mut rig);
    run_until(&mut rig, POLL_INTERVAL_MS, StateId::Dwell, 1);
    let dwell = rig.store.cycle();

    rig.store.set_link_up(false);
    rig.clock.advance(dwell.dwell_target_ms() + 10 * MAX_LATENESS_MS);
    assert!(rig.ctl.tick().is_none());
    assert_eq!(rig.ctl.state(), StateId::Dwell);
    assert_eq!(rig.events.count(|e| *e == AppEvent::LinkLost), 1);

    // Still down: no second report.
    rig.clock.advance(POLL_INTERVAL_MS);
    assert!(rig.ctl.tick().is_none());
    assert_eq!(rig.events.count(|e| *e == AppEvent::LinkLost), 1);

    rig.store.set_link_up(true);
    let now = rig.clock.now_ms();
    let t = rig.ctl.tick().unwrap();
    assert_eq!(t.to, StateId::SealBegin);
    assert_eq!(t.entered_at_ms, now);
}

// ── Sampler gating ────────────────────────────────────────────

#[test]
fn sampler_reads_only_while_sampling() {
    let mut rig = rig(120_000);
    let sensor = MockSensor::default();
    let mut sampler = Sampler::new(
        sensor.clone(),
        rig.clock.clone(),
        EventLog::default(),
        Arc::clone(&rig.store),
        &ChamberConfig::default(),
    );

    started(&mut rig);
    sensor.queue(Ok(sample(412.0)));
    assert_eq!(sampler.step(), SamplerStep::Idle);
    assert_eq!(sensor.reads(), 0);

    run_until(&mut rig, POLL_INTERVAL_MS, StateId::Sampling, 1);
    assert_eq!(sampler.step(), SamplerStep::Stored(sample(412.0)));
    assert_eq!(rig.store.take_sample(), Some(sample(412.0)));

    run_until(&mut rig, POLL_INTERVAL_MS, StateId::SealEnd, 1);
    sensor.queue(Ok(sample(900.0)));
    assert_eq!(sampler.step(), SamplerStep::Idle);
    assert!(!rig.store.sample_ready());
}
