//! Telemetry channel against the simulated broker.

use std::sync::Arc;

use soilresp::adapters::flash::FlashSlot;
use soilresp::adapters::http::{HttpImageSource, SimImageServer};
use soilresp::adapters::mqtt::{MqttBroker, MqttSettings, SimBroker};
use soilresp::app::events::AppEvent;
use soilresp::app::ports::{BrokerError, BrokerPort, Clock, FirmwareUpdater, InboundMessage};
use soilresp::app::store::{CycleSnapshot, CycleWriter, SharedStore};
use soilresp::config::ChamberConfig;
use soilresp::fsm::StateId;
use soilresp::ota::FirmwareUpdateManager;
use soilresp::telemetry::command::CommandError;
use soilresp::telemetry::retry::ConnectOutcome;
use soilresp::telemetry::{ChannelSettings, Posture, StepOutcome, TelemetryChannel};

use crate::mock_hw::{
    CountingSystem, EventLog, ManualClock, ScriptedUpdater, image, sample,
};

struct Rig<B: BrokerPort, U: FirmwareUpdater> {
    channel: TelemetryChannel<B, U, ManualClock, EventLog>,
    clock: ManualClock,
    events: EventLog,
    store: Arc<SharedStore>,
    writer: CycleWriter,
}

fn broker(sim: &SimBroker) -> MqttBroker {
    MqttBroker::simulated(MqttSettings::from(&ChamberConfig::default()), sim.clone())
}

fn rig_with<B: BrokerPort, U: FirmwareUpdater>(broker: B, updater: U) -> Rig<B, U> {
    let clock = ManualClock::at(1_000);
    let events = EventLog::default();
    let (store, writer) = SharedStore::new(900_000);
    store.set_link_up(true);
    let channel = TelemetryChannel::new(
        broker,
        updater,
        clock.clone(),
        events.clone(),
        Arc::clone(&store),
        ChannelSettings::from(&ChamberConfig::default()),
    );
    Rig {
        channel,
        clock,
        events,
        store,
        writer,
    }
}

fn rig(sim: &SimBroker, updater: ScriptedUpdater) -> Rig<MqttBroker, ScriptedUpdater> {
    rig_with(broker(sim), updater)
}

fn update_command(host: &str) -> Vec<u8> {
    format!(r#"{{"unit":"host","value":"{host}"}}"#).into_bytes()
}

// ── Connection ────────────────────────────────────────────────

#[test]
fn connects_and_subscribes_every_command_topic() {
    let sim = SimBroker::new();
    let mut rig = rig(&sim, ScriptedUpdater::failing());

    assert_eq!(rig.channel.connect(), ConnectOutcome::Connected { attempts: 1 });
    assert_eq!(rig.channel.posture(), Posture::Connected);
    assert_eq!(sim.subscriptions(), vec!["period/", "fota/", "fota/d/"]);
    assert!(rig.events.contains(&AppEvent::BrokerConnected { attempts: 1 }));
}

#[test]
fn refused_attempts_are_retried_within_the_round() {
    let sim = SimBroker::new();
    sim.refuse_next(3);
    let mut rig = rig(&sim, ScriptedUpdater::failing());

    let before = rig.clock.now_ms();
    assert_eq!(rig.channel.connect(), ConnectOutcome::Connected { attempts: 4 });
    assert_eq!(rig.clock.now_ms() - before, 3 * 500);
    assert_eq!(
        rig.events.count(|e| matches!(e, AppEvent::BrokerConnectAttempt { .. })),
        4
    );
}

#[test]
fn exhausted_round_waits_before_the_next_one() {
    let sim = SimBroker::new();
    sim.set_reachable(false);
    let mut rig = rig(&sim, ScriptedUpdater::failing());

    assert_eq!(rig.channel.connect(), ConnectOutcome::Exhausted { attempts: 10 });
    assert!(rig.events.contains(&AppEvent::BrokerUnreachable { attempts: 10 }));
    let Posture::Disconnected { retry_at_ms } = rig.channel.posture() else {
        panic!("still connected after an exhausted round");
    };
    assert_eq!(retry_at_ms, rig.clock.now_ms() + 30_000);

    sim.set_reachable(true);
    while rig.clock.now_ms() < retry_at_ms {
        assert_eq!(sim.connects(), 10);
        rig.channel.step();
    }
    rig.channel.step();
    assert_eq!(rig.channel.posture(), Posture::Connected);
    assert_eq!(sim.connects(), 11);
}

#[test]
fn lost_connection_reconnects_on_the_next_step() {
    let sim = SimBroker::new();
    let mut rig = rig(&sim, ScriptedUpdater::failing());
    rig.channel.connect();

    sim.drop_connection();
    rig.channel.step();
    assert!(rig.events.contains(&AppEvent::BrokerLost(BrokerError::ConnectionLost)));
    assert!(matches!(rig.channel.posture(), Posture::Disconnected { .. }));

    rig.channel.step();
    assert_eq!(rig.channel.posture(), Posture::Connected);
    assert_eq!(sim.connects(), 2);
    assert_eq!(sim.subscriptions().len(), 3);
}

#[test]
fn keepalive_is_serviced_when_due() {
    let sim = SimBroker::new();
    let mut rig = rig(&sim, ScriptedUpdater::failing());
    rig.channel.connect();

    rig.channel.step();
    assert_eq!(sim.pings(), 0);

    sim.set_keepalive_remaining(0);
    rig.channel.step();
    assert_eq!(sim.pings(), 1);
}

#[test]
fn nothing_happens_while_the_link_is_down() {
    let sim = SimBroker::new();
    let mut rig = rig(&sim, ScriptedUpdater::failing());
    rig.store.set_link_up(false);
    rig.store.put_sample(sample(500.0));

    rig.channel.step();
    assert_eq!(sim.connects(), 0);
    assert!(rig.store.sample_ready());
}

// ── Samples ───────────────────────────────────────────────────

#[test]
fn ready_sample_is_published_once() {
    let sim = SimBroker::new();
    let mut rig = rig(&sim, ScriptedUpdater::failing());
    rig.channel.connect();

    rig.store.put_sample(sample(412.0));
    rig.channel.step();
    rig.channel.step();

    assert_eq!(
        sim.published(),
        vec![InboundMessage {
            topic: "sensor/data".into(),
            payload: b"412.00,21.50,48.00".to_vec(),
        }]
    );
    assert!(rig.events.contains(&AppEvent::SamplePublished(sample(412.0))));
}

#[test]
fn newer_sample_replaces_unpublished_one() {
    let sim = SimBroker::new();
    let mut rig = rig(&sim, ScriptedUpdater::failing());
    rig.channel.connect();

    rig.store.put_sample(sample(400.0));
    rig.store.put_sample(sample(401.0));
    rig.channel.step();

    let published = sim.published();
    assert_eq!(published.len(), 1);
    assert!(published[0].payload.starts_with(b"401.00,"));
}

#[test]
fn sample_ready_while_disconnected_is_dropped() {
    let sim = SimBroker::new();
    sim.set_reachable(false);
    let mut rig = rig(&sim, ScriptedUpdater::failing());

    rig.store.put_sample(sample(650.0));
    rig.channel.step();

    assert!(!rig.store.sample_ready());
    assert!(sim.published().is_empty());
    assert!(rig.events.contains(&AppEvent::PublishFailed(BrokerError::NotConnected)));
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn period_command_updates_the_store() {
    let sim = SimBroker::new();
    let mut rig = rig(&sim, ScriptedUpdater::failing());
    rig.channel.connect();

    sim.inject("period/", br#"{"unit":"min","value":"30"}"#);
    rig.channel.step();

    assert_eq!(rig.store.period_ms(), 1_800_000);
    assert!(rig.events.contains(&AppEvent::PeriodChanged { period_ms: 1_800_000 }));
}

#[test]
fn negative_period_clamps_to_zero() {
    let sim = SimBroker::new();
    let mut rig = rig(&sim, ScriptedUpdater::failing());
    rig.channel.connect();

    sim.inject("period/", br#"{"unit":"min","value":-5}"#);
    rig.channel.step();
    assert_eq!(rig.store.period_ms(), 0);
}

#[test]
fn malformed_command_is_rejected_without_side_effects() {
    let sim = SimBroker::new();
    let mut rig = rig(&sim, ScriptedUpdater::failing());
    rig.channel.connect();

    sim.inject("period/", b"thirty");
    rig.channel.step();

    assert_eq!(rig.store.period_ms(), 900_000);
    assert!(rig.events.contains(&AppEvent::CommandRejected(CommandError::Malformed)));
}

// ── Firmware update ───────────────────────────────────────────

#[test]
fn installed_update_requests_a_restart() {
    let sim = SimBroker::new();
    let mut rig = rig(&sim, ScriptedUpdater::succeeding(4096));
    rig.channel.connect();

    sim.inject("fota/d/", &update_command("fw.example.org"));
    assert_eq!(rig.channel.step(), StepOutcome::Restart);

    assert_eq!(rig.channel.updater().hosts, vec!["fw.example.org"]);
    assert!(rig.store.pending_update().is_none());
    assert!(rig.events.contains(&AppEvent::UpdateSucceeded { bytes: 4096 }));
}

#[test]
fn failing_update_is_retried_then_abandoned() {
    let sim = SimBroker::new();
    let mut rig = rig(&sim, ScriptedUpdater::failing());
    rig.channel.connect();

    sim.inject("fota/", &update_command("fw.example.org"));
    let start = rig.clock.now_ms();
    while rig.store.pending_update().is_some() || rig.channel.updater().hosts.is_empty() {
        assert_eq!(rig.channel.step(), StepOutcome::Continue);
        rig.clock.advance(1_000);
    }

    assert_eq!(rig.channel.updater().hosts.len(), 5);
    assert!(rig.clock.now_ms() - start >= 4 * 30_000);
    assert!(rig.events.contains(&AppEvent::UpdateAbandoned { attempts: 5 }));

    // Abandoned for good: more steps do not retry.
    for _ in 0..60 {
        rig.channel.step();
        rig.clock.advance(1_000);
    }
    assert_eq!(rig.channel.updater().hosts.len(), 5);
}

#[test]
fn fresh_command_rearms_an_abandoned_update() {
    let sim = SimBroker::new();
    let mut rig = rig(&sim, ScriptedUpdater::failing());
    rig.channel.connect();

    sim.inject("fota/", &update_command("a.example.org"));
    while !rig.events.contains(&AppEvent::UpdateAbandoned { attempts: 5 }) {
        rig.channel.step();
        rig.clock.advance(1_000);
    }

    sim.inject("fota/", &update_command("b.example.org"));
    rig.channel.step();
    assert_eq!(rig.channel.updater().hosts.last().unwrap(), "b.example.org");
    assert!(
        rig.events
            .events()
            .ends_with(&[AppEvent::UpdateFailed {
                attempt: 1,
                error: soilresp::ota::OtaError::Transport,
            }])
    );
}

#[test]
fn run_restarts_after_an_installed_update() {
    let sim = SimBroker::new();
    let rig = rig(&sim, ScriptedUpdater::succeeding(1));
    sim.inject("fota/", &update_command("fw.example.org"));

    let mut system = CountingSystem::default();
    rig.channel.run(&mut system);
    assert_eq!(system.restarts, 1);
}

#[test]
fn update_streams_into_the_flash_slot() {
    let sim = SimBroker::new();
    let server = SimImageServer::new();
    let firmware = image(3_000);
    server.serve(&firmware);

    let updater = FirmwareUpdateManager::new(
        HttpImageSource::simulated(server.clone()),
        FlashSlot::new(64 * 1024),
        80,
        "/soilresp.signed.bin",
    );
    let mut rig = rig_with(broker(&sim), updater);
    rig.channel.connect();

    sim.inject("fota/", &update_command("fw.example.org"));
    assert_eq!(rig.channel.step(), StepOutcome::Restart);

    assert_eq!(rig.channel.updater().slot().boot_pending(), Some(&firmware[..]));
    assert_eq!(
        server.requests(),
        vec!["http://fw.example.org/soilresp.signed.bin"]
    );
}

// ── Dwell ─────────────────────────────────────────────────────

/// Records the timeout of every poll.
struct TimeoutRecorder {
    inner: MqttBroker,
    timeouts: Vec<u64>,
}

impl BrokerPort for TimeoutRecorder {
    fn connect(&mut self) -> Result<(), BrokerError> {
        self.inner.connect()
    }
    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        self.inner.subscribe(topic)
    }
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.inner.publish(topic, payload)
    }
    fn poll(&mut self, timeout_ms: u64) -> Result<Option<InboundMessage>, BrokerError> {
        self.timeouts.push(timeout_ms);
        self.inner.poll(timeout_ms)
    }
    fn keepalive_remaining_ms(&self) -> u64 {
        self.inner.keepalive_remaining_ms()
    }
    fn live(&mut self) -> Result<(), BrokerError> {
        self.inner.live()
    }
    fn disconnect(&mut self) {
        self.inner.disconnect();
    }
}

#[test]
fn dwell_polls_until_the_keepalive_is_due() {
    let sim = SimBroker::new();
    let recorder = TimeoutRecorder {
        inner: broker(&sim),
        timeouts: Vec::new(),
    };
    let mut rig = rig_with(recorder, ScriptedUpdater::failing());
    rig.channel.connect();

    rig.channel.step();
    sim.set_keepalive_remaining(42_000);
    rig.writer.publish(CycleSnapshot {
        state: StateId::Dwell,
        entered_at_ms: 0,
        period_ms: 900_000,
    });
    rig.channel.step();

    assert_eq!(rig.channel.broker().timeouts, vec![1_000, 42_000]);
}
