//! Telemetry/command channel.
//!
//! ```text
//!   wait for link ─▶ connection round ─▶ subscribe ─▶ ┌──────── step ────────┐
//!                         ▲                          │ poll inbound         │
//!                         │ reconnect_interval       │ keep-alive           │
//!                    Disconnected ◀── loss ───────── │ publish ready sample │
//!                                                    │ service update       │
//!                                                    └──────────────────────┘
//! ```
//!
//! Poll cadence follows the duty cycle: while dwelling the channel sleeps
//! in the broker poll until the keep-alive is due, otherwise it wakes
//! every `command_poll_timeout_ms`. A successful firmware update ends the
//! loop with [`StepOutcome::Restart`].

pub mod command;
pub mod retry;

use std::sync::Arc;

use log::debug;

use crate::app::events::AppEvent;
use crate::app::ports::{BrokerError, BrokerPort, Clock, EventSink, FirmwareUpdater, InboundMessage, SystemPort};
use crate::app::store::SharedStore;
use crate::config::ChamberConfig;
use crate::fsm::StateId;
use command::{Command, CommandTopics};
use retry::{ConnectOutcome, RetryPolicy, UpdatePolicy, UpdateRetry, UpdateVerdict};

/// Cadence while waiting for the link.
pub const LINK_WAIT_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posture {
    Connected,
    /// Not connected; a new connection round starts at `retry_at_ms`.
    Disconnected { retry_at_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// An update was installed; the caller must restart.
    Restart,
}

/// Channel tunables, taken from [`ChamberConfig`].
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub sample_topic: String,
    pub topics: CommandTopics,
    pub connect: RetryPolicy,
    pub reconnect_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub update: UpdatePolicy,
}

impl From<&ChamberConfig> for ChannelSettings {
    fn from(config: &ChamberConfig) -> Self {
        Self {
            sample_topic: config.sample_topic.clone(),
            topics: CommandTopics {
                period: config.period_topic.clone(),
                update: config.update_topics.clone(),
            },
            connect: RetryPolicy {
                max_attempts: config.connect_attempts,
                interval_ms: u64::from(config.connect_retry_interval_ms),
            },
            reconnect_interval_ms: u64::from(config.reconnect_interval_ms),
            poll_timeout_ms: u64::from(config.command_poll_timeout_ms),
            update: UpdatePolicy {
                max_attempts: config.update_max_attempts,
                backoff_ms: u64::from(config.update_backoff_ms),
            },
        }
    }
}

pub struct TelemetryChannel<B, U, C, E>
where
    B: BrokerPort,
    U: FirmwareUpdater,
    C: Clock,
    E: EventSink,
{
    broker: B,
    updater: U,
    clock: C,
    sink: E,
    store: Arc<SharedStore>,
    settings: ChannelSettings,
    posture: Posture,
    update_retry: UpdateRetry,
}

impl<B, U, C, E> TelemetryChannel<B, U, C, E>
where
    B: BrokerPort,
    U: FirmwareUpdater,
    C: Clock,
    E: EventSink,
{
    pub fn new(
        broker: B,
        updater: U,
        clock: C,
        sink: E,
        store: Arc<SharedStore>,
        settings: ChannelSettings,
    ) -> Self {
        Self {
            broker,
            updater,
            clock,
            sink,
            store,
            settings,
            posture: Posture::Disconnected { retry_at_ms: 0 },
            update_retry: UpdateRetry::default(),
        }
    }

    pub fn posture(&self) -> Posture {
        self.posture
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }

    pub fn updater(&self) -> &U {
        &self.updater
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    /// Block until the link collaborator reports the network up.
    pub fn wait_for_link(&mut self) {
        while !self.store.link_up() {
            self.clock.sleep_ms(LINK_WAIT_INTERVAL_MS);
        }
    }

    /// Run one connection round and subscribe on success.
    pub fn connect(&mut self) -> ConnectOutcome {
        let policy = self.settings.connect;
        let broker = &mut self.broker;
        let sink = &mut self.sink;
        let outcome = policy.run(&self.clock, |attempt| {
            sink.emit(&AppEvent::BrokerConnectAttempt {
                attempt,
                max: policy.max_attempts,
            });
            broker.connect().is_ok()
        });

        match outcome {
            ConnectOutcome::Connected { attempts } => match self.subscribe_all() {
                Ok(()) => {
                    self.posture = Posture::Connected;
                    self.sink.emit(&AppEvent::BrokerConnected { attempts });
                }
                Err(e) => self.lose(e),
            },
            ConnectOutcome::Exhausted { attempts } => {
                self.posture = Posture::Disconnected {
                    retry_at_ms: self.clock.now_ms() + self.settings.reconnect_interval_ms,
                };
                self.sink.emit(&AppEvent::BrokerUnreachable { attempts });
            }
        }
        outcome
    }

    /// One iteration of the main loop.
    pub fn step(&mut self) -> StepOutcome {
        if !self.store.link_up() {
            self.clock.sleep_ms(LINK_WAIT_INTERVAL_MS);
            return StepOutcome::Continue;
        }

        if let Posture::Disconnected { retry_at_ms } = self.posture {
            if self.clock.now_ms() >= retry_at_ms {
                self.connect();
            }
        }

        if self.posture == Posture::Connected {
            let timeout = self.poll_timeout_ms();
            match self.broker.poll(timeout) {
                Ok(Some(message)) => self.handle_inbound(&message),
                Ok(None) => {}
                Err(e) => self.lose(e),
            }
        } else {
            self.clock.sleep_ms(self.settings.poll_timeout_ms);
        }

        if self.posture == Posture::Connected && self.broker.keepalive_remaining_ms() == 0 {
            if let Err(e) = self.broker.live() {
                self.lose(e);
            }
        }

        self.publish_ready_sample();
        self.service_update()
    }

    /// Wait for the link, connect, then step until an update asks for a
    /// restart.
    pub fn run<S: SystemPort>(mut self, system: &mut S) {
        self.wait_for_link();
        self.connect();
        while self.step() == StepOutcome::Continue {}
        system.restart();
    }

    // ── Internal ──────────────────────────────────────────────

    fn subscribe_all(&mut self) -> Result<(), BrokerError> {
        self.broker.subscribe(&self.settings.topics.period)?;
        for topic in &self.settings.topics.update {
            self.broker.subscribe(topic)?;
        }
        Ok(())
    }

    fn lose(&mut self, error: BrokerError) {
        self.broker.disconnect();
        self.posture = Posture::Disconnected {
            retry_at_ms: self.clock.now_ms(),
        };
        self.sink.emit(&AppEvent::BrokerLost(error));
    }

    fn poll_timeout_ms(&self) -> u64 {
        if self.store.state() == StateId::Dwell {
            self.broker.keepalive_remaining_ms()
        } else {
            self.settings.poll_timeout_ms
        }
    }

    fn handle_inbound(&mut self, message: &InboundMessage) {
        debug!("inbound on {} ({} bytes)", message.topic, message.payload.len());
        match Command::decode(&message.topic, &message.payload, &self.settings.topics) {
            Ok(Command::SetPeriod { period_ms }) => {
                let period_ms = self.store.set_period_ms(period_ms);
                self.sink.emit(&AppEvent::PeriodChanged { period_ms });
            }
            Ok(Command::Update { host }) => {
                self.store.request_update(host.clone());
                self.sink.emit(&AppEvent::UpdateRequested { host });
            }
            Err(e) => self.sink.emit(&AppEvent::CommandRejected(e)),
        }
    }

    fn publish_ready_sample(&mut self) {
        let Some(sample) = self.store.take_sample() else {
            return;
        };
        if self.posture != Posture::Connected {
            self.sink.emit(&AppEvent::PublishFailed(BrokerError::NotConnected));
            return;
        }
        let payload = sample.payload();
        match self.broker.publish(&self.settings.sample_topic, payload.as_bytes()) {
            Ok(()) => self.sink.emit(&AppEvent::SamplePublished(sample)),
            Err(e) => {
                self.sink.emit(&AppEvent::PublishFailed(e));
                if e == BrokerError::ConnectionLost {
                    self.lose(e);
                }
            }
        }
    }

    fn service_update(&mut self) -> StepOutcome {
        let Some(request) = self.store.pending_update() else {
            return StepOutcome::Continue;
        };
        self.update_retry.observe(request.generation);
        let now = self.clock.now_ms();
        if !self.update_retry.due(now) {
            return StepOutcome::Continue;
        }

        let attempt = self.update_retry.next_attempt();
        self.sink.emit(&AppEvent::UpdateStarted { attempt });
        match self.updater.update(&request.host) {
            Ok(report) => {
                self.store.clear_update(request.generation);
                self.sink.emit(&AppEvent::UpdateSucceeded {
                    bytes: report.bytes_written,
                });
                StepOutcome::Restart
            }
            Err(error) => {
                self.sink.emit(&AppEvent::UpdateFailed { attempt, error });
                let verdict = self
                    .update_retry
                    .record_failure(&self.settings.update, self.clock.now_ms());
                if let UpdateVerdict::Abandon { attempts } = verdict {
                    self.store.clear_update(request.generation);
                    self.sink.emit(&AppEvent::UpdateAbandoned { attempts });
                }
                StepOutcome::Continue
            }
        }
    }
}
