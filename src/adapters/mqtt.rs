//! MQTT broker adapter.
//!
//! Implements [`BrokerPort`].
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::mqtt::client::EspMqttClient`.
//!   A receiver thread drains the client's connection and forwards
//!   connect/disconnect/message events over an mpsc channel, so
//!   [`BrokerPort::poll`] is a plain `recv_timeout`. A new client is built
//!   for every connection attempt and dropped on disconnect.
//! - **all other targets**: a loopback simulator driven through a
//!   [`SimBroker`] handle, used by host tests.

use crate::config::ChamberConfig;

/// Connection parameters, taken from [`ChamberConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u16,
    pub connect_timeout_ms: u32,
}

impl MqttSettings {
    pub fn url(&self) -> String {
        format!("mqtt://{}:{}", self.host, self.port)
    }

    pub fn keep_alive_ms(&self) -> u64 {
        u64::from(self.keep_alive_secs) * 1_000
    }
}

impl From<&ChamberConfig> for MqttSettings {
    fn from(config: &ChamberConfig) -> Self {
        Self {
            host: config.broker_host.clone(),
            port: config.broker_port,
            client_id: config.client_id.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            keep_alive_secs: config.keep_alive_secs,
            connect_timeout_ms: config.connect_timeout_ms,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
    use std::thread;
    use std::time::{Duration, Instant};

    use embedded_svc::mqtt::client::{Details, EventPayload, QoS};
    use esp_idf_svc::mqtt::client::{EspMqttClient, EspMqttConnection, MqttClientConfiguration};
    use log::{debug, warn};

    use super::MqttSettings;
    use crate::app::ports::{BrokerError, BrokerPort, InboundMessage};

    const RX_STACK_SIZE: usize = 6 * 1024;

    /// Largest inbound payload forwarded to the channel.
    const MAX_PAYLOAD_BYTES: usize = 256;

    enum Wire {
        Connected,
        Disconnected,
        Message(InboundMessage),
    }

    struct Session {
        client: EspMqttClient<'static>,
        events: Receiver<Wire>,
        up: bool,
    }

    pub struct MqttBroker {
        settings: MqttSettings,
        session: Option<Session>,
        last_activity: Instant,
    }

    impl MqttBroker {
        pub fn new(settings: MqttSettings) -> Self {
            Self {
                settings,
                session: None,
                last_activity: Instant::now(),
            }
        }

        fn spawn_receiver(mut conn: EspMqttConnection, tx: Sender<Wire>) -> Result<(), BrokerError> {
            thread::Builder::new()
                .name("mqtt-rx".into())
                .stack_size(RX_STACK_SIZE)
                .spawn(move || {
                    // next() errors once the client is dropped.
                    while let Ok(event) = conn.next() {
                        let wire = match event.payload() {
                            EventPayload::Connected(_) => Wire::Connected,
                            EventPayload::Disconnected => Wire::Disconnected,
                            EventPayload::Received {
                                topic: Some(topic),
                                data,
                                details: Details::Complete,
                                ..
                            } => {
                                if data.len() > MAX_PAYLOAD_BYTES {
                                    warn!("MQTT | dropping {} byte payload on {}", data.len(), topic);
                                    continue;
                                }
                                Wire::Message(InboundMessage {
                                    topic: topic.into(),
                                    payload: data.to_vec(),
                                })
                            }
                            _ => continue,
                        };
                        if tx.send(wire).is_err() {
                            break;
                        }
                    }
                    debug!("MQTT | receiver exiting");
                })
                .map(|_| ())
                .map_err(|_| BrokerError::ConnectFailed)
        }

        fn session_mut(&mut self) -> Result<&mut Session, BrokerError> {
            match self.session.as_mut() {
                Some(s) if s.up => Ok(s),
                _ => Err(BrokerError::NotConnected),
            }
        }
    }

    impl BrokerPort for MqttBroker {
        fn connect(&mut self) -> Result<(), BrokerError> {
            self.session = None;
            let conf = MqttClientConfiguration {
                client_id: Some(self.settings.client_id.as_str()),
                username: self.settings.username.as_deref(),
                password: self.settings.password.as_deref(),
                keep_alive_interval: Some(Duration::from_secs(u64::from(self.settings.keep_alive_secs))),
                ..Default::default()
            };
            let (client, conn) = EspMqttClient::new(&self.settings.url(), &conf).map_err(|e| {
                warn!("MQTT | client create failed: {:?}", e);
                BrokerError::ConnectFailed
            })?;

            let (tx, events) = mpsc::channel();
            Self::spawn_receiver(conn, tx)?;

            let deadline = Instant::now() + Duration::from_millis(u64::from(self.settings.connect_timeout_ms));
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match events.recv_timeout(remaining) {
                    Ok(Wire::Connected) => break,
                    Ok(_) => {}
                    Err(RecvTimeoutError::Timeout) => return Err(BrokerError::ConnectTimeout),
                    Err(RecvTimeoutError::Disconnected) => return Err(BrokerError::ConnectFailed),
                }
            }

            self.session = Some(Session {
                client,
                events,
                up: true,
            });
            self.last_activity = Instant::now();
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.session.as_ref().is_some_and(|s| s.up)
        }

        fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
            let session = self.session_mut()?;
            session
                .client
                .subscribe(topic, QoS::AtLeastOnce)
                .map(|_| ())
                .map_err(|e| {
                    warn!("MQTT | subscribe {} failed: {:?}", topic, e);
                    BrokerError::SubscribeFailed
                })
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
            let session = self.session_mut()?;
            session
                .client
                .publish(topic, QoS::AtLeastOnce, false, payload)
                .map_err(|e| {
                    warn!("MQTT | publish {} failed: {:?}", topic, e);
                    BrokerError::PublishFailed
                })?;
            self.last_activity = Instant::now();
            Ok(())
        }

        fn poll(&mut self, timeout_ms: u64) -> Result<Option<InboundMessage>, BrokerError> {
            let session = self.session_mut()?;
            let deadline = Instant::now() + Duration::from_millis(timeout_ms);
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match session.events.recv_timeout(remaining) {
                    Ok(Wire::Message(message)) => return Ok(Some(message)),
                    Ok(Wire::Connected) => {}
                    Ok(Wire::Disconnected) | Err(RecvTimeoutError::Disconnected) => {
                        session.up = false;
                        return Err(BrokerError::ConnectionLost);
                    }
                    Err(RecvTimeoutError::Timeout) => return Ok(None),
                }
            }
        }

        fn keepalive_remaining_ms(&self) -> u64 {
            let elapsed = self.last_activity.elapsed().as_millis() as u64;
            self.settings.keep_alive_ms().saturating_sub(elapsed)
        }

        fn live(&mut self) -> Result<(), BrokerError> {
            // The client sends PINGREQ itself; a dead session shows up here.
            self.session_mut()?;
            self.last_activity = Instant::now();
            Ok(())
        }

        fn disconnect(&mut self) {
            self.session = None;
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::MqttBroker;

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub use sim::{MqttBroker, SimBroker};

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    use super::MqttSettings;
    use crate::app::ports::{BrokerError, BrokerPort, InboundMessage};

    #[derive(Debug)]
    struct SimState {
        reachable: bool,
        refuse: u32,
        connected: bool,
        connects: u32,
        subscriptions: Vec<String>,
        inbound: VecDeque<InboundMessage>,
        published: Vec<InboundMessage>,
        drop_pending: bool,
        keepalive_remaining_ms: u64,
        pings: u32,
    }

    /// Test-side handle on the simulated broker.
    #[derive(Debug, Clone)]
    pub struct SimBroker(Arc<Mutex<SimState>>);

    impl Default for SimBroker {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SimBroker {
        pub fn new() -> Self {
            Self(Arc::new(Mutex::new(SimState {
                reachable: true,
                refuse: 0,
                connected: false,
                connects: 0,
                subscriptions: Vec::new(),
                inbound: VecDeque::new(),
                published: Vec::new(),
                drop_pending: false,
                keepalive_remaining_ms: 60_000,
                pings: 0,
            })))
        }

        fn state(&self) -> MutexGuard<'_, SimState> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner)
        }

        pub fn set_reachable(&self, reachable: bool) {
            self.state().reachable = reachable;
        }

        /// Refuse the next `n` connection attempts.
        pub fn refuse_next(&self, n: u32) {
            self.state().refuse = n;
        }

        /// Queue a message as if another client published it.
        pub fn inject(&self, topic: &str, payload: &[u8]) {
            self.state().inbound.push_back(InboundMessage {
                topic: topic.into(),
                payload: payload.to_vec(),
            });
        }

        /// Drop the session on the next poll.
        pub fn drop_connection(&self) {
            self.state().drop_pending = true;
        }

        pub fn set_keepalive_remaining(&self, ms: u64) {
            self.state().keepalive_remaining_ms = ms;
        }

        pub fn published(&self) -> Vec<InboundMessage> {
            self.state().published.clone()
        }

        pub fn subscriptions(&self) -> Vec<String> {
            self.state().subscriptions.clone()
        }

        pub fn connects(&self) -> u32 {
            self.state().connects
        }

        pub fn pings(&self) -> u32 {
            self.state().pings
        }
    }

    pub struct MqttBroker {
        settings: MqttSettings,
        sim: SimBroker,
    }

    impl MqttBroker {
        pub fn simulated(settings: MqttSettings, sim: SimBroker) -> Self {
            Self { settings, sim }
        }

        pub fn settings(&self) -> &MqttSettings {
            &self.settings
        }
    }

    impl BrokerPort for MqttBroker {
        fn connect(&mut self) -> Result<(), BrokerError> {
            let mut s = self.sim.state();
            s.connects += 1;
            s.connected = false;
            s.subscriptions.clear();
            if !s.reachable {
                return Err(BrokerError::ConnectFailed);
            }
            if s.refuse > 0 {
                s.refuse -= 1;
                return Err(BrokerError::ConnectTimeout);
            }
            s.connected = true;
            s.keepalive_remaining_ms = self.settings.keep_alive_ms();
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.sim.state().connected
        }

        fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
            let mut s = self.sim.state();
            if !s.connected {
                return Err(BrokerError::NotConnected);
            }
            if !s.subscriptions.iter().any(|t| t == topic) {
                s.subscriptions.push(topic.into());
            }
            Ok(())
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
            let mut s = self.sim.state();
            if !s.connected {
                return Err(BrokerError::NotConnected);
            }
            s.published.push(InboundMessage {
                topic: topic.into(),
                payload: payload.to_vec(),
            });
            Ok(())
        }

        fn poll(&mut self, _timeout_ms: u64) -> Result<Option<InboundMessage>, BrokerError> {
            let mut s = self.sim.state();
            if s.drop_pending {
                s.drop_pending = false;
                s.connected = false;
                return Err(BrokerError::ConnectionLost);
            }
            if !s.connected {
                return Err(BrokerError::NotConnected);
            }
            while let Some(message) = s.inbound.pop_front() {
                if s.subscriptions.iter().any(|t| *t == message.topic) {
                    return Ok(Some(message));
                }
            }
            Ok(None)
        }

        fn keepalive_remaining_ms(&self) -> u64 {
            self.sim.state().keepalive_remaining_ms
        }

        fn live(&mut self) -> Result<(), BrokerError> {
            let mut s = self.sim.state();
            if !s.connected {
                return Err(BrokerError::NotConnected);
            }
            s.pings += 1;
            s.keepalive_remaining_ms = self.settings.keep_alive_ms();
            Ok(())
        }

        fn disconnect(&mut self) {
            self.sim.state().connected = false;
        }
    }
}
