//! WiFi station-mode link adapter.
//!
//! The only writer of the store's LinkUp flag. Brings the station up,
//! then supervises it: a dropped link clears the flag and is retried
//! with an exponential backoff (2 s → 4 s → 8 s … capped at 60 s).
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::BlockingWifi` over `EspWifi`.
//! - **all other targets**: a simulated station that is always reachable.

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::app::store::SharedStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
        }
    }
}

impl std::error::Error for LinkError {}

const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 60;

/// How often a healthy link is re-checked.
const SUPERVISE_INTERVAL_MS: u64 = 1_000;

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, LinkError> {
        if ssid.is_empty() || !is_printable_ascii(ssid) {
            return Err(LinkError::InvalidSsid);
        }
        if !password.is_empty() && password.len() < 8 {
            return Err(LinkError::InvalidPassword);
        }
        let mut creds = Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
        };
        creds.ssid.push_str(ssid).map_err(|_| LinkError::InvalidSsid)?;
        creds
            .password
            .push_str(password)
            .map_err(|_| LinkError::InvalidPassword)?;
        Ok(creds)
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────
// Link adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiLink {
    credentials: WifiCredentials,
    store: Arc<SharedStore>,
    backoff_secs: u64,
    #[cfg(target_os = "espidf")]
    wifi: esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim_up: bool,
}

impl WifiLink {
    #[cfg(target_os = "espidf")]
    pub fn new(
        modem: esp_idf_svc::hal::modem::Modem,
        sysloop: esp_idf_svc::eventloop::EspSystemEventLoop,
        nvs: esp_idf_svc::nvs::EspDefaultNvsPartition,
        credentials: WifiCredentials,
        store: Arc<SharedStore>,
    ) -> anyhow::Result<Self> {
        use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
        use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

        let esp_wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;
        let mut wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;

        let auth_method = if credentials.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow::anyhow!("wifi ssid too long"))?,
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| anyhow::anyhow!("wifi password too long"))?,
            auth_method,
            ..Default::default()
        }))?;
        wifi.start()?;

        Ok(Self {
            credentials,
            store,
            backoff_secs: INITIAL_BACKOFF_SECS,
            wifi,
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(credentials: WifiCredentials, store: Arc<SharedStore>) -> Self {
        Self {
            credentials,
            store,
            backoff_secs: INITIAL_BACKOFF_SECS,
            sim_up: false,
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), LinkError> {
        self.wifi
            .connect()
            .and_then(|()| self.wifi.wait_netif_up())
            .map_err(|e| {
                warn!("WiFi: connect failed: {:?}", e);
                let _ = self.wifi.disconnect();
                LinkError::ConnectionFailed
            })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), LinkError> {
        self.sim_up = true;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.sim_up
    }

    // ── Public ────────────────────────────────────────────────

    pub fn backoff_secs(&self) -> u64 {
        self.backoff_secs
    }

    /// One connection attempt. Raises LinkUp on success.
    pub fn connect(&mut self) -> Result<(), LinkError> {
        info!("LINK | connecting ssid='{}'", self.credentials.ssid());
        match self.platform_connect() {
            Ok(()) => {
                self.backoff_secs = INITIAL_BACKOFF_SECS;
                self.store.set_link_up(true);
                info!("LINK | up");
                Ok(())
            }
            Err(e) => {
                self.backoff_secs = (self.backoff_secs * 2).min(MAX_BACKOFF_SECS);
                Err(e)
            }
        }
    }

    /// Mirror the station state into LinkUp. Returns the delay before the
    /// next check.
    pub fn supervise(&mut self) -> Duration {
        if self.platform_is_connected() {
            return Duration::from_millis(SUPERVISE_INTERVAL_MS);
        }
        if self.store.link_up() {
            warn!("LINK | lost");
            self.store.set_link_up(false);
        }
        match self.connect() {
            Ok(()) => Duration::from_millis(SUPERVISE_INTERVAL_MS),
            Err(_) => Duration::from_secs(self.backoff_secs),
        }
    }

    /// Supervise forever.
    pub fn run(mut self) -> ! {
        loop {
            let wait = self.supervise();
            std::thread::sleep(wait);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn simulate_drop(&mut self) {
        self.sim_up = false;
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
