//! Soil respiration chamber firmware, main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  LidMotor · Scd30   LogEventSink   MqttBroker   FlashSlot      │
//! │  (Actuator/Sensor)  (EventSink)    (Broker)     (Slot+Boot)    │
//! │  WifiLink (LinkUp)  SystemClock    HttpImage    SystemRestart  │
//! │                                    Source                      │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  DutyCycleController · Sampler · TelemetryChannel      │    │
//! │  │            (FirmwareUpdateManager inside)              │    │
//! │  └─────────────────────── SharedStore ────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Boot: confirm the running image, load the configuration, bring the
//! link up, then start one thread per unit. The channel thread resets the
//! chip once a new image is marked for test boot.
#![deny(unused_must_use)]

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::PinDriver;
use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{error, info};

use soilresp::adapters::flash::FlashSlot;
use soilresp::adapters::http::HttpImageSource;
use soilresp::adapters::log_sink::LogEventSink;
use soilresp::adapters::mqtt::{MqttBroker, MqttSettings};
use soilresp::adapters::system::SystemRestart;
use soilresp::adapters::time::SystemClock;
use soilresp::adapters::wifi::{WifiCredentials, WifiLink};
use soilresp::app::duty_cycle::DutyCycleController;
use soilresp::app::events::AppEvent;
use soilresp::app::ports::EventSink;
use soilresp::app::sampler::Sampler;
use soilresp::app::store::SharedStore;
use soilresp::config::ChamberConfig;
use soilresp::diagnostics::StatusHook;
use soilresp::drivers::motor::LidMotor;
use soilresp::drivers::scd30::Scd30;
use soilresp::ota::{FirmwareUpdateManager, confirm_running_image};
use soilresp::telemetry::{ChannelSettings, TelemetryChannel};

const UNIT_STACK_SIZE: usize = 8 * 1024;
const CHANNEL_STACK_SIZE: usize = 16 * 1024;

/// SCD30 bus clock; the sensor tops out at 100 kHz.
const I2C_BAUDRATE_HZ: u32 = 50_000;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  SoilResp v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Keep this image if it is on trial ──────────────────
    let mut sink = LogEventSink::new();
    let mut boot = FlashSlot::new();
    match confirm_running_image(&mut boot) {
        Ok(outcome) => sink.emit(&AppEvent::ImageConfirm(outcome)),
        Err(e) => sink.emit(&AppEvent::ImageConfirmFailed(e)),
    }

    // ── 3. Configuration ──────────────────────────────────────
    let config = ChamberConfig::load(option_env!("SOILRESP_CONFIG_JSON")).context("configuration")?;
    let mut status = StatusHook::new(LogEventSink::new(), config.firmware_version.clone());
    status.notify(true);

    // ── 4. Peripherals ────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let motor = LidMotor::new(
        PinDriver::output(peripherals.pins.gpio25)?,
        PinDriver::output(peripherals.pins.gpio26)?,
    )
    .context("lid motor init")?;

    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio21,
        peripherals.pins.gpio22,
        &I2cConfig::new().baudrate(Hertz(I2C_BAUDRATE_HZ)),
    )?;
    let mut sensor = Scd30::new(i2c, FreeRtos);
    if let Err(e) = sensor.start() {
        error!("SCD30: start failed: {e}");
    }

    // ── 5. Shared store + link ────────────────────────────────
    let (store, writer) = SharedStore::new(config.sampling_period_ms);

    let credentials = WifiCredentials::new(&config.wifi_ssid, &config.wifi_password)
        .context("wifi credentials")?;
    let link = WifiLink::new(peripherals.modem, sysloop, nvs, credentials, Arc::clone(&store))?;
    thread::Builder::new()
        .name("link".into())
        .stack_size(UNIT_STACK_SIZE)
        .spawn::<_, ()>(move || link.run())?;

    // ── 6. Units ──────────────────────────────────────────────
    let controller = DutyCycleController::new(
        SystemClock::new(),
        motor,
        LogEventSink::new(),
        Arc::clone(&store),
        writer,
    );
    thread::Builder::new()
        .name("duty-cycle".into())
        .stack_size(UNIT_STACK_SIZE)
        .spawn::<_, ()>(move || controller.run())?;

    let sampler = Sampler::new(
        sensor,
        SystemClock::new(),
        LogEventSink::new(),
        Arc::clone(&store),
        &config,
    );
    let interval = config.sensor_interval_secs;
    thread::Builder::new()
        .name("sampler".into())
        .stack_size(UNIT_STACK_SIZE)
        .spawn::<_, ()>(move || sampler.run(interval))?;

    let updater = FirmwareUpdateManager::new(
        HttpImageSource::new(),
        boot,
        config.update_port,
        config.update_path.clone(),
    );
    let channel = TelemetryChannel::new(
        MqttBroker::new(MqttSettings::from(&config)),
        updater,
        SystemClock::new(),
        LogEventSink::new(),
        store,
        ChannelSettings::from(&config),
    );
    let mut system = SystemRestart::new(status);
    let handle = thread::Builder::new()
        .name("telemetry".into())
        .stack_size(CHANNEL_STACK_SIZE)
        .spawn(move || channel.run(&mut system))?;

    // run() ends in a chip reset; only a panic gets here.
    if handle.join().is_err() {
        error!("telemetry unit panicked");
    }
    esp_idf_svc::hal::reset::restart()
}
