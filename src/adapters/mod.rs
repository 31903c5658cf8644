//! Adapters, concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements            | Connects to                   |
//! |------------|-----------------------|-------------------------------|
//! | `flash`    | SlotPort, BootPort    | OTA partitions / boot manager |
//! | `http`     | ImageSource           | ESP-IDF HTTP client           |
//! | `log_sink` | EventSink             | Serial log output             |
//! | `mqtt`     | BrokerPort            | ESP-IDF MQTT client           |
//! | `system`   | SystemPort            | Chip reset                    |
//! | `time`     | Clock                 | ESP32 system timer            |
//! | `wifi`     | (writes LinkUp)       | ESP-IDF WiFi STA              |
//!
//! The lid motor and gas sensor live in [`crate::drivers`].

pub mod flash;
pub mod http;
pub mod log_sink;
pub mod mqtt;
pub mod system;
pub mod time;
pub mod wifi;
