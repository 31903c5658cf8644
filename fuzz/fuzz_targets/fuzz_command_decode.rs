//! Fuzz target: `Command::decode`
//!
//! The first byte picks the topic, the rest is the payload. Decoding must
//! never panic, a period must land inside its bound and an update host
//! must be non-empty.
//!
//! cargo fuzz run fuzz_command_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use soilresp::fsm::MAX_SAMPLING_PERIOD_MS;
use soilresp::telemetry::command::{Command, CommandTopics};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, payload)) = data.split_first() else {
        return;
    };
    let topics = CommandTopics {
        period: "period/".into(),
        update: ["fota/".into(), "fota/d/".into()],
    };
    let topic = match selector % 4 {
        0 => "period/",
        1 => "fota/",
        2 => "fota/d/",
        _ => "sensor/data",
    };

    match Command::decode(topic, payload, &topics) {
        Ok(Command::SetPeriod { period_ms }) => assert!(period_ms <= MAX_SAMPLING_PERIOD_MS),
        Ok(Command::Update { host }) => assert!(!host.is_empty()),
        Err(_) => {}
    }
});
