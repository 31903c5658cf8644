//! Fuzz target: `ChamberConfig::from_json`
//!
//! Arbitrary bytes as the persisted configuration document. Loading must
//! never panic, and an accepted document must pass validation again.
//!
//! cargo fuzz run fuzz_config_json

#![no_main]

use libfuzzer_sys::fuzz_target;
use soilresp::config::ChamberConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = ChamberConfig::from_json(doc) {
        assert!(config.validate().is_ok());
        assert!(config.update_path.starts_with('/'));
    }
});
