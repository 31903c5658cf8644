fn main() {
    println!("cargo:rerun-if-env-changed=SOILRESP_CONFIG_JSON");

    // Host builds (tests, fuzzing) have no ESP-IDF toolchain to describe.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
