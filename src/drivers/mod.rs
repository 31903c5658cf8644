//! Peripheral drivers on top of `embedded-hal` 1.0 traits.

pub mod motor;
pub mod scd30;
