//! Application core: ports, shared state and the three units of execution
//! that run on top of them.

pub mod duty_cycle;
pub mod events;
pub mod ports;
pub mod sampler;
pub mod store;
