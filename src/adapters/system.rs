//! Process restart.
//!
//! The diagnostic channel goes down with the process, so the restart
//! adapter owns its [`StatusHook`] and reports the disable first.

use log::info;

use crate::app::ports::{EventSink, SystemPort};
use crate::diagnostics::StatusHook;

pub struct SystemRestart<E: EventSink> {
    status: StatusHook<E>,
}

impl<E: EventSink> SystemRestart<E> {
    pub fn new(status: StatusHook<E>) -> Self {
        Self { status }
    }

    pub fn status(&self) -> &StatusHook<E> {
        &self.status
    }
}

impl<E: EventSink> SystemPort for SystemRestart<E> {
    #[cfg(target_os = "espidf")]
    fn restart(&mut self) {
        self.status.notify(false);
        info!("SYSTEM | restarting into new firmware");
        esp_idf_svc::hal::reset::restart();
    }

    /// Simulation: there is no process to restart, the caller returns.
    #[cfg(not(target_os = "espidf"))]
    fn restart(&mut self) {
        self.status.notify(false);
        info!("SYSTEM | restart requested (simulation)");
    }
}
