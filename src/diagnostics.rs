//! Runtime diagnostics.
//!
//! - [`StatusHook`]: one record per enable/disable transition of the
//!   short-range diagnostic channel, tagged with the firmware version.
//! - [`LinkWatch`]: turns link-down observations into a single warning per
//!   outage once the chamber is past calibration.

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

pub struct StatusHook<E: EventSink> {
    sink: E,
    version: String,
    last: Option<bool>,
}

impl<E: EventSink> StatusHook<E> {
    pub fn new(sink: E, version: impl Into<String>) -> Self {
        Self {
            sink,
            version: version.into(),
            last: None,
        }
    }

    /// Called by the diagnostic channel whenever its state is reported.
    /// Returns `true` when this was a transition and a record went out.
    pub fn notify(&mut self, enabled: bool) -> bool {
        if self.last == Some(enabled) {
            return false;
        }
        self.last = Some(enabled);
        self.sink.emit(&AppEvent::DiagnosticChannel {
            enabled,
            version: self.version.clone(),
        });
        true
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }
}

/// Link outage tracker.
#[derive(Debug, Default)]
pub struct LinkWatch {
    armed: bool,
    down: bool,
}

impl LinkWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start reporting outages. Before this, waiting for the link is normal.
    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn is_down(&self) -> bool {
        self.down
    }

    /// Record one observation of the link flag.
    pub fn observe(&mut self, link_up: bool) -> Option<AppEvent> {
        if link_up {
            self.down = false;
            return None;
        }
        let fresh = !self.down;
        self.down = true;
        (fresh && self.armed).then_some(AppEvent::LinkLost)
    }
}
