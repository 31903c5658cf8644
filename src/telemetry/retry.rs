//! Bounded retry policies for the telemetry channel.
//!
//! Broker connection runs in rounds of `max_attempts` tries spaced
//! `interval_ms` apart; a failed round is reported as
//! [`ConnectOutcome::Exhausted`]. Firmware updates get `max_attempts` tries
//! per request, `backoff_ms` apart, after which the request is abandoned.

use crate::app::ports::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected { attempts: u8 },
    Exhausted { attempts: u8 },
}

impl RetryPolicy {
    /// Call `attempt(n)` for n = 1..=max_attempts until it succeeds,
    /// sleeping `interval_ms` between failures (not after the last one).
    pub fn run<C, F>(&self, clock: &C, mut attempt: F) -> ConnectOutcome
    where
        C: Clock,
        F: FnMut(u8) -> bool,
    {
        let max = self.max_attempts.max(1);
        for n in 1..=max {
            if attempt(n) {
                return ConnectOutcome::Connected { attempts: n };
            }
            if n < max {
                clock.sleep_ms(self.interval_ms);
            }
        }
        ConnectOutcome::Exhausted { attempts: max }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatePolicy {
    pub max_attempts: u8,
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateVerdict {
    /// Try again once `retry_at_ms` is reached.
    Retry { retry_at_ms: u64 },
    /// Ceiling reached; drop the request.
    Abandon { attempts: u8 },
}

/// Per-request attempt bookkeeping.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRetry {
    generation: Option<u32>,
    failures: u8,
    retry_at_ms: u64,
}

impl UpdateRetry {
    /// Start fresh bookkeeping when a new request generation shows up.
    pub fn observe(&mut self, generation: u32) {
        if self.generation != Some(generation) {
            *self = Self {
                generation: Some(generation),
                ..Self::default()
            };
        }
    }

    pub fn due(&self, now_ms: u64) -> bool {
        now_ms >= self.retry_at_ms
    }

    /// 1-based number of the attempt about to run.
    pub fn next_attempt(&self) -> u8 {
        self.failures.saturating_add(1)
    }

    pub fn record_failure(&mut self, policy: &UpdatePolicy, now_ms: u64) -> UpdateVerdict {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= policy.max_attempts {
            UpdateVerdict::Abandon {
                attempts: self.failures,
            }
        } else {
            self.retry_at_ms = now_ms + policy.backoff_ms;
            UpdateVerdict::Retry {
                retry_at_ms: self.retry_at_ms,
            }
        }
    }
}
