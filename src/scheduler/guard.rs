//! Readiness guards
//!
//! The `Waiting -> Ready` transition is the only part of the stage state
//! machine that differs between stages. Each stage is given one guard at
//! construction.

use chrono::{DateTime, Utc};

use crate::scheduler::status::StatusCategory;

/// Decides when a waiting stage becomes ready
pub trait ReadinessGuard: Send + Sync {
    /// Whether the stage may proceed, given the current time and the last
    /// classified status (if the stage polls)
    fn is_ready(&self, now: DateTime<Utc>, status: Option<StatusCategory>) -> bool;

    /// Wall-clock target, for time-driven guards
    fn scheduled_time(&self) -> Option<DateTime<Utc>>;

    /// Whether this guard needs live status polling
    fn needs_polling(&self) -> bool {
        false
    }

    /// Earliest time polling is worthwhile, for polling guards
    fn poll_from(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Ready once the clock reaches a fixed target
#[derive(Debug, Clone, Copy)]
pub struct TimeGuard {
    target: DateTime<Utc>,
}

impl TimeGuard {
    pub fn new(target: DateTime<Utc>) -> Self {
        Self { target }
    }
}

impl ReadinessGuard for TimeGuard {
    fn is_ready(&self, now: DateTime<Utc>, _status: Option<StatusCategory>) -> bool {
        now >= self.target
    }

    fn scheduled_time(&self) -> Option<DateTime<Utc>> {
        Some(self.target)
    }
}

/// Ready once a terminal status has been observed
///
/// `poll_from` is only a hint for when polling should begin.
#[derive(Debug, Clone, Copy)]
pub struct TerminalStatusGuard {
    poll_from: DateTime<Utc>,
}

impl TerminalStatusGuard {
    pub fn new(poll_from: DateTime<Utc>) -> Self {
        Self { poll_from }
    }
}

impl ReadinessGuard for TerminalStatusGuard {
    fn is_ready(&self, _now: DateTime<Utc>, status: Option<StatusCategory>) -> bool {
        status.is_some_and(|s| s.is_terminal())
    }

    fn scheduled_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn needs_polling(&self) -> bool {
        true
    }

    fn poll_from(&self) -> Option<DateTime<Utc>> {
        Some(self.poll_from)
    }
}
