//! Stage target time computation
//!
//! Pure functions from an event start instant to the wall-clock time a stage
//! becomes due. The post-event stage is status-driven and has no target.

use chrono::{DateTime, Duration, Utc};

use crate::models::{Event, Stage};

/// Offsets used to derive stage target times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// How long before start the pre-event announcement is due
    pub pre_event_offset: Duration,

    /// How long before start the live announcement is due
    pub live_event_offset: Duration,

    /// Typical event length; start + this is when polling begins
    pub typical_duration: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pre_event_offset: Duration::hours(24),
            live_event_offset: Duration::minutes(15),
            typical_duration: Duration::minutes(120),
        }
    }
}

impl TimingConfig {
    /// Set the pre-event offset
    pub fn with_pre_event_offset(mut self, offset: Duration) -> Self {
        self.pre_event_offset = offset;
        self
    }

    /// Set the live offset
    pub fn with_live_event_offset(mut self, offset: Duration) -> Self {
        self.live_event_offset = offset;
        self
    }

    /// Set the typical duration
    pub fn with_typical_duration(mut self, duration: Duration) -> Self {
        self.typical_duration = duration;
        self
    }
}

/// Result of a target time lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetTime {
    /// Stage becomes due at this instant
    At(DateTime<Utc>),
    /// Stage is driven by observed status, not the clock
    Undetermined,
}

impl TargetTime {
    /// The instant, if determined
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::At(at) => Some(*at),
            Self::Undetermined => None,
        }
    }
}

/// Maps (event, stage) to a target time
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimeCalculator {
    config: TimingConfig,
}

impl StageTimeCalculator {
    pub fn new(config: TimingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Target time for a stage. Total over its domain.
    pub fn target_time(&self, event: &Event, stage: Stage) -> TargetTime {
        match stage {
            Stage::PreEvent => TargetTime::At(event.start - self.config.pre_event_offset),
            Stage::LiveEvent => TargetTime::At(event.start - self.config.live_event_offset),
            Stage::PostEvent => TargetTime::Undetermined,
        }
    }

    /// When status polling for the post-event stage should begin. A hint, not a trigger.
    pub fn estimated_end(&self, event: &Event) -> DateTime<Utc> {
        event.start + self.config.typical_duration
    }
}
