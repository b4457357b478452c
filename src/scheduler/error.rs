//! Error types for the scheduler module

use std::fmt;

use crate::models::{EventId, Stage};
use crate::utils::error::{AssemblyError, LedgerError, PublishError};

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// Ledger could not be read or written; publication state is unknown
    Ledger {
        event_id: EventId,
        stage: Stage,
        source: LedgerError,
    },

    /// Announcement went out but recording it failed
    RecordAfterPublish {
        event_id: EventId,
        stage: Stage,
        source: LedgerError,
    },

    /// Content assembly failed with a non-recoverable error
    AssemblyFailed {
        stage: Stage,
        source: AssemblyError,
    },

    /// Publisher rejected or failed the submission
    PublishFailed {
        stage: Stage,
        source: PublishError,
    },

    /// A scheduler task panicked or was aborted
    TaskFailed {
        stage: Stage,
        reason: String,
    },

    /// Invalid scheduler configuration
    InvalidConfig {
        field: String,
        reason: String,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ledger {
                event_id,
                stage,
                source,
            } => {
                write!(
                    f,
                    "Ledger unavailable for event {} stage {}: {}",
                    event_id, stage, source
                )
            }
            Self::RecordAfterPublish {
                event_id,
                stage,
                source,
            } => {
                write!(
                    f,
                    "Published event {} stage {} but failed to record it: {}",
                    event_id, stage, source
                )
            }
            Self::AssemblyFailed { stage, source } => {
                write!(f, "Content assembly failed for stage {}: {}", stage, source)
            }
            Self::PublishFailed { stage, source } => {
                write!(f, "Publish failed for stage {}: {}", stage, source)
            }
            Self::TaskFailed { stage, reason } => {
                write!(f, "Task for stage {} failed: {}", stage, reason)
            }
            Self::InvalidConfig { field, reason } => {
                write!(f, "Invalid scheduler config '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Ledger { source, .. } | Self::RecordAfterPublish { source, .. } => Some(source),
            Self::AssemblyFailed { source, .. } => Some(source),
            Self::PublishFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl SchedulerError {
    /// Create a ledger error with context
    pub fn ledger(event_id: EventId, stage: Stage, source: LedgerError) -> Self {
        Self::Ledger {
            event_id,
            stage,
            source,
        }
    }

    /// Create a record-after-publish error
    pub fn record_after_publish(event_id: EventId, stage: Stage, source: LedgerError) -> Self {
        Self::RecordAfterPublish {
            event_id,
            stage,
            source,
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stage this error belongs to, when known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Ledger { stage, .. }
            | Self::RecordAfterPublish { stage, .. }
            | Self::AssemblyFailed { stage, .. }
            | Self::PublishFailed { stage, .. }
            | Self::TaskFailed { stage, .. } => Some(*stage),
            Self::InvalidConfig { .. } => None,
        }
    }

    /// Check if a later tick can be expected to succeed
    ///
    /// Ledger failures are never recoverable within a tick: the host must
    /// look at them instead of guessing publication state.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::PublishFailed { source, .. } => source.is_transient(),
            Self::AssemblyFailed { source, .. } => source.is_recoverable(),
            Self::TaskFailed { .. } => true,
            Self::Ledger { .. }
            | Self::RecordAfterPublish { .. }
            | Self::InvalidConfig { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_error_display() {
        let err = SchedulerError::ledger(
            EventId(1208021),
            Stage::PreEvent,
            LedgerError::Corrupted("expected value".into()),
        );
        let msg = err.to_string();
        assert!(msg.contains("1208021"));
        assert!(msg.contains("pre_event"));
        assert!(msg.contains("expected value"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_publish_failure_recoverable_when_transient() {
        let transient = SchedulerError::PublishFailed {
            stage: Stage::LiveEvent,
            source: PublishError::Transient("503".into()),
        };
        assert!(transient.is_recoverable());

        let rejected = SchedulerError::PublishFailed {
            stage: Stage::LiveEvent,
            source: PublishError::Rejected("ALREADY_SUB".into()),
        };
        assert!(!rejected.is_recoverable());
    }

    #[test]
    fn test_stage_accessor() {
        let err = SchedulerError::TaskFailed {
            stage: Stage::PostEvent,
            reason: "stage task panicked".into(),
        };
        assert_eq!(err.stage(), Some(Stage::PostEvent));
        assert!(err.to_string().contains("post_event"));

        let err = SchedulerError::invalid_config("interval_secs", "must be > 0");
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error as _;
        let err = SchedulerError::record_after_publish(
            EventId(1),
            Stage::PostEvent,
            LedgerError::Task("join".into()),
        );
        assert!(err.source().is_some());
    }
}
