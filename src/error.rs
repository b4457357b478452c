//! Unified error handling for the matchday crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while maintaining the ability to use
//! domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`MatchdayErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use matchday::error::{Error, ErrorCategory, MatchdayErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Will retry on next tick: {err}");
//!     } else {
//!         eprintln!("Fatal error ({}): {err}", err.category());
//!     }
//! }
//! ```

use std::fmt;
use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::scheduler::error::SchedulerError;
pub use crate::utils::error::{AssemblyError, LedgerError, ProviderError, PublishError};

/// Common trait for all matchday error types
///
/// This trait provides a unified interface for error handling across
/// all modules, enabling consistent error processing strategies.
pub trait MatchdayErrorTrait: std::error::Error {
    /// Check if this error is recoverable (a later tick may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout)
    Network,
    /// Upstream rate limit or local quota exhausted
    RateLimit,
    /// Ledger and other storage errors
    Storage,
    /// Content assembly errors
    Content,
    /// Publishing errors
    Publish,
    /// Configuration and validation errors
    Config,
    /// Scheduler state machine errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::Storage => "storage",
            Self::Content => "content",
            Self::Publish => "publish",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the matchday crate
#[derive(Error, Debug)]
pub enum Error {
    /// Data provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Content assembly errors
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// Publishing errors
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Idempotency ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl MatchdayErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_recoverable(),
            Self::Assembly(e) => e.is_recoverable(),
            Self::Publish(e) => e.is_transient(),
            // Never guess publication state
            Self::Ledger(_) => false,
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Provider(e) if e.is_rate_limit() => ErrorCategory::RateLimit,
            Self::Provider(_) => ErrorCategory::Network,
            Self::Assembly(AssemblyError::Provider(e)) if e.is_rate_limit() => {
                ErrorCategory::RateLimit
            }
            Self::Assembly(_) => ErrorCategory::Content,
            Self::Publish(_) => ErrorCategory::Publish,
            Self::Ledger(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Scheduler(
                SchedulerError::Ledger { .. } | SchedulerError::RecordAfterPublish { .. },
            ) => ErrorCategory::Storage,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Json(_) => ErrorCategory::Other,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventId, Stage};

    #[test]
    fn test_error_category() {
        let err = Error::Provider(ProviderError::RateLimited);
        assert_eq!(err.category(), ErrorCategory::RateLimit);

        let err = Error::Provider(ProviderError::Upstream(502));
        assert_eq!(err.category(), ErrorCategory::Network);

        let err = Error::Assembly(AssemblyError::Render("bad template".into()));
        assert_eq!(err.category(), ErrorCategory::Content);
    }

    #[test]
    fn test_ledger_errors_are_not_recoverable() {
        let err = Error::Ledger(LedgerError::Corrupted("truncated".into()));
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Storage);

        let wrapped: Error =
            SchedulerError::ledger(EventId(7), Stage::PostEvent, LedgerError::Task("x".into()))
                .into();
        assert_eq!(wrapped.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_publish_recoverability() {
        assert!(Error::Publish(PublishError::Transient("timeout".into())).is_recoverable());
        assert!(!Error::Publish(PublishError::Rejected("SUBREDDIT_NOEXIST".into())).is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("Invalid API key");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.to_string(), "Something went wrong");
    }
}
