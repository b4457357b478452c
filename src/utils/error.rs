//! Error types for the collaborators around the scheduler
//!
//! This module defines the errors raised by the data provider, content
//! assembly, publishing and the idempotency ledger.

use thiserror::Error;

/// Errors that can occur while talking to the event-data provider
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream rate limit hit (HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Local daily call budget used up
    #[error("Daily API quota exhausted ({used}/{limit})")]
    QuotaExhausted { used: u32, limit: u32 },

    /// Upstream answered but the requested data is not populated yet
    #[error("Data not yet available: {0}")]
    NotYetAvailable(String),

    /// Upstream returned a non-success status
    #[error("Upstream error: HTTP {0}")]
    Upstream(u16),

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Check if the error is worth retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_)
            | Self::RateLimited
            | Self::QuotaExhausted { .. }
            | Self::NotYetAvailable(_) => true,
            Self::Upstream(code) => *code >= 500,
            Self::InvalidResponse(_) => false,
        }
    }

    /// Rate limits are handled by backoff and never count as stage failures
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited | Self::QuotaExhausted { .. })
    }
}

/// Errors that can occur while assembling announcement content
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// Data required for the announcement is not populated yet
    #[error("Content data not yet available: {0}")]
    NotYetAvailable(String),

    /// Provider failure while gathering data
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Template rendering failed
    #[error("Render error: {0}")]
    Render(String),

    /// The request itself cannot be satisfied
    #[error("Invalid content request: {0}")]
    Invalid(String),
}

impl AssemblyError {
    /// Recoverable errors are retried and eventually degrade to fallback content
    ///
    /// Every provider failure counts, including malformed bodies and client
    /// errors: the fallback needs no provider data.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NotYetAvailable(_) | Self::Provider(_) => true,
            Self::Render(_) | Self::Invalid(_) => false,
        }
    }
}

/// Errors that can occur while publishing an announcement
#[derive(Error, Debug)]
pub enum PublishError {
    /// Network failure, upstream rate limit or server error
    #[error("Transient publish failure: {0}")]
    Transient(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Submission was rejected by the sink
    #[error("Submission rejected: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transient(err.to_string())
    }
}

impl PublishError {
    /// Check if the error is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors that can occur while reading or writing the idempotency ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Filesystem failure
    #[error("Ledger I/O error during '{operation}': {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Ledger contents could not be decoded
    #[error("Ledger corrupted: {0}")]
    Corrupted(String),

    /// SQLite backend failure
    #[error("SQLite ledger error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Redis backend failure
    #[error("Redis ledger error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Backend connection could not be obtained
    #[error("Ledger backend unavailable: {0}")]
    Unavailable(String),

    /// Blocking task running the backend panicked or was cancelled
    #[error("Ledger task failed: {0}")]
    Task(String),
}

impl LedgerError {
    /// Create an I/O error with context
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Transient backend failures worth a short retry on the write path
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Redis(_) | Self::Unavailable(_) | Self::Task(_)
        )
    }
}

impl From<deadpool_redis::PoolError> for LedgerError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupted(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_recoverable() {
        assert!(ProviderError::RateLimited.is_recoverable());
        assert!(ProviderError::Upstream(503).is_recoverable());
        assert!(!ProviderError::Upstream(404).is_recoverable());
        assert!(!ProviderError::InvalidResponse("x".into()).is_recoverable());
    }

    #[test]
    fn test_assembly_error_wraps_provider() {
        let err: AssemblyError = ProviderError::RateLimited.into();
        assert!(err.is_recoverable());
        let err: AssemblyError = ProviderError::InvalidResponse("truncated body".into()).into();
        assert!(err.is_recoverable());
        let err: AssemblyError = ProviderError::Upstream(404).into();
        assert!(err.is_recoverable());
        assert!(!AssemblyError::Invalid("no teams".into()).is_recoverable());
        assert!(!AssemblyError::Render("missing helper".into()).is_recoverable());
    }

    #[test]
    fn test_ledger_error_display() {
        let err = LedgerError::io(
            "write",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("write"));
        assert!(err.to_string().contains("denied"));
    }
}
