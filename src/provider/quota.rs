//! Daily API call budget
//!
//! The upstream plan allows a fixed number of calls per UTC day. Every
//! request is counted before it is sent; once the budget is spent requests
//! fail fast with [`ProviderError::QuotaExhausted`] until the day rolls over.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::utils::clock::Clock;
use crate::utils::error::ProviderError;

/// Fraction of the budget at which a warning is logged
const WARN_RATIO: f64 = 0.8;

/// Calls made on one UTC day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub date: NaiveDate,
    pub calls: u32,
}

/// Per-day request counter, optionally persisted to JSON
pub struct QuotaTracker {
    limit: u32,
    path: Option<PathBuf>,
    usage: Mutex<QuotaUsage>,
    clock: Arc<dyn Clock>,
}

impl QuotaTracker {
    /// In-memory tracker. A limit of 0 disables the budget.
    pub fn new(limit: u32, clock: Arc<dyn Clock>) -> Self {
        let today = clock.now().date_naive();
        Self {
            limit,
            path: None,
            usage: Mutex::new(QuotaUsage {
                date: today,
                calls: 0,
            }),
            clock,
        }
    }

    /// Tracker that survives restarts. An unreadable file starts from zero.
    pub async fn persistent(limit: u32, path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        let path = path.into();
        let today = clock.now().date_naive();

        let usage = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<QuotaUsage>(&raw) {
                Ok(usage) if usage.date == today => usage,
                Ok(_) => QuotaUsage {
                    date: today,
                    calls: 0,
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Quota file unreadable, starting from zero");
                    QuotaUsage {
                        date: today,
                        calls: 0,
                    }
                }
            },
            Err(_) => QuotaUsage {
                date: today,
                calls: 0,
            },
        };

        Self {
            limit,
            path: Some(path),
            usage: Mutex::new(usage),
            clock,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Calls counted today
    pub async fn used_today(&self) -> u32 {
        let today = self.clock.now().date_naive();
        let usage = self.usage.lock().await;
        if usage.date == today {
            usage.calls
        } else {
            0
        }
    }

    /// Count one call to `endpoint`, or refuse it if the budget is spent
    pub async fn acquire(&self, endpoint: &str) -> Result<u32, ProviderError> {
        let today = self.clock.now().date_naive();
        let mut usage = self.usage.lock().await;

        if usage.date != today {
            tracing::info!(previous = usage.calls, "New quota day, resetting call counter");
            *usage = QuotaUsage {
                date: today,
                calls: 0,
            };
        }

        if self.limit > 0 && usage.calls >= self.limit {
            tracing::error!(
                used = usage.calls,
                limit = self.limit,
                endpoint = endpoint,
                "Daily API quota exhausted"
            );
            return Err(ProviderError::QuotaExhausted {
                used: usage.calls,
                limit: self.limit,
            });
        }

        usage.calls += 1;
        let calls = usage.calls;

        if self.limit > 0 && f64::from(calls) >= f64::from(self.limit) * WARN_RATIO {
            tracing::warn!(used = calls, limit = self.limit, "Approaching daily API quota");
        } else {
            tracing::debug!(used = calls, limit = self.limit, endpoint = endpoint, "API call counted");
        }

        if let Some(path) = &self.path {
            if let Err(e) = persist(path, &usage).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to persist quota usage");
            }
        }

        Ok(calls)
    }
}

async fn persist(path: &std::path::Path, usage: &QuotaUsage) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(usage)?;
    tokio::fs::write(path, json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2025, 5, 4, 10, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_quota_exhausts_and_resets_next_day() {
        let clock = clock();
        let tracker = QuotaTracker::new(2, Arc::new(clock.clone()));

        assert_eq!(tracker.acquire("/fixtures").await.unwrap(), 1);
        assert_eq!(tracker.acquire("/fixtures").await.unwrap(), 2);
        let err = tracker.acquire("/fixtures").await.unwrap_err();
        assert!(matches!(err, ProviderError::QuotaExhausted { used: 2, limit: 2 }));
        assert!(err.is_rate_limit());

        clock.advance(Duration::days(1));
        assert_eq!(tracker.used_today().await, 0);
        assert_eq!(tracker.acquire("/fixtures").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zero_limit_is_unbounded() {
        let tracker = QuotaTracker::new(0, Arc::new(clock()));
        for _ in 0..150 {
            tracker.acquire("/fixtures").await.unwrap();
        }
        assert_eq!(tracker.used_today().await, 150);
    }

    #[tokio::test]
    async fn test_persistent_usage_survives_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api-calls.json");
        let clock = clock();

        let tracker = QuotaTracker::persistent(100, &path, Arc::new(clock.clone())).await;
        tracker.acquire("/fixtures").await.unwrap();
        tracker.acquire("/fixtures/lineups").await.unwrap();
        drop(tracker);

        let reloaded = QuotaTracker::persistent(100, &path, Arc::new(clock)).await;
        assert_eq!(reloaded.used_today().await, 2);
    }
}
