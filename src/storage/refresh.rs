//! Cached tracked event
//!
//! Run-once invocations fire far more often than the fixture list changes, so
//! the last fetched event is kept on disk together with its fetch time and
//! only re-fetched once it is older than the refresh window.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Event;

/// Event snapshot with its fetch time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEvent {
    pub event: Event,
    pub fetched_at: DateTime<Utc>,
}

/// JSON file holding the last fetched event
#[derive(Debug, Clone)]
pub struct EventCache {
    path: PathBuf,
}

impl EventCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached event, if present
    pub async fn load(&self) -> Result<Option<CachedEvent>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read event cache: {}", self.path.display())
                })
            }
        };

        let cached = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse event cache: {}", self.path.display()))?;
        Ok(Some(cached))
    }

    /// Store an event fetched at `now`
    pub async fn save(&self, event: &Event, now: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let cached = CachedEvent {
            event: event.clone(),
            fetched_at: now,
        };
        let json = serde_json::to_vec_pretty(&cached).context("Failed to serialize event cache")?;

        // Write to temp file first, then rename (atomic)
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json)
            .await
            .with_context(|| format!("Failed to write event cache: {}", temp_path.display()))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("Failed to rename event cache: {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), event_id = %event.id, "Event cache saved");
        Ok(())
    }

    /// Whether the event should be fetched again
    ///
    /// True when there is no cache, it cannot be read, or it is older than `max_age`.
    pub async fn is_refresh_needed(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.load().await {
            Ok(Some(cached)) => now - cached.fetched_at >= max_age,
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Event cache unreadable, refreshing");
                true
            }
        }
    }
}
