//! Idempotency ledger
//!
//! Durable record of which stages have been published for each event. The
//! ledger is the only state shared between stage schedulers and between
//! process restarts, so every mutation is monotonic: a published flag is
//! never cleared by normal operation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              IdempotencyLedger               │
//! │   per-event claim lock, write retry, logs    │
//! └──────────────────────┬───────────────────────┘
//!                        │ LedgerStore
//!     ┌─────────────┬────┴────────┬─────────────┐
//!     ▼             ▼             ▼             ▼
//! ┌────────┐   ┌─────────┐   ┌─────────┐   ┌─────────┐
//! │ Memory │   │  File   │   │ SQLite  │   │  Redis  │
//! └────────┘   └─────────┘   └─────────┘   └─────────┘
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::models::{EventId, Stage};
use crate::utils::error::LedgerError;
use crate::utils::retry::{with_retry_if, RetryConfig};

// ============================================================================
// Core Types
// ============================================================================

/// Published flags for one event
///
/// Serialized with the field names used by the on-disk thread state file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlags {
    #[serde(rename = "preMatchPosted", default)]
    pub pre_event: bool,
    #[serde(rename = "matchThreadPosted", default)]
    pub live_event: bool,
    #[serde(rename = "postMatchPosted", default)]
    pub post_event: bool,
}

impl StageFlags {
    /// Whether `stage` is recorded as published
    pub fn get(&self, stage: Stage) -> bool {
        match stage {
            Stage::PreEvent => self.pre_event,
            Stage::LiveEvent => self.live_event,
            Stage::PostEvent => self.post_event,
        }
    }

    /// Set the flag for `stage`, returning whether it was previously unset
    pub fn set(&mut self, stage: Stage) -> bool {
        let slot = match stage {
            Stage::PreEvent => &mut self.pre_event,
            Stage::LiveEvent => &mut self.live_event,
            Stage::PostEvent => &mut self.post_event,
        };
        let newly_set = !*slot;
        *slot = true;
        newly_set
    }

    /// Flags with only `stage` set
    pub fn only(stage: Stage) -> Self {
        let mut flags = Self::default();
        flags.set(stage);
        flags
    }

    /// Logical OR of two flag sets
    pub fn merge(self, other: Self) -> Self {
        Self {
            pre_event: self.pre_event || other.pre_event,
            live_event: self.live_event || other.live_event,
            post_event: self.post_event || other.post_event,
        }
    }

    /// All three stages published
    pub fn all_published(&self) -> bool {
        self.pre_event && self.live_event && self.post_event
    }

    /// Stages recorded as published
    pub fn published_stages(&self) -> Vec<Stage> {
        Stage::all().into_iter().filter(|s| self.get(*s)).collect()
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Durable key-value backend for stage flags
///
/// Implementations must keep flags monotonic: `put` merges with what is
/// stored and `mark` is an atomic compare-and-set at the storage layer.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Flags for an event; all false if the event has never been recorded
    async fn get(&self, event_id: EventId) -> Result<StageFlags, LedgerError>;

    /// Merge `flags` into the stored flags
    async fn put(&self, event_id: EventId, flags: StageFlags) -> Result<(), LedgerError>;

    /// Set one flag. Returns true if this call set it, false if it was already set.
    /// Durable before returning.
    async fn mark(&self, event_id: EventId, stage: Stage) -> Result<bool, LedgerError>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// In-memory store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    entries: Mutex<HashMap<EventId, StageFlags>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<EventId, StageFlags>>, LedgerError> {
        self.entries
            .lock()
            .map_err(|_| LedgerError::Task("memory ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get(&self, event_id: EventId) -> Result<StageFlags, LedgerError> {
        Ok(self.lock()?.get(&event_id).copied().unwrap_or_default())
    }

    async fn put(&self, event_id: EventId, flags: StageFlags) -> Result<(), LedgerError> {
        let mut entries = self.lock()?;
        let entry = entries.entry(event_id).or_default();
        *entry = entry.merge(flags);
        Ok(())
    }

    async fn mark(&self, event_id: EventId, stage: Stage) -> Result<bool, LedgerError> {
        Ok(self.lock()?.entry(event_id).or_default().set(stage))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// Idempotency Ledger
// ============================================================================

/// Exclusive right to check, publish and record stages of one event
///
/// Held across check -> publish -> record so two schedulers in the same
/// process can never both observe a stage as unpublished.
pub struct LedgerClaim {
    event_id: EventId,
    _guard: OwnedMutexGuard<()>,
}

impl LedgerClaim {
    pub fn event_id(&self) -> EventId {
        self.event_id
    }
}

/// Per-event publication record in front of a [`LedgerStore`]
pub struct IdempotencyLedger {
    store: Arc<dyn LedgerStore>,
    claims: Mutex<HashMap<EventId, Arc<tokio::sync::Mutex<()>>>>,
    write_retry: RetryConfig,
}

impl IdempotencyLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            claims: Mutex::new(HashMap::new()),
            write_retry: RetryConfig::with_delays(2, 250, 2_000),
        }
    }

    /// Ledger backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLedgerStore::new()))
    }

    /// Override the retry policy for `mark_published`
    pub fn with_write_retry(mut self, retry: RetryConfig) -> Self {
        self.write_retry = retry;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Wait for exclusive access to an event's stages
    pub async fn claim(&self, event_id: EventId) -> LedgerClaim {
        let lock = {
            let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(claims.entry(event_id).or_default())
        };
        LedgerClaim {
            event_id,
            _guard: lock.lock_owned().await,
        }
    }

    /// All flags for an event
    pub async fn flags(&self, event_id: EventId) -> Result<StageFlags, LedgerError> {
        self.store.get(event_id).await
    }

    /// Whether a stage has been published
    ///
    /// Read failures are returned, never mapped to either answer.
    pub async fn is_published(&self, event_id: EventId, stage: Stage) -> Result<bool, LedgerError> {
        Ok(self.store.get(event_id).await?.get(stage))
    }

    /// Record a stage as published. Durable when this returns `Ok`.
    ///
    /// Returns false if the stage was already recorded, which means another
    /// actor published it too.
    pub async fn mark_published(&self, event_id: EventId, stage: Stage) -> Result<bool, LedgerError> {
        let store = Arc::clone(&self.store);
        let newly_set = with_retry_if(
            &self.write_retry,
            || {
                let store = Arc::clone(&store);
                async move { store.mark(event_id, stage).await }
            },
            LedgerError::is_transient,
        )
        .await?;

        if newly_set {
            tracing::debug!(
                event_id = %event_id,
                stage = %stage,
                backend = self.store.backend_name(),
                "Stage recorded as published"
            );
        } else {
            tracing::warn!(
                event_id = %event_id,
                stage = %stage,
                backend = self.store.backend_name(),
                "Stage was already recorded as published"
            );
        }
        Ok(newly_set)
    }

    /// Merge externally known flags (operator override, migration)
    pub async fn merge_flags(&self, event_id: EventId, flags: StageFlags) -> Result<(), LedgerError> {
        self.store.put(event_id, flags).await
    }
}
