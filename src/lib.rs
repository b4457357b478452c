//! matchday - fixture lifecycle scheduler
//!
//! Publishes a pre-match, a match and a post-match thread for a tracked
//! fixture, each exactly once, surviving restarts and repeated cron runs.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`scheduler`] - stage state machines, status polling and orchestration
//! - [`storage`] - idempotency ledger backends and the event cache
//! - [`provider`] - event-data provider (API-Football) with quota tracking
//! - [`content`] - announcement assembly from handlebars templates
//! - [`publisher`] - announcement sinks (Reddit, dry run)
//! - [`config`] - configuration management and settings
//! - [`models`] - core data structures and types
//! - [`metrics`] - Prometheus counters
//! - [`utils`] - clock, retry helpers and domain errors
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use matchday::content::MatchThreadAssembler;
//! use matchday::provider::{ApiFootballClient, DataProvider};
//! use matchday::publisher::DryRunPublisher;
//! use matchday::scheduler::{LifecycleOrchestrator, SchedulerContext};
//! use matchday::storage::IdempotencyLedger;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let provider: Arc<dyn DataProvider> = Arc::new(ApiFootballClient::new(Default::default())?);
//!     let assembler = Arc::new(MatchThreadAssembler::new(Arc::clone(&provider))?);
//!     let ctx = SchedulerContext::new(
//!         Arc::new(IdempotencyLedger::in_memory()),
//!         Arc::clone(&provider),
//!         assembler,
//!         Arc::new(DryRunPublisher::new("r/test")),
//!     );
//!
//!     if let Some(event) = provider.fetch_event().await? {
//!         let report = LifecycleOrchestrator::new(event, ctx)?.tick().await;
//!         println!("failures: {}", report.has_failures());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod metrics;
pub mod models;
pub mod provider;
pub mod publisher;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::content::{Content, ContentAssembler, ContentRequest};
    pub use crate::error::{Error, ErrorCategory, MatchdayErrorTrait, Result};
    pub use crate::models::{Event, EventId, Stage};
    pub use crate::provider::DataProvider;
    pub use crate::publisher::Publisher;
    pub use crate::scheduler::{LifecycleOrchestrator, SchedulerContext, StageState, TickReport};
    pub use crate::storage::{IdempotencyLedger, LedgerStore};
}

// Direct re-exports for convenience
pub use models::{Event, EventId, Stage};
