//! Event-data provider
//!
//! The scheduler consumes event data through [`DataProvider`] and does not
//! know about its transport. [`ApiFootballClient`] is the HTTP implementation
//! used by the binary.

pub mod api_football;
pub mod quota;

use async_trait::async_trait;

use crate::models::{Competition, Event, EventId, FinalResult, LiveDetail, RecentResult};
use crate::utils::error::ProviderError;

pub use api_football::{ApiFootballClient, ProviderConfig};
pub use quota::QuotaTracker;

/// Source of event data and live status
///
/// Every call may be slow, rate limited or fail intermittently.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Next event to track, if any is scheduled
    async fn fetch_event(&self) -> Result<Option<Event>, ProviderError>;

    /// Data published close to the start (lineups). May be partially populated.
    async fn fetch_live_detail(&self, event_id: EventId) -> Result<LiveDetail, ProviderError>;

    /// Result data once the event has ended
    async fn fetch_final_data(&self, event_id: EventId) -> Result<FinalResult, ProviderError>;

    /// Raw provider status code for the event
    async fn fetch_status(&self, event_id: EventId) -> Result<String, ProviderError>;

    /// Last `count` finished fixtures of a team in `competition`, newest first
    ///
    /// Providers without history report none.
    async fn fetch_recent_form(
        &self,
        _team_id: u64,
        _competition: &Competition,
        _count: u8,
    ) -> Result<Vec<RecentResult>, ProviderError> {
        Ok(Vec::new())
    }
}
