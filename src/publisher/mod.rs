//! Announcement sinks
//!
//! The scheduler only sees success or failure of a [`Publisher`] call.
//! [`RedditPublisher`] submits self posts; [`DryRunPublisher`] logs instead.

pub mod reddit;

use async_trait::async_trait;

use crate::content::Content;
use crate::utils::error::PublishError;
use crate::utils::truncate_text;

pub use reddit::{PublisherConfig, RedditPublisher};

/// What the sink reported for a successful submission
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishReceipt {
    /// Sink-assigned id (e.g. `t3_abc123`)
    pub id: Option<String>,
    pub url: Option<String>,
    pub dry_run: bool,
}

/// Submits assembled content. All-or-nothing per call.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, content: &Content) -> Result<PublishReceipt, PublishError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Logs the announcement instead of submitting it
///
/// A dry run still counts as published for the ledger.
#[derive(Debug, Clone, Default)]
pub struct DryRunPublisher {
    target: String,
}

impl DryRunPublisher {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[async_trait]
impl Publisher for DryRunPublisher {
    async fn publish(&self, content: &Content) -> Result<PublishReceipt, PublishError> {
        tracing::info!(
            target_sink = %self.target,
            title = %content.title,
            completeness = ?content.completeness,
            body = %truncate_text(&content.body, 500),
            "[DRY RUN] Would publish announcement"
        );
        Ok(PublishReceipt {
            id: None,
            url: None,
            dry_run: true,
        })
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}
