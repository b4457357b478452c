pub mod mark;
pub mod preview;
pub mod run;
pub mod status;
pub mod tick;

use std::sync::Arc;

use anyhow::{Context, Result};

use matchday::config::Config;
use matchday::content::{MatchThreadAssembler, NicknameBook};
use matchday::models::Event;
use matchday::provider::{ApiFootballClient, DataProvider, QuotaTracker};
use matchday::publisher::{DryRunPublisher, Publisher, RedditPublisher};
use matchday::scheduler::SchedulerContext;
use matchday::storage::{open_ledger_store, EventCache, IdempotencyLedger};
use matchday::utils::clock::{Clock, SystemClock};

// Re-export command functions for convenience
pub use mark::mark;
pub use preview::preview;
pub use run::run;
pub use status::status;
pub use tick::tick;

/// Everything a command needs to drive the lifecycle
pub struct Runtime {
    pub ctx: SchedulerContext,
    pub provider: Arc<dyn DataProvider>,
    pub cache: EventCache,
}

impl Runtime {
    pub async fn build(config: &Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let quota = match &config.provider.quota_path {
            Some(path) => QuotaTracker::persistent(config.provider.daily_quota, path, Arc::clone(&clock)).await,
            None => QuotaTracker::new(config.provider.daily_quota, Arc::clone(&clock)),
        };
        let client = ApiFootballClient::new(config.provider.to_provider_config())
            .context("Failed to create provider client")?
            .with_quota(Arc::new(quota));
        let provider: Arc<dyn DataProvider> = Arc::new(client);

        let ledger = Arc::new(open_ledger(config).await?);

        let mut assembler = MatchThreadAssembler::new(Arc::clone(&provider))
            .context("Failed to load templates")?
            .with_form_matches(config.content.form_matches);
        if let Some(path) = &config.content.nicknames_path {
            assembler = assembler.with_nicknames(NicknameBook::load(path)?, config.provider.team_id);
        }
        let assembler = Arc::new(assembler);

        let publisher: Arc<dyn Publisher> = if config.publisher.dry_run {
            Arc::new(DryRunPublisher::new(format!("r/{}", config.publisher.subreddit)))
        } else {
            Arc::new(
                RedditPublisher::new(config.publisher.to_publisher_config())
                    .context("Failed to create Reddit publisher")?,
            )
        };

        tracing::info!(
            ledger = ledger.backend_name(),
            publisher = publisher.name(),
            "Runtime ready"
        );

        let ctx = SchedulerContext::new(ledger, Arc::clone(&provider), assembler, publisher)
            .with_clock(clock)
            .with_timing(config.schedule.timing())
            .with_polling(config.polling.to_polling_config())
            .with_assembly_retry(config.assembly.to_retry_config());

        Ok(Self {
            ctx,
            provider,
            cache: EventCache::new(&config.schedule.event_cache_path),
        })
    }

    /// Tracked event from the cache, fetched again once the cache is stale
    ///
    /// A failed fetch falls back to a stale cache rather than skipping the run.
    pub async fn load_event(&self, config: &Config) -> Result<Option<Event>> {
        let now = self.ctx.clock.now();
        if !self.cache.is_refresh_needed(now, config.schedule.event_refresh()).await {
            if let Some(cached) = self.cache.load().await? {
                tracing::debug!(event_id = %cached.event.id, fetched_at = %cached.fetched_at, "Using cached event");
                return Ok(Some(cached.event));
            }
        }

        match self.provider.fetch_event().await {
            Ok(Some(event)) => {
                if let Err(e) = self.cache.save(&event, now).await {
                    tracing::warn!(error = %e, "Failed to cache event");
                }
                Ok(Some(event))
            }
            Ok(None) => {
                tracing::info!("Provider reports no upcoming event");
                Ok(None)
            }
            Err(e) => match self.cache.load().await.ok().flatten() {
                Some(cached) => {
                    tracing::warn!(error = %e, event_id = %cached.event.id, "Event fetch failed, using stale cache");
                    Ok(Some(cached.event))
                }
                None => Err(e).context("Failed to fetch event"),
            },
        }
    }
}

pub async fn open_ledger(config: &Config) -> Result<IdempotencyLedger> {
    let store = open_ledger_store(&config.ledger)
        .await
        .with_context(|| format!("Failed to open {} ledger", config.ledger.backend))?;
    if !config.ledger.backend.is_durable() {
        tracing::warn!("In-memory ledger: publications will not survive a restart");
    }
    Ok(IdempotencyLedger::new(store))
}
