use anyhow::{Context, Result};

use matchday::config::Config;
use matchday::models::{EventId, Stage};

use super::open_ledger;

/// Record a stage as published without publishing anything
pub async fn mark(config: Config, event_id: EventId, stage: &str) -> Result<()> {
    let stage = Stage::parse(stage).with_context(|| format!("Unknown stage: {stage}"))?;
    let ledger = open_ledger(&config).await?;

    let newly_set = ledger.mark_published(event_id, stage).await?;
    tracing::info!(event_id = %event_id, stage = %stage, newly_set, "Stage marked by operator");

    if newly_set {
        println!("Marked {} of event {} as published", stage.thread_name(), event_id);
    } else {
        println!("{} of event {} was already published", stage.thread_name(), event_id);
    }
    Ok(())
}
