use anyhow::Result;

use matchday::config::Config;
use matchday::metrics;
use matchday::scheduler::{StageTimeCalculator, TargetTime};
use matchday::utils::format_duration;

use super::Runtime;

/// Print stage targets, ledger flags and metrics for the tracked event
pub async fn status(config: Config) -> Result<()> {
    let runtime = Runtime::build(&config).await?;

    let Some(event) = runtime.load_event(&config).await? else {
        println!("No upcoming event to track");
        return Ok(());
    };

    let now = runtime.ctx.clock.now();
    let calculator = StageTimeCalculator::new(runtime.ctx.timing);
    let flags = runtime.ctx.ledger.flags(event.id).await?;

    println!("Tracked event");
    println!("=============");
    println!("  {} ({})", event.label(), event.id);
    println!("  Competition: {}", event.competition.name);
    println!("  Kickoff:     {}", event.start.format("%Y-%m-%d %H:%M UTC"));
    println!("  Ledger:      {}", runtime.ctx.ledger.backend_name());
    println!();

    for stage in matchday::Stage::all() {
        let when = match calculator.target_time(&event, stage) {
            TargetTime::At(target) => format!("{} (in {})", target.format("%Y-%m-%d %H:%M UTC"), format_duration(target - now)),
            TargetTime::Undetermined => {
                let from = calculator.estimated_end(&event);
                format!("on final status, polling from {}", from.format("%Y-%m-%d %H:%M UTC"))
            }
        };
        let published = if flags.get(stage) { "published" } else { "pending" };
        println!("  {:<18} {:<10} {}", stage.thread_name(), published, when);
    }

    if metrics::metrics_initialized() {
        let text = metrics::encode_metrics().map_err(|e| anyhow::anyhow!("{e}"))?;
        if !text.trim().is_empty() {
            println!();
            println!("{text}");
        }
    }

    Ok(())
}
