use anyhow::Result;

use matchday::config::Config;
use matchday::scheduler::{LifecycleOrchestrator, StageState};

use super::Runtime;

/// Exit code when at least one stage failed this run
pub const EXIT_STAGE_FAILED: i32 = 2;

/// Evaluate every stage once and exit
///
/// Returns the process exit code: 0 when no stage failed, otherwise
/// [`EXIT_STAGE_FAILED`]. The next invocation retries failed stages.
pub async fn tick(config: Config) -> Result<i32> {
    let runtime = Runtime::build(&config).await?;

    let Some(event) = runtime.load_event(&config).await? else {
        println!("No upcoming event to track");
        return Ok(0);
    };

    let orchestrator = LifecycleOrchestrator::new(event, runtime.ctx.clone())?;
    let report = orchestrator.tick().await;

    println!("{} ({})", orchestrator.event().label(), report.event_id);
    for stage in &report.stages {
        let marker = match stage.state {
            StageState::Done => "✓",
            StageState::Failed { .. } => "✗",
            _ => "…",
        };
        println!("  {marker} {:<12} {}", stage.stage.thread_name(), stage.state);
        if let Some(error) = &stage.error {
            println!("      {error}");
        }
    }

    if report.has_failures() {
        Ok(EXIT_STAGE_FAILED)
    } else {
        Ok(0)
    }
}
