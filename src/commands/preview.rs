use anyhow::{Context, Result};

use matchday::config::Config;
use matchday::content::{ContentAssembler, ContentRequest, TerminalStatus};
use matchday::models::{Event, Stage};
use matchday::scheduler::status::classify;

use super::Runtime;

/// Post-event previews need a terminal status; `status` defaults to "FT"
fn preview_request(event: Event, stage: Stage, status: Option<&str>) -> Result<ContentRequest> {
    let request = ContentRequest::new(event, stage);
    if stage != Stage::PostEvent {
        return Ok(request);
    }

    let code = status.unwrap_or("FT").trim().to_ascii_uppercase();
    let category = classify(&code);
    if !category.is_terminal() {
        anyhow::bail!("status {code} is not terminal ({category:?}); use e.g. FT, AET, PEN or ABD");
    }
    Ok(request.with_terminal(TerminalStatus::new(category, code)))
}

/// Assemble a stage's thread for the tracked event and print it without publishing
///
/// Assembly errors print the fallback the scheduler would publish instead.
pub async fn preview(config: Config, stage: &str, status: Option<&str>) -> Result<()> {
    let stage = Stage::parse(stage).with_context(|| format!("Unknown stage: {stage}"))?;
    let runtime = Runtime::build(&config).await?;

    let Some(event) = runtime.load_event(&config).await? else {
        println!("No upcoming event to preview");
        return Ok(());
    };

    let request = preview_request(event, stage, status)?;
    let assembler = &runtime.ctx.assembler;
    let content = match assembler.assemble(&request).await {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(event_id = %request.event.id, stage = %stage, error = %e, "Assembly failed, previewing fallback");
            assembler.fallback(&request)
        }
    };

    tracing::info!(event_id = %request.event.id, stage = %stage, completeness = ?content.completeness, "Preview assembled");
    println!("{}", content.title);
    println!("{}", "=".repeat(content.title.chars().count().min(80)));
    println!();
    println!("{}", content.body);
    Ok(())
}
