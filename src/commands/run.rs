use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;

use matchday::config::Config;
use matchday::scheduler::LifecycleOrchestrator;

use super::Runtime;

/// Run continuously until Ctrl-C
///
/// The tracked event is re-fetched every `event_refresh_hours`; each fetch
/// builds a fresh orchestrator.
pub async fn run(config: Config) -> Result<()> {
    let runtime = Runtime::build(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let refresh = config
        .schedule
        .event_refresh()
        .to_std()
        .unwrap_or(Duration::from_secs(24 * 60 * 60));

    while !*shutdown_rx.borrow() {
        let event = match runtime.load_event(&config).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                wait_or_shutdown(refresh, shutdown_rx.clone()).await;
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not load event, retrying later");
                wait_or_shutdown(config.schedule.tick_interval(), shutdown_rx.clone()).await;
                continue;
            }
        };

        let mut orchestrator = LifecycleOrchestrator::new(event, runtime.ctx.clone())?
            .with_retry_interval(config.schedule.tick_interval());

        let (stop_tx, stop_rx) = watch::channel(false);
        let run = orchestrator.run(stop_rx);
        tokio::pin!(run);

        let finished = tokio::select! {
            report = &mut run => Some(report),
            _ = wait_or_shutdown(refresh, shutdown_rx.clone()) => None,
        };
        let refreshed = finished.is_none();
        let report = match finished {
            Some(report) => report,
            None => {
                let _ = stop_tx.send(true);
                run.await
            }
        };

        for stage in &report.stages {
            tracing::info!(
                event_id = %report.event_id,
                stage = %stage.stage,
                state = %stage.state,
                "Stage run ended"
            );
        }

        if !refreshed {
            wait_or_shutdown(refresh, shutdown_rx.clone()).await;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn wait_or_shutdown(wait: Duration, mut shutdown: watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(wait) => {}
        _ = shutdown.wait_for(|stop| *stop) => {}
    }
}
