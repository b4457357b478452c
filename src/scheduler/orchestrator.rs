//! Lifecycle orchestrator
//!
//! Owns the three stage schedulers of one tracked event. Both operating
//! modes go through it:
//!
//! - run-once: the host calls [`LifecycleOrchestrator::tick`] from cron and exits
//! - continuous: [`LifecycleOrchestrator::run`] spawns one task per stage and
//!   joins them, cancelling pending waits and polls on shutdown
//!
//! Tracking a different event means building a new orchestrator.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::task::{AbortHandle, JoinSet};

use super::error::{SchedulerError, SchedulerResult};
use super::stage::{SchedulerContext, StageScheduler, StageState};
use super::status::StatusCategory;
use crate::models::{Event, EventId, Stage};

// ============================================================================
// Reports
// ============================================================================

/// Result of driving one stage
#[derive(Debug)]
pub struct StageReport {
    pub stage: Stage,
    pub state: StageState,
    pub error: Option<SchedulerError>,
}

impl StageReport {
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || matches!(self.state, StageState::Failed { .. })
    }
}

/// Outcome of one tick (or one continuous run) across all stages
#[derive(Debug)]
pub struct TickReport {
    pub event_id: EventId,
    pub stages: Vec<StageReport>,
}

impl TickReport {
    pub fn has_failures(&self) -> bool {
        self.stages.iter().any(StageReport::is_failure)
    }

    pub fn all_done(&self) -> bool {
        self.stages.iter().all(|s| s.state == StageState::Done)
    }

    pub fn state_of(&self, stage: Stage) -> Option<StageState> {
        self.stages.iter().find(|s| s.stage == stage).map(|s| s.state)
    }

    pub fn errors(&self) -> impl Iterator<Item = &SchedulerError> {
        self.stages.iter().filter_map(|s| s.error.as_ref())
    }
}

/// Point-in-time view of a stage for host-side status output
#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub stage: Stage,
    pub state: StageState,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub poll_from: Option<DateTime<Utc>>,
    pub last_status: Option<StatusCategory>,
}

// ============================================================================
// Orchestrator
// ============================================================================

type SharedScheduler = Arc<Mutex<StageScheduler>>;

/// Drives the pre, live and post stages of one event
pub struct LifecycleOrchestrator {
    event: Event,
    schedulers: Vec<SharedScheduler>,
    tasks: JoinSet<StageReport>,
    pending: BTreeMap<(EventId, Stage), AbortHandle>,
    retry_interval: Duration,
}

impl LifecycleOrchestrator {
    /// Build schedulers for every stage of `event`
    pub fn new(event: Event, ctx: SchedulerContext) -> SchedulerResult<Self> {
        if ctx.polling.interval.is_zero() {
            return Err(SchedulerError::invalid_config("polling.interval", "must be greater than zero"));
        }
        if ctx.polling.throttle_factor == 0 {
            return Err(SchedulerError::invalid_config("polling.throttle_factor", "must be at least 1"));
        }

        let schedulers = Stage::all()
            .into_iter()
            .map(|stage| Arc::new(Mutex::new(StageScheduler::new(event.clone(), stage, ctx.clone()))))
            .collect();

        tracing::info!(event_id = %event.id, event = %event.label(), start = %event.start, "Tracking event");

        Ok(Self {
            event,
            schedulers,
            tasks: JoinSet::new(),
            pending: BTreeMap::new(),
            retry_interval: Duration::from_secs(300),
        })
    }

    /// How long a continuous run waits before retrying a recoverable failure
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn event_id(&self) -> EventId {
        self.event.id
    }

    /// Evaluate every stage once and return
    ///
    /// Stages are evaluated concurrently. Failures are reported, never
    /// raised, so one stage cannot stop the others.
    pub async fn tick(&self) -> TickReport {
        let stages = join_all(self.schedulers.iter().map(|scheduler| async move {
            let mut scheduler = scheduler.lock().await;
            let stage = scheduler.stage();
            match scheduler.tick().await {
                Ok(state) => StageReport {
                    stage,
                    state,
                    error: None,
                },
                Err(error) => {
                    log_stage_error(self.event.id, &error);
                    StageReport {
                        stage,
                        state: scheduler.state(),
                        error: Some(error),
                    }
                }
            }
        }))
        .await;

        let report = TickReport {
            event_id: self.event.id,
            stages,
        };
        tracing::debug!(
            event_id = %self.event.id,
            done = report.all_done(),
            failures = report.has_failures(),
            "Tick complete"
        );
        report
    }

    /// Current state of every stage
    pub async fn snapshot(&self) -> Vec<StageSnapshot> {
        let mut out = Vec::with_capacity(self.schedulers.len());
        for scheduler in &self.schedulers {
            let scheduler = scheduler.lock().await;
            out.push(StageSnapshot {
                stage: scheduler.stage(),
                state: scheduler.state(),
                scheduled_time: scheduler.scheduled_time(),
                poll_from: scheduler.poll_from(),
                last_status: scheduler.last_status(),
            });
        }
        out
    }

    /// Stages with a task still running
    pub fn pending_tasks(&self) -> Vec<(EventId, Stage)> {
        self.pending
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(key, _)| *key)
            .collect()
    }

    /// Spawn one task per stage and wait for all of them
    ///
    /// Returns when every stage task has ended. Signalling `shutdown`
    /// cancels pending timers and polls; a publish already underway is
    /// allowed to finish and be recorded. A stage task that panics is
    /// reported as [`SchedulerError::TaskFailed`]; release builds abort on
    /// panic instead.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> TickReport {
        let (stop_tx, stop_rx) = watch::channel(false);

        for scheduler in &self.schedulers {
            let stage = scheduler.lock().await.stage();
            let key = (self.event.id, stage);
            if self.pending.get(&key).is_some_and(|h| !h.is_finished()) {
                continue;
            }
            let handle = self
                .tasks
                .spawn(drive_stage(Arc::clone(scheduler), stop_rx.clone(), self.retry_interval));
            self.pending.insert(key, handle);
        }

        tracing::info!(event_id = %self.event.id, tasks = self.pending.len(), "Stage tasks started");

        let mut stages = Vec::new();
        let mut stopping = false;
        loop {
            tokio::select! {
                joined = self.tasks.join_next() => {
                    match joined {
                        Some(Ok(report)) => stages.push(report),
                        Some(Err(e)) => {
                            tracing::error!(
                                event_id = %self.event.id,
                                error = %e,
                                panicked = e.is_panic(),
                                "Stage task ended without a report"
                            );
                        }
                        None => break,
                    }
                }
                changed = shutdown.changed(), if !stopping => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(
                            event_id = %self.event.id,
                            pending = ?self.pending_tasks(),
                            "Shutdown requested, cancelling stage tasks"
                        );
                        stopping = true;
                        let _ = stop_tx.send(true);
                    }
                }
            }
        }

        // tasks that ended without a report panicked or were aborted
        for (event_id, stage) in std::mem::take(&mut self.pending).into_keys() {
            if stages.iter().any(|s| s.stage == stage) {
                continue;
            }
            let error = SchedulerError::TaskFailed {
                stage,
                reason: "stage task ended without a report".to_string(),
            };
            log_stage_error(event_id, &error);
            stages.push(StageReport {
                stage,
                state: StageState::Failed { recoverable: true },
                error: Some(error),
            });
        }
        stages.sort_by_key(|s| s.stage);
        TickReport {
            event_id: self.event.id,
            stages,
        }
    }
}

/// Run one stage to completion, retrying recoverable failures
async fn drive_stage(
    scheduler: SharedScheduler,
    shutdown: watch::Receiver<bool>,
    retry_interval: Duration,
) -> StageReport {
    let mut scheduler = scheduler.lock().await;
    let stage = scheduler.stage();
    let event_id = scheduler.event().id;

    loop {
        let (state, error) = match scheduler.run(shutdown.clone()).await {
            Ok(state) => (state, None),
            Err(error) => {
                log_stage_error(event_id, &error);
                (scheduler.state(), Some(error))
            }
        };

        let retry = state == StageState::Failed { recoverable: true } && !*shutdown.borrow();
        if !retry {
            return StageReport { stage, state, error };
        }

        tracing::info!(
            event_id = %event_id,
            stage = %stage,
            retry_secs = retry_interval.as_secs(),
            "Stage will be retried"
        );
        let mut shutdown = shutdown.clone();
        let resumed = tokio::select! {
            _ = tokio::time::sleep(retry_interval) => true,
            changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
        };
        if !resumed {
            return StageReport { stage, state, error };
        }
    }
}

fn log_stage_error(event_id: EventId, error: &SchedulerError) {
    match error {
        SchedulerError::Ledger { .. } | SchedulerError::RecordAfterPublish { .. } => {
            tracing::error!(event_id = %event_id, stage = ?error.stage(), error = %error, "Ledger failure");
        }
        _ if error.is_recoverable() => {
            tracing::warn!(event_id = %event_id, stage = ?error.stage(), error = %error, "Stage failed, will retry");
        }
        _ => {
            tracing::error!(event_id = %event_id, stage = ?error.stage(), error = %error, "Stage failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Completeness, Content, ContentAssembler, ContentRequest};
    use crate::models::{Competition, FinalResult, LiveDetail, Team, Venue};
    use crate::provider::DataProvider;
    use crate::publisher::{PublishReceipt, Publisher};
    use crate::storage::IdempotencyLedger;
    use crate::utils::clock::ManualClock;
    use crate::utils::error::{AssemblyError, ProviderError, PublishError};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn kickoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 4, 19, 0, 0).unwrap()
    }

    fn event() -> Event {
        Event {
            id: EventId(77),
            start: kickoff(),
            home: Team {
                id: 1,
                name: "Home".into(),
            },
            away: Team {
                id: 2,
                name: "Away".into(),
            },
            venue: Venue::default(),
            competition: Competition::default(),
            status_code: None,
        }
    }

    struct Finished;

    #[async_trait]
    impl DataProvider for Finished {
        async fn fetch_event(&self) -> Result<Option<Event>, ProviderError> {
            Ok(Some(event()))
        }
        async fn fetch_live_detail(&self, _: EventId) -> Result<LiveDetail, ProviderError> {
            Ok(LiveDetail::default())
        }
        async fn fetch_final_data(&self, _: EventId) -> Result<FinalResult, ProviderError> {
            Err(ProviderError::NotYetAvailable("final".into()))
        }
        async fn fetch_status(&self, _: EventId) -> Result<String, ProviderError> {
            Ok("FT".into())
        }
    }

    struct Plain;

    #[async_trait]
    impl ContentAssembler for Plain {
        async fn assemble(&self, request: &ContentRequest) -> Result<Content, AssemblyError> {
            Ok(Content::new(request.stage.as_str(), "body", Completeness::Complete))
        }
        fn fallback(&self, request: &ContentRequest) -> Content {
            Content::new(request.stage.as_str(), "", Completeness::Degraded)
        }
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[async_trait]
    impl Publisher for Counter {
        async fn publish(&self, _: &Content) -> Result<PublishReceipt, PublishError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(PublishReceipt::default())
        }
        fn name(&self) -> &'static str {
            "counter"
        }
    }

    fn context(clock: &ManualClock, publisher: Arc<Counter>) -> SchedulerContext {
        SchedulerContext::new(
            Arc::new(IdempotencyLedger::in_memory()),
            Arc::new(Finished),
            Arc::new(Plain),
            publisher,
        )
        .with_clock(Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn test_tick_reports_each_stage() {
        let clock = ManualClock::new(kickoff() - chrono::Duration::hours(1));
        let publisher = Arc::new(Counter::default());
        let orchestrator = LifecycleOrchestrator::new(event(), context(&clock, publisher.clone())).unwrap();

        let report = orchestrator.tick().await;
        assert_eq!(report.state_of(Stage::PreEvent), Some(StageState::Done));
        assert_eq!(report.state_of(Stage::LiveEvent), Some(StageState::Waiting));
        assert_eq!(report.state_of(Stage::PostEvent), Some(StageState::Waiting));
        assert!(!report.has_failures());
        assert_eq!(publisher.0.load(Ordering::SeqCst), 1);

        clock.set(kickoff() + chrono::Duration::hours(3));
        let report = orchestrator.tick().await;
        assert!(report.all_done());
        assert_eq!(publisher.0.load(Ordering::SeqCst), 3);

        let snapshot = orchestrator.snapshot().await;
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[2].last_status, Some(StatusCategory::FinishedNormal));
    }

    struct Panicking;

    #[async_trait]
    impl Publisher for Panicking {
        async fn publish(&self, _: &Content) -> Result<PublishReceipt, PublishError> {
            panic!("publisher bug");
        }
        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn test_run_reports_panicked_stage_tasks() {
        let clock = ManualClock::new(kickoff() + chrono::Duration::hours(3));
        let ctx = SchedulerContext::new(
            Arc::new(IdempotencyLedger::in_memory()),
            Arc::new(Finished),
            Arc::new(Plain),
            Arc::new(Panicking),
        )
        .with_clock(Arc::new(clock));
        let mut orchestrator = LifecycleOrchestrator::new(event(), ctx).unwrap();
        let (_tx, rx) = watch::channel(false);

        let report = orchestrator.run(rx).await;

        assert_eq!(report.stages.len(), 3);
        assert!(report.has_failures());
        assert!(report
            .errors()
            .all(|e| matches!(e, SchedulerError::TaskFailed { .. })));
        assert!(orchestrator.pending_tasks().is_empty());
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let clock = ManualClock::new(kickoff());
        let mut ctx = context(&clock, Arc::new(Counter::default()));
        ctx.polling.interval = Duration::ZERO;
        assert!(matches!(
            LifecycleOrchestrator::new(event(), ctx),
            Err(SchedulerError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_cancels_pending_waits_on_shutdown() {
        let clock = ManualClock::new(kickoff() - chrono::Duration::days(3));
        let publisher = Arc::new(Counter::default());
        let mut orchestrator = LifecycleOrchestrator::new(event(), context(&clock, publisher.clone())).unwrap();
        let (tx, rx) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(true).unwrap();
        });

        let report = orchestrator.run(rx).await;
        stopper.await.unwrap();

        assert_eq!(report.stages.len(), 3);
        assert!(report.stages.iter().all(|s| s.state == StageState::Waiting));
        assert!(orchestrator.pending_tasks().is_empty());
        assert_eq!(publisher.0.load(Ordering::SeqCst), 0);
    }
}
