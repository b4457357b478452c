//! Per-stage state machine
//!
//! One [`StageScheduler`] drives one (event, stage) pair through
//!
//! ```text
//! Idle -> Waiting -> Ready -> Assembling -> Publishing -> Done
//!                                 \              \
//!                                  +--------------+--> Failed { recoverable }
//! ```
//!
//! The ledger is consulted before any timing or polling logic, so a stage
//! that is already recorded goes straight to `Done`. Publication is recorded
//! only after the publisher confirmed success.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::error::{SchedulerError, SchedulerResult};
use super::guard::{ReadinessGuard, TerminalStatusGuard, TimeGuard};
use super::poller::{PollingConfig, PollingOutcome, PollingSession, StatusPoller};
use super::status::StatusCategory;
use super::timing::{StageTimeCalculator, TargetTime, TimingConfig};
use crate::content::{Content, ContentAssembler, ContentRequest, TerminalStatus};
use crate::metrics;
use crate::models::{Event, Stage};
use crate::provider::DataProvider;
use crate::publisher::Publisher;
use crate::storage::IdempotencyLedger;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::error::AssemblyError;
use crate::utils::retry::RetryConfig;

/// Longest single sleep while waiting for a wall-clock target
const MAX_SLEEP: Duration = Duration::from_secs(3600);

// ============================================================================
// State
// ============================================================================

/// Where a stage is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Idle,
    Waiting,
    Ready,
    Assembling,
    Publishing,
    Done,
    /// Recoverable failures return to `Idle` on the next tick
    Failed { recoverable: bool },
}

impl StageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Ready => "ready",
            Self::Assembling => "assembling",
            Self::Publishing => "publishing",
            Self::Done => "done",
            Self::Failed { recoverable: true } => "failed(recoverable)",
            Self::Failed { recoverable: false } => "failed",
        }
    }

    /// No further progress is possible in this process
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { recoverable: false })
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Shared collaborators
// ============================================================================

/// Collaborators and tuning shared by the schedulers of one event
#[derive(Clone)]
pub struct SchedulerContext {
    pub ledger: Arc<IdempotencyLedger>,
    pub provider: Arc<dyn DataProvider>,
    pub assembler: Arc<dyn ContentAssembler>,
    pub publisher: Arc<dyn Publisher>,
    pub clock: Arc<dyn Clock>,
    pub timing: TimingConfig,
    pub polling: PollingConfig,
    /// Attempts and backoff for content assembly
    pub assembly_retry: RetryConfig,
}

impl SchedulerContext {
    pub fn new(
        ledger: Arc<IdempotencyLedger>,
        provider: Arc<dyn DataProvider>,
        assembler: Arc<dyn ContentAssembler>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            ledger,
            provider,
            assembler,
            publisher,
            clock: Arc::new(SystemClock),
            timing: TimingConfig::default(),
            polling: PollingConfig::default(),
            assembly_retry: RetryConfig::linear(2, Duration::from_secs(10)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    pub fn with_assembly_retry(mut self, retry: RetryConfig) -> Self {
        self.assembly_retry = retry;
        self
    }
}

// ============================================================================
// Stage Scheduler
// ============================================================================

/// Drives one stage of one event to publication
pub struct StageScheduler {
    event: Event,
    stage: Stage,
    guard: Box<dyn ReadinessGuard>,
    ctx: SchedulerContext,
    poller: StatusPoller,
    state: StageState,
    session: Option<PollingSession>,
    terminal: Option<TerminalStatus>,
    polling_exhausted: bool,
}

impl StageScheduler {
    /// Scheduler with the default guard for `stage`: a wall-clock target for
    /// the pre and live stages, a terminal status for the post stage
    pub fn new(event: Event, stage: Stage, ctx: SchedulerContext) -> Self {
        let calculator = StageTimeCalculator::new(ctx.timing);
        let guard: Box<dyn ReadinessGuard> = match calculator.target_time(&event, stage) {
            TargetTime::At(target) => Box::new(TimeGuard::new(target)),
            TargetTime::Undetermined => Box::new(TerminalStatusGuard::new(calculator.estimated_end(&event))),
        };
        Self::with_guard(event, stage, guard, ctx)
    }

    /// Scheduler with an explicit readiness guard
    pub fn with_guard(event: Event, stage: Stage, guard: Box<dyn ReadinessGuard>, ctx: SchedulerContext) -> Self {
        let poller = StatusPoller::new(Arc::clone(&ctx.provider), ctx.polling.clone());
        Self {
            event,
            stage,
            guard,
            ctx,
            poller,
            state: StageState::Idle,
            session: None,
            terminal: None,
            polling_exhausted: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == StageState::Done
    }

    /// Wall-clock publication target; `None` for status-driven stages
    pub fn scheduled_time(&self) -> Option<DateTime<Utc>> {
        self.guard.scheduled_time()
    }

    /// When status polling starts, for status-driven stages
    pub fn poll_from(&self) -> Option<DateTime<Utc>> {
        self.guard.poll_from()
    }

    /// Status observed by the most recent poll
    pub fn last_status(&self) -> Option<StatusCategory> {
        self.session.as_ref().map(|s| s.category)
    }

    fn transition(&mut self, to: StageState) {
        if self.state != to {
            tracing::debug!(
                event_id = %self.event.id,
                stage = %self.stage,
                from = %self.state,
                to = %to,
                "Stage transition"
            );
            self.state = to;
        }
    }

    /// Evaluate the stage once without waiting on timers
    ///
    /// A stage whose guard is satisfied is assembled, published and
    /// recorded within this call. The post stage makes at most one status
    /// poll per tick.
    pub async fn tick(&mut self) -> SchedulerResult<StageState> {
        if !self.refresh().await? {
            return Ok(self.state);
        }

        if self.state == StageState::Waiting {
            let now = self.ctx.clock.now();
            if !self.evaluate_guard(now).await {
                return Ok(self.state);
            }
            self.transition(StageState::Ready);
        }

        self.complete().await
    }

    /// Drive the stage until it is done, fails or `shutdown` is signalled
    ///
    /// Waiting is a cancellable sleep towards the target time; the post
    /// stage runs the status poller. Shutdown never interrupts a publish and
    /// the ledger write that follows it.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> SchedulerResult<StageState> {
        if !self.refresh().await? {
            return Ok(self.state);
        }

        loop {
            if *shutdown.borrow() {
                return Ok(self.state);
            }

            let now = self.ctx.clock.now();
            if self.guard.needs_polling() {
                if let Some(from) = self.guard.poll_from().filter(|from| now < *from) {
                    tracing::info!(
                        event_id = %self.event.id,
                        stage = %self.stage,
                        poll_from = %from,
                        "Waiting for the event to end before polling status"
                    );
                    if !sleep_or_shutdown(wait_until(now, from), &mut shutdown).await {
                        return Ok(self.state);
                    }
                    continue;
                }

                if self.polling_exhausted {
                    return Ok(self.state);
                }

                let spent = self.polling_elapsed(now);
                let event_id = self.event.id;
                let session = self
                    .session
                    .get_or_insert_with(|| PollingSession::resumed(event_id, spent));
                match self.poller.run_until_terminal(session, &mut shutdown).await {
                    PollingOutcome::Terminal { category, raw_code } => {
                        self.terminal = Some(TerminalStatus::new(category, raw_code));
                        self.transition(StageState::Ready);
                        return self.complete().await;
                    }
                    PollingOutcome::TimedOut { last } => {
                        self.polling_exhausted = true;
                        tracing::warn!(
                            event_id = %self.event.id,
                            stage = %self.stage,
                            last = %last,
                            "Polling gave up; stage left unpublished for a later run"
                        );
                        return Ok(self.state);
                    }
                    PollingOutcome::Cancelled => return Ok(self.state),
                }
            }

            if self.guard.is_ready(now, None) {
                self.transition(StageState::Ready);
                return self.complete().await;
            }

            let wait = match self.guard.scheduled_time() {
                Some(target) => wait_until(now, target),
                None => MAX_SLEEP,
            };
            tracing::debug!(
                event_id = %self.event.id,
                stage = %self.stage,
                wait_secs = wait.as_secs(),
                "Sleeping until stage target"
            );
            if !sleep_or_shutdown(wait, &mut shutdown).await {
                return Ok(self.state);
            }
        }
    }

    /// Settle `Idle` and recoverable failures against the ledger.
    /// Returns false when there is nothing left to do.
    async fn refresh(&mut self) -> SchedulerResult<bool> {
        match self.state {
            StageState::Done => return Ok(false),
            StageState::Failed { recoverable: false } => {
                tracing::debug!(
                    event_id = %self.event.id,
                    stage = %self.stage,
                    "Stage failed permanently in this run, skipping"
                );
                return Ok(false);
            }
            StageState::Failed { recoverable: true } => {
                tracing::info!(event_id = %self.event.id, stage = %self.stage, "Retrying failed stage");
                self.transition(StageState::Idle);
            }
            _ => {}
        }

        if self.state == StageState::Idle {
            match self.ctx.ledger.is_published(self.event.id, self.stage).await {
                Ok(true) => {
                    tracing::debug!(event_id = %self.event.id, stage = %self.stage, "Stage already published");
                    self.transition(StageState::Done);
                    return Ok(false);
                }
                Ok(false) => self.transition(StageState::Waiting),
                Err(source) => {
                    self.transition(StageState::Failed { recoverable: true });
                    return Err(SchedulerError::ledger(self.event.id, self.stage, source));
                }
            }
        }

        Ok(true)
    }

    /// One non-blocking readiness check
    async fn evaluate_guard(&mut self, now: DateTime<Utc>) -> bool {
        if !self.guard.needs_polling() {
            let ready = self.guard.is_ready(now, None);
            if !ready {
                tracing::debug!(
                    event_id = %self.event.id,
                    stage = %self.stage,
                    target = ?self.guard.scheduled_time(),
                    "Stage target not reached"
                );
            }
            return ready;
        }

        if let Some(from) = self.guard.poll_from().filter(|from| now < *from) {
            tracing::debug!(
                event_id = %self.event.id,
                stage = %self.stage,
                poll_from = %from,
                "Too early to poll status"
            );
            return false;
        }

        if self.polling_exhausted {
            tracing::warn!(
                event_id = %self.event.id,
                stage = %self.stage,
                "Polling window exhausted; waiting for an external re-run"
            );
            return false;
        }

        // the poll made once the window has closed is the final check
        let spent = self.polling_elapsed(now);
        let window_closed = spent >= self.poller.config().max_duration;
        let event_id = self.event.id;
        let session = self
            .session
            .get_or_insert_with(|| PollingSession::resumed(event_id, spent));
        let category = self.poller.poll_once(session).await;

        if category.is_terminal() {
            let raw_code = session.raw_code.clone().unwrap_or_default();
            tracing::info!(
                event_id = %self.event.id,
                stage = %self.stage,
                status = %raw_code,
                category = %category,
                "Terminal status observed"
            );
            self.terminal = Some(TerminalStatus::new(category, raw_code));
        } else if window_closed {
            self.polling_exhausted = true;
            tracing::warn!(
                event_id = %self.event.id,
                stage = %self.stage,
                last = %category,
                polls = session.polls,
                polling_secs = spent.as_secs(),
                "Maximum polling duration reached without a terminal status"
            );
        }

        self.guard.is_ready(now, Some(category))
    }

    /// Wall-clock time since the polling window opened
    fn polling_elapsed(&self, now: DateTime<Utc>) -> Duration {
        self.guard
            .poll_from()
            .and_then(|from| (now - from).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Ready -> Assembling -> Publishing -> Done, under the event's ledger claim
    async fn complete(&mut self) -> SchedulerResult<StageState> {
        let ledger = Arc::clone(&self.ctx.ledger);
        let _claim = ledger.claim(self.event.id).await;

        match ledger.is_published(self.event.id, self.stage).await {
            Ok(true) => {
                tracing::info!(
                    event_id = %self.event.id,
                    stage = %self.stage,
                    "Stage was published by another actor"
                );
                self.transition(StageState::Done);
                return Ok(self.state);
            }
            Ok(false) => {}
            Err(source) => {
                self.transition(StageState::Failed { recoverable: true });
                return Err(SchedulerError::ledger(self.event.id, self.stage, source));
            }
        }

        self.transition(StageState::Assembling);
        let content = match self.assemble().await {
            Ok(content) => content,
            Err(source) => {
                tracing::error!(
                    event_id = %self.event.id,
                    stage = %self.stage,
                    error = %source,
                    "Content assembly failed"
                );
                self.transition(StageState::Failed { recoverable: false });
                return Err(SchedulerError::AssemblyFailed {
                    stage: self.stage,
                    source,
                });
            }
        };

        self.transition(StageState::Publishing);
        let receipt = match self.ctx.publisher.publish(&content).await {
            Ok(receipt) => receipt,
            Err(source) => {
                metrics::record_publish_failure(self.stage);
                let err = SchedulerError::PublishFailed {
                    stage: self.stage,
                    source,
                };
                let recoverable = err.is_recoverable();
                tracing::warn!(
                    event_id = %self.event.id,
                    stage = %self.stage,
                    publisher = self.ctx.publisher.name(),
                    recoverable,
                    error = %err,
                    "Publish failed, stage left unpublished"
                );
                self.transition(StageState::Failed { recoverable });
                return Err(err);
            }
        };

        let degraded = !content.is_complete();
        metrics::record_publication(self.stage, degraded);

        match ledger.mark_published(self.event.id, self.stage).await {
            Ok(_) => {
                tracing::info!(
                    event_id = %self.event.id,
                    stage = %self.stage,
                    title = %content.title,
                    url = ?receipt.url,
                    dry_run = receipt.dry_run,
                    degraded,
                    "Stage published"
                );
                self.transition(StageState::Done);
                Ok(self.state)
            }
            Err(source) => {
                tracing::error!(
                    event_id = %self.event.id,
                    stage = %self.stage,
                    url = ?receipt.url,
                    error = %source,
                    "Published but failed to record publication; a later run may post a duplicate"
                );
                self.transition(StageState::Failed { recoverable: false });
                Err(SchedulerError::record_after_publish(self.event.id, self.stage, source))
            }
        }
    }

    /// Assemble with the retry budget, keeping the most complete result
    ///
    /// Partial content and recoverable errors are retried. When the budget
    /// runs out the best partial content, or the assembler's fallback, is
    /// used instead of dropping the stage.
    async fn assemble(&self) -> Result<Content, AssemblyError> {
        let mut request = ContentRequest::new(self.event.clone(), self.stage);
        if let Some(terminal) = &self.terminal {
            request = request.with_terminal(terminal.clone());
        }

        let retry = &self.ctx.assembly_retry;
        let attempts = retry.max_attempts();
        let mut best: Option<Content> = None;

        for attempt in 1..=attempts {
            match self.ctx.assembler.assemble(&request).await {
                Ok(content) if content.is_complete() => return Ok(content),
                Ok(content) => {
                    tracing::warn!(
                        event_id = %self.event.id,
                        stage = %self.stage,
                        attempt,
                        completeness = ?content.completeness,
                        "Content incomplete"
                    );
                    if best.as_ref().map_or(true, |b| content.completeness >= b.completeness) {
                        best = Some(content);
                    }
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(
                        event_id = %self.event.id,
                        stage = %self.stage,
                        attempt,
                        error = %e,
                        "Content assembly failed"
                    );
                }
                Err(e) => return Err(e),
            }

            if attempt < attempts {
                let delay = retry.delay_for(attempt);
                tracing::info!(
                    event_id = %self.event.id,
                    stage = %self.stage,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "Retrying content assembly"
                );
                metrics::record_assembly_retry(self.stage);
                tokio::time::sleep(delay).await;
            }
        }

        Ok(best.unwrap_or_else(|| {
            tracing::warn!(
                event_id = %self.event.id,
                stage = %self.stage,
                attempts,
                "Assembly budget exhausted, publishing fallback content"
            );
            self.ctx.assembler.fallback(&request)
        }))
    }
}

fn wait_until(now: DateTime<Utc>, target: DateTime<Utc>) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO).min(MAX_SLEEP)
}

/// Returns false if shutdown was signalled first
async fn sleep_or_shutdown(wait: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(wait) => true,
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}
