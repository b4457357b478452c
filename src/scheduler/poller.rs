//! Live status polling
//!
//! [`StatusPoller`] queries the provider for an event's raw status and
//! classifies it. A [`PollingSession`] carries the in-memory counters that
//! drive backoff. It is never persisted: after a restart a fresh session is
//! seeded with the wall-clock time already spent in the polling window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::metrics;
use crate::models::EventId;
use crate::provider::DataProvider;
use crate::scheduler::status::{classify, StatusCategory};

// ============================================================================
// Configuration
// ============================================================================

/// Polling cadence and limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingConfig {
    /// Base interval between polls
    pub interval: Duration,

    /// Consecutive errors before the cadence is throttled
    pub error_threshold: u32,

    /// Interval multiplier once throttled
    pub throttle_factor: u32,

    /// Consecutive pre-start polls before the cadence is throttled
    pub pre_start_threshold: u32,

    /// Total polling time after which a final check is made and polling stops
    pub max_duration: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            error_threshold: 5,
            throttle_factor: 5,
            pre_start_threshold: 30,
            max_duration: Duration::from_secs(4 * 60 * 60),
        }
    }
}

impl PollingConfig {
    /// Set the base interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the maximum polling duration
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    /// Set the throttle thresholds and factor
    pub fn with_throttle(mut self, error_threshold: u32, pre_start_threshold: u32, factor: u32) -> Self {
        self.error_threshold = error_threshold;
        self.pre_start_threshold = pre_start_threshold;
        self.throttle_factor = factor;
        self
    }
}

// ============================================================================
// Session
// ============================================================================

/// In-memory state of one polling run
#[derive(Debug, Clone)]
pub struct PollingSession {
    pub event_id: EventId,
    pub category: StatusCategory,
    pub raw_code: Option<String>,
    pub consecutive_errors: u32,
    pub consecutive_pre_start: u32,
    pub polls: u32,
    started: Instant,
    /// Polling time spent before this session was created
    spent: Duration,
}

impl PollingSession {
    pub fn new(event_id: EventId) -> Self {
        Self {
            event_id,
            category: StatusCategory::Unknown,
            raw_code: None,
            consecutive_errors: 0,
            consecutive_pre_start: 0,
            polls: 0,
            started: Instant::now(),
            spent: Duration::ZERO,
        }
    }

    /// Session resuming a polling window that opened `spent` ago
    pub fn resumed(event_id: EventId, spent: Duration) -> Self {
        Self {
            spent,
            ..Self::new(event_id)
        }
    }

    /// Time spent in the polling window, including time before this session
    pub fn elapsed(&self) -> Duration {
        self.spent + self.started.elapsed()
    }

    /// Record a successful poll
    pub fn record_status(&mut self, raw_code: &str) -> StatusCategory {
        let category = classify(raw_code);
        self.polls += 1;
        self.consecutive_errors = 0;
        self.consecutive_pre_start = if category == StatusCategory::PreStart {
            self.consecutive_pre_start + 1
        } else {
            0
        };
        self.category = category;
        self.raw_code = Some(raw_code.trim().to_ascii_uppercase());
        category
    }

    /// Record a failed poll. The category becomes `Unknown`.
    pub fn record_error(&mut self) -> StatusCategory {
        self.polls += 1;
        self.consecutive_errors += 1;
        self.category = StatusCategory::Unknown;
        self.category
    }

    /// Whether the cadence is currently throttled
    pub fn is_throttled(&self, config: &PollingConfig) -> bool {
        self.consecutive_errors >= config.error_threshold
            || self.consecutive_pre_start >= config.pre_start_threshold
    }

    /// Interval to wait before the next poll
    ///
    /// Non-decreasing across consecutive errors; drops back to the base
    /// interval only after a successful non-pre-start poll.
    pub fn next_interval(&self, config: &PollingConfig) -> Duration {
        if self.is_throttled(config) {
            config.interval.saturating_mul(config.throttle_factor.max(1))
        } else {
            config.interval
        }
    }
}

// ============================================================================
// Poller
// ============================================================================

/// How a polling run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollingOutcome {
    /// A terminal status was observed
    Terminal {
        category: StatusCategory,
        raw_code: String,
    },
    /// Maximum duration elapsed and the final check was not terminal
    TimedOut { last: StatusCategory },
    /// Shutdown was requested
    Cancelled,
}

/// Polls and classifies the provider's status for an event
pub struct StatusPoller {
    provider: Arc<dyn DataProvider>,
    config: PollingConfig,
}

impl StatusPoller {
    pub fn new(provider: Arc<dyn DataProvider>, config: PollingConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// Single classified poll. Errors are logged and reported as `Unknown`.
    pub async fn poll(&self, event_id: EventId) -> StatusCategory {
        let mut session = PollingSession::new(event_id);
        self.poll_once(&mut session).await
    }

    /// Single poll that updates the session counters
    pub async fn poll_once(&self, session: &mut PollingSession) -> StatusCategory {
        match self.provider.fetch_status(session.event_id).await {
            Ok(raw) => {
                let category = session.record_status(&raw);
                if category == StatusCategory::Unknown {
                    tracing::warn!(
                        event_id = %session.event_id,
                        status = %raw,
                        "Unrecognised status code, continuing to poll"
                    );
                } else {
                    tracing::debug!(
                        event_id = %session.event_id,
                        status = %raw,
                        category = %category,
                        polls = session.polls,
                        "Status polled"
                    );
                }
                metrics::record_status_poll(category.as_str(), false);
                category
            }
            Err(e) => {
                let category = session.record_error();
                tracing::warn!(
                    event_id = %session.event_id,
                    error = %e,
                    consecutive_errors = session.consecutive_errors,
                    rate_limited = e.is_rate_limit(),
                    "Status poll failed"
                );
                if session.consecutive_errors == self.config.error_threshold {
                    tracing::warn!(
                        event_id = %session.event_id,
                        factor = self.config.throttle_factor,
                        "Too many consecutive poll errors, throttling cadence"
                    );
                }
                metrics::record_status_poll(category.as_str(), true);
                category
            }
        }
    }

    /// Poll until a terminal status, the maximum duration, or shutdown
    ///
    /// The poll made once `max_duration` has elapsed is the final check; if
    /// it is not terminal the run ends with [`PollingOutcome::TimedOut`].
    pub async fn run_until_terminal(
        &self,
        session: &mut PollingSession,
        shutdown: &mut watch::Receiver<bool>,
    ) -> PollingOutcome {
        loop {
            if *shutdown.borrow() {
                return PollingOutcome::Cancelled;
            }

            let category = self.poll_once(session).await;
            if category.is_terminal() {
                let raw_code = session.raw_code.clone().unwrap_or_default();
                tracing::info!(
                    event_id = %session.event_id,
                    status = %raw_code,
                    category = %category,
                    polls = session.polls,
                    "Terminal status observed"
                );
                return PollingOutcome::Terminal { category, raw_code };
            }

            let elapsed = session.elapsed();
            if elapsed >= self.config.max_duration {
                tracing::warn!(
                    event_id = %session.event_id,
                    last = %category,
                    polls = session.polls,
                    "Maximum polling duration reached without a terminal status"
                );
                return PollingOutcome::TimedOut { last: category };
            }

            if session.consecutive_pre_start == self.config.pre_start_threshold {
                tracing::warn!(
                    event_id = %session.event_id,
                    polls = session.consecutive_pre_start,
                    "Event still not started, throttling cadence"
                );
            }

            let remaining = self.config.max_duration - elapsed;
            let wait = session.next_interval(&self.config).min(remaining);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(event_id = %session.event_id, "Status polling cancelled");
                        return PollingOutcome::Cancelled;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FinalResult, LiveDetail};
    use crate::utils::error::ProviderError;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Script(Mutex<VecDeque<Result<String, ProviderError>>>);

    impl Script {
        fn new(items: Vec<Result<&str, ProviderError>>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                items.into_iter().map(|r| r.map(str::to_string)).collect(),
            )))
        }
    }

    #[async_trait]
    impl DataProvider for Script {
        async fn fetch_event(&self) -> Result<Option<crate::models::Event>, ProviderError> {
            Ok(None)
        }
        async fn fetch_live_detail(&self, _: EventId) -> Result<LiveDetail, ProviderError> {
            Ok(LiveDetail::default())
        }
        async fn fetch_final_data(&self, _: EventId) -> Result<FinalResult, ProviderError> {
            Err(ProviderError::NotYetAvailable("final".into()))
        }
        async fn fetch_status(&self, _: EventId) -> Result<String, ProviderError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("2H".to_string()))
        }
    }

    #[test]
    fn test_session_throttles_after_errors() {
        let config = PollingConfig::default();
        let mut session = PollingSession::new(EventId(1));

        for _ in 0..4 {
            session.record_error();
            assert_eq!(session.next_interval(&config), config.interval);
        }
        session.record_error();
        assert_eq!(session.next_interval(&config), config.interval * 5);

        session.record_status("2H");
        assert_eq!(session.next_interval(&config), config.interval);
    }

    #[test]
    fn test_session_throttles_sustained_pre_start() {
        let config = PollingConfig::default().with_throttle(5, 3, 4);
        let mut session = PollingSession::new(EventId(1));

        session.record_status("NS");
        session.record_status("NS");
        assert!(!session.is_throttled(&config));
        session.record_status("NS");
        assert_eq!(session.next_interval(&config), config.interval * 4);

        session.record_status("1H");
        assert!(!session.is_throttled(&config));
    }

    #[tokio::test]
    async fn test_poll_maps_errors_to_unknown() {
        let provider = Script::new(vec![Err(ProviderError::RateLimited)]);
        let poller = StatusPoller::new(provider, PollingConfig::default());
        assert_eq!(poller.poll(EventId(9)).await, StatusCategory::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_terminal_skips_unknown_codes() {
        let provider = Script::new(vec![Ok("1H"), Ok("XYZ"), Ok("HT"), Ok("AET")]);
        let poller = StatusPoller::new(provider, PollingConfig::default());
        let (_tx, mut rx) = watch::channel(false);
        let mut session = PollingSession::new(EventId(3));

        let outcome = poller.run_until_terminal(&mut session, &mut rx).await;

        assert_eq!(
            outcome,
            PollingOutcome::Terminal {
                category: StatusCategory::FinishedNormal,
                raw_code: "AET".into()
            }
        );
        assert_eq!(session.polls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_terminal_times_out() {
        let provider = Script::new(vec![]);
        let config = PollingConfig::default()
            .with_interval(Duration::from_secs(60))
            .with_max_duration(Duration::from_secs(300));
        let poller = StatusPoller::new(provider, config);
        let (_tx, mut rx) = watch::channel(false);
        let mut session = PollingSession::new(EventId(3));

        let outcome = poller.run_until_terminal(&mut session, &mut rx).await;

        assert_eq!(
            outcome,
            PollingOutcome::TimedOut {
                last: StatusCategory::InPlay
            }
        );
        // polls at 0, 60, 120, 180, 240 and the final check at 300
        assert_eq!(session.polls, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_terminal_cancelled() {
        let provider = Script::new(vec![]);
        let poller = StatusPoller::new(provider, PollingConfig::default());
        let (tx, mut rx) = watch::channel(false);
        let mut session = PollingSession::new(EventId(3));

        let handle = tokio::spawn(async move {
            poller.run_until_terminal(&mut session, &mut rx).await
        });
        tokio::time::sleep(Duration::from_secs(30)).await;
        tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), PollingOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumed_session_only_polls_remaining_window() {
        let provider = Script::new(vec![]);
        let config = PollingConfig::default()
            .with_interval(Duration::from_secs(60))
            .with_max_duration(Duration::from_secs(300));
        let poller = StatusPoller::new(provider, config);
        let (_tx, mut rx) = watch::channel(false);
        let mut session = PollingSession::resumed(EventId(3), Duration::from_secs(200));

        let started = Instant::now();
        let outcome = poller.run_until_terminal(&mut session, &mut rx).await;

        assert!(matches!(outcome, PollingOutcome::TimedOut { .. }));
        assert_eq!(started.elapsed(), Duration::from_secs(100));
        // polls at 200 and 260, final check at 300
        assert_eq!(session.polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_past_window_makes_one_final_check() {
        let provider = Script::new(vec![]);
        let config = PollingConfig::default().with_max_duration(Duration::from_secs(300));
        let poller = StatusPoller::new(provider, config);
        let (_tx, mut rx) = watch::channel(false);
        let mut session = PollingSession::resumed(EventId(3), Duration::from_secs(3600));

        let outcome = poller.run_until_terminal(&mut session, &mut rx).await;

        assert_eq!(
            outcome,
            PollingOutcome::TimedOut {
                last: StatusCategory::InPlay
            }
        );
        assert_eq!(session.polls, 1);
    }

    proptest! {
        #[test]
        fn interval_never_shrinks_across_errors(errors in 1u32..40) {
            let config = PollingConfig::default();
            let mut session = PollingSession::new(EventId(1));
            let mut previous = session.next_interval(&config);
            for _ in 0..errors {
                session.record_error();
                let next = session.next_interval(&config);
                prop_assert!(next >= previous);
                previous = next;
            }
        }
    }
}
