//! Common test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use matchday::content::{Completeness, Content, ContentAssembler, ContentRequest};
use matchday::models::{Competition, Event, EventId, FinalResult, LiveDetail, Team, Venue};
use matchday::provider::DataProvider;
use matchday::publisher::{PublishReceipt, Publisher};
use matchday::scheduler::SchedulerContext;
use matchday::storage::{IdempotencyLedger, LedgerStore, MemoryLedgerStore};
use matchday::utils::clock::ManualClock;
use matchday::utils::error::{AssemblyError, ProviderError, PublishError};

pub const EVENT_ID: EventId = EventId(1_208_021);

/// Kickoff of the sample fixture
pub fn kickoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 4, 19, 0, 0).unwrap()
}

/// Create a test event with default values
pub fn sample_event() -> Event {
    Event {
        id: EVENT_ID,
        start: kickoff(),
        home: Team {
            id: 119,
            name: "Internacional".to_string(),
        },
        away: Team {
            id: 121,
            name: "Palmeiras".to_string(),
        },
        venue: Venue {
            name: Some("Estádio Beira-Rio".to_string()),
            city: Some("Porto Alegre".to_string()),
        },
        competition: Competition {
            id: Some(71),
            name: "Serie A".to_string(),
            round: Some("Regular Season - 7".to_string()),
            season: Some(2025),
        },
        status_code: Some("NS".to_string()),
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Provider that answers status polls from a script; the last entry repeats
pub struct ScriptedProvider {
    statuses: Mutex<VecDeque<Result<String, ProviderError>>>,
    status_calls: AtomicUsize,
    final_calls: AtomicUsize,
    malformed_final_data: bool,
}

impl ScriptedProvider {
    pub fn new(statuses: Vec<&str>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into_iter().map(|s| Ok(s.to_string())).collect()),
            status_calls: AtomicUsize::new(0),
            final_calls: AtomicUsize::new(0),
            malformed_final_data: false,
        }
    }

    /// Final data requests fail with an undecodable body
    pub fn with_malformed_final_data(mut self) -> Self {
        self.malformed_final_data = true;
        self
    }

    /// `count` copies of `code` followed by `last`
    pub fn repeated(code: &str, count: usize, last: &str) -> Self {
        let mut statuses = vec![code; count];
        statuses.push(last);
        Self::new(statuses)
    }

    pub fn push_error(&self, error: ProviderError) {
        self.statuses.lock().unwrap().push_front(Err(error));
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn final_calls(&self) -> usize {
        self.final_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    async fn fetch_event(&self) -> Result<Option<Event>, ProviderError> {
        Ok(Some(sample_event()))
    }

    async fn fetch_live_detail(&self, _: EventId) -> Result<LiveDetail, ProviderError> {
        Ok(LiveDetail::default())
    }

    async fn fetch_final_data(&self, _: EventId) -> Result<FinalResult, ProviderError> {
        self.final_calls.fetch_add(1, Ordering::SeqCst);
        if self.malformed_final_data {
            return Err(ProviderError::InvalidResponse("truncated body".to_string()));
        }
        Err(ProviderError::NotYetAvailable("final data".to_string()))
    }

    async fn fetch_status(&self, _: EventId) -> Result<String, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap_or_else(|| Ok("NS".to_string()))
        } else {
            match statuses.front() {
                Some(Ok(code)) => Ok(code.clone()),
                _ => Ok("NS".to_string()),
            }
        }
    }
}

// ============================================================================
// Assembler
// ============================================================================

/// Assembler driven by a script of outcomes; complete content once the script runs out
#[derive(Default)]
pub struct ScriptedAssembler {
    script: Mutex<VecDeque<Result<Completeness, AssemblyError>>>,
    requests: Mutex<Vec<ContentRequest>>,
}

impl ScriptedAssembler {
    pub fn new(script: Vec<Result<Completeness, AssemblyError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ContentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentAssembler for ScriptedAssembler {
    async fn assemble(&self, request: &ContentRequest) -> Result<Content, AssemblyError> {
        self.requests.lock().unwrap().push(request.clone());
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Completeness::Complete));

        outcome.map(|completeness| {
            let status = request
                .terminal
                .as_ref()
                .map(|t| t.raw_code.clone())
                .unwrap_or_default();
            Content::new(
                format!("[{}] {}", request.stage.thread_name(), request.event.label()),
                format!("status={status}"),
                completeness,
            )
        })
    }

    fn fallback(&self, request: &ContentRequest) -> Content {
        Content::new(
            format!("[{}] {}", request.stage.thread_name(), request.event.label()),
            "placeholder",
            Completeness::Degraded,
        )
    }
}

// ============================================================================
// Publisher
// ============================================================================

/// Publisher that records every successful submission
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Content>>,
    failures: Mutex<VecDeque<PublishError>>,
}

impl RecordingPublisher {
    /// Fail the next call with `error`
    pub fn fail_next(&self, error: PublishError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn published(&self) -> Vec<Content> {
        self.published.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, content: &Content) -> Result<PublishReceipt, PublishError> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.published.lock().unwrap().push(content.clone());
        Ok(PublishReceipt {
            id: Some(format!("t3_{}", self.count())),
            url: None,
            dry_run: false,
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Fakes wired into a scheduler context around a manual clock
pub struct Harness {
    pub clock: ManualClock,
    pub ledger: Arc<IdempotencyLedger>,
    pub provider: Arc<ScriptedProvider>,
    pub assembler: Arc<ScriptedAssembler>,
    pub publisher: Arc<RecordingPublisher>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryLedgerStore::new()))
    }

    pub fn with_store(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            clock: ManualClock::new(kickoff() - Duration::hours(25)),
            ledger: Arc::new(IdempotencyLedger::new(store)),
            provider: Arc::new(ScriptedProvider::new(vec!["NS"])),
            assembler: Arc::new(ScriptedAssembler::default()),
            publisher: Arc::new(RecordingPublisher::default()),
        }
    }

    pub fn with_provider(mut self, provider: ScriptedProvider) -> Self {
        self.provider = Arc::new(provider);
        self
    }

    pub fn with_assembler(mut self, assembler: ScriptedAssembler) -> Self {
        self.assembler = Arc::new(assembler);
        self
    }

    pub fn context(&self) -> SchedulerContext {
        self.context_with_assembler(self.assembler.clone())
    }

    /// Context around a different assembler, e.g. the real template renderer
    pub fn context_with_assembler(&self, assembler: Arc<dyn ContentAssembler>) -> SchedulerContext {
        SchedulerContext::new(
            Arc::clone(&self.ledger),
            self.provider.clone(),
            assembler,
            self.publisher.clone(),
        )
        .with_clock(Arc::new(self.clock.clone()))
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
