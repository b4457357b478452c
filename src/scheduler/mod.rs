//! Fixture lifecycle scheduling
//!
//! Every tracked event gets three announcements: a pre-match thread a day
//! before kickoff, a match thread shortly before kickoff, and a post-match
//! thread once the provider reports a final status. This module decides
//! when each of them goes out and makes sure each goes out at most once.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  LifecycleOrchestrator                   │
//! │   tick() (cron)            run(shutdown) (continuous)    │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐    │
//! │  │ StageScheduler│  │StageScheduler│  │StageScheduler│    │
//! │  │  PreEvent    │  │  LiveEvent   │  │  PostEvent   │    │
//! │  │  TimeGuard   │  │  TimeGuard   │  │ TerminalGuard│    │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘    │
//! └─────────┼─────────────────┼─────────────────┼────────────┘
//!           │                 │                 │
//!           │                 │          ┌──────▼──────┐
//!           │                 │          │StatusPoller │
//!           │                 │          └──────┬──────┘
//!           ▼                 ▼                 ▼
//!   IdempotencyLedger   ContentAssembler    Publisher
//! ```
//!
//! # Modules
//!
//! - [`timing`] - stage target times (`StageTimeCalculator`)
//! - [`status`] - total classification of raw status codes
//! - [`poller`] - status polling sessions with throttled cadence
//! - [`guard`] - readiness strategies for the `Waiting -> Ready` transition
//! - [`stage`] - the per-stage state machine
//! - [`orchestrator`] - per-event orchestration, tick reports and task registry
//! - [`error`] - scheduler errors
//!
//! # Defaults
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `pre_event_offset` | 24h | Pre-match thread lead time |
//! | `live_event_offset` | 15m | Match thread lead time |
//! | `typical_duration` | 120m | Polling starts this long after kickoff |
//! | `interval` | 120s | Status poll interval |
//! | `throttle_factor` | 5 | Interval multiplier after 5 errors or 30 pre-start polls |
//! | `max_duration` | 4h | Polling gives up after this long |
//! | assembly retries | 3 attempts | 10s, then 20s between attempts |

pub mod error;
pub mod guard;
pub mod orchestrator;
pub mod poller;
pub mod stage;
pub mod status;
pub mod timing;

// Re-export main types
pub use error::{SchedulerError, SchedulerResult};
pub use guard::{ReadinessGuard, TerminalStatusGuard, TimeGuard};
pub use orchestrator::{LifecycleOrchestrator, StageReport, StageSnapshot, TickReport};
pub use poller::{PollingConfig, PollingOutcome, PollingSession, StatusPoller};
pub use stage::{SchedulerContext, StageScheduler, StageState};
pub use status::{classify, StatusCategory};
pub use timing::{StageTimeCalculator, TargetTime, TimingConfig};
