//! Announcement content
//!
//! The scheduler asks a [`ContentAssembler`] for the title and body of a
//! stage's announcement and treats it as a black box that may fail or
//! return partial data. [`MatchThreadAssembler`] renders football match
//! threads from provider data with Handlebars templates, optionally calling
//! opponents by a [`NicknameBook`] nickname.

pub mod markdown;
pub mod nickname;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Event, Stage};
use crate::scheduler::status::StatusCategory;
use crate::utils::error::AssemblyError;

pub use markdown::MatchThreadAssembler;
pub use nickname::NicknameBook;

/// Terminal status that triggered the post-event stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalStatus {
    pub category: StatusCategory,
    pub raw_code: String,
}

impl TerminalStatus {
    pub fn new(category: StatusCategory, raw_code: impl Into<String>) -> Self {
        Self {
            category,
            raw_code: raw_code.into(),
        }
    }

    /// Ended without a regular result
    pub fn is_irregular(&self) -> bool {
        self.category == StatusCategory::FinishedIrregular
    }
}

/// What to assemble
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
    pub event: Event,
    pub stage: Stage,
    /// Set for the post-event stage only
    pub terminal: Option<TerminalStatus>,
}

impl ContentRequest {
    pub fn new(event: Event, stage: Stage) -> Self {
        Self {
            event,
            stage,
            terminal: None,
        }
    }

    pub fn with_terminal(mut self, terminal: TerminalStatus) -> Self {
        self.terminal = Some(terminal);
        self
    }

    /// The event ended irregularly; the announcement must say so
    pub fn is_irregular(&self) -> bool {
        self.terminal.as_ref().is_some_and(TerminalStatus::is_irregular)
    }
}

/// How much of the intended data made it into the content
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    /// Placeholder body, no upstream data
    Degraded,
    /// Some upstream data missing (lineups, statistics)
    Partial,
    /// Everything available
    Complete,
}

/// Assembled announcement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub title: String,
    pub body: String,
    pub completeness: Completeness,
}

impl Content {
    pub fn new(title: impl Into<String>, body: impl Into<String>, completeness: Completeness) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            completeness,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completeness == Completeness::Complete
    }
}

/// Produces announcement text for a stage
#[async_trait]
pub trait ContentAssembler: Send + Sync {
    /// Gather data and render the announcement
    ///
    /// `Partial` content and recoverable errors are retried by the caller.
    async fn assemble(&self, request: &ContentRequest) -> Result<Content, AssemblyError>;

    /// Placeholder content used when assembly never succeeds. No I/O.
    fn fallback(&self, request: &ContentRequest) -> Content;
}
