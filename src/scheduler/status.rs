//! Status classification
//!
//! Maps raw provider status codes onto the five categories the scheduler
//! reasons about. The mapping is total: anything unrecognised is `Unknown`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived status of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    /// Not started yet (scheduled, to be defined, postponed)
    PreStart,
    /// In progress, including breaks and interruptions
    InPlay,
    /// Ended with a result (full time, after extra time, after penalties)
    FinishedNormal,
    /// Ended without a regular result (walkover, awarded, cancelled, abandoned)
    FinishedIrregular,
    /// Anything the classifier does not recognise
    Unknown,
}

impl StatusCategory {
    /// Whether the event will produce no further relevant status changes
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinishedNormal | Self::FinishedIrregular)
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreStart => "pre_start",
            Self::InPlay => "in_play",
            Self::FinishedNormal => "finished_normal",
            Self::FinishedIrregular => "finished_irregular",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const PRE_START: &[&str] = &["TBD", "NS", "PST"];
const IN_PLAY: &[&str] = &["1H", "HT", "2H", "ET", "BT", "P", "SUSP", "INT", "LIVE"];
const FINISHED_NORMAL: &[&str] = &["FT", "AET", "PEN"];
const FINISHED_IRREGULAR: &[&str] = &["WO", "AWD", "CANC", "ABD"];

/// Classify a raw status code. Never fails.
pub fn classify(raw: &str) -> StatusCategory {
    let code = raw.trim().to_ascii_uppercase();
    let code = code.as_str();

    if PRE_START.contains(&code) {
        StatusCategory::PreStart
    } else if IN_PLAY.contains(&code) {
        StatusCategory::InPlay
    } else if FINISHED_NORMAL.contains(&code) {
        StatusCategory::FinishedNormal
    } else if FINISHED_IRREGULAR.contains(&code) {
        StatusCategory::FinishedIrregular
    } else {
        StatusCategory::Unknown
    }
}

/// Human wording for an irregular ending, used by content assembly
pub fn irregular_reason(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "WO" => Some("walkover"),
        "AWD" => Some("awarded"),
        "CANC" => Some("cancelled"),
        "ABD" => Some("abandoned"),
        _ => None,
    }
}
