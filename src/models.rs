// Core data structures for the matchday scheduler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque fixture identifier assigned by the data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EventId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(EventId)
    }
}

/// Lifecycle stage that gets its own announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PreEvent,
    LiveEvent,
    PostEvent,
}

impl Stage {
    /// All stages in lifecycle order
    pub fn all() -> [Self; 3] {
        [Self::PreEvent, Self::LiveEvent, Self::PostEvent]
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreEvent => "pre_event",
            Self::LiveEvent => "live_event",
            Self::PostEvent => "post_event",
        }
    }

    /// Human-readable thread name
    pub fn thread_name(&self) -> &'static str {
        match self {
            Self::PreEvent => "Pre-match thread",
            Self::LiveEvent => "Match thread",
            Self::PostEvent => "Post-match thread",
        }
    }

    /// Create from string (accepts the snake_case name and common aliases)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pre_event" | "pre" | "pre_match" | "prematch" => Some(Self::PreEvent),
            "live_event" | "live" | "match" | "match_thread" => Some(Self::LiveEvent),
            "post_event" | "post" | "post_match" | "postmatch" => Some(Self::PostEvent),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participating team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Team {
    pub id: u64,
    pub name: String,
}

/// Where the event takes place
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Venue {
    pub name: Option<String>,
    pub city: Option<String>,
}

/// Competition the fixture belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Competition {
    pub id: Option<u64>,
    pub name: String,
    pub round: Option<String>,
    pub season: Option<i32>,
}

/// A tracked fixture.
///
/// Only `id` and `start` drive scheduling; the remaining attributes are
/// consumed by content assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub start: DateTime<Utc>,
    pub home: Team,
    pub away: Team,
    pub venue: Venue,
    pub competition: Competition,
    /// Raw provider status code at fetch time, if reported
    pub status_code: Option<String>,
}

impl Event {
    /// Short "Home vs Away" label for logs
    pub fn label(&self) -> String {
        format!("{} vs {}", self.home.name, self.away.name)
    }
}

/// Player entry in a lineup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Player {
    pub name: String,
    pub number: Option<u32>,
    pub position: Option<String>,
}

/// One team's lineup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Lineup {
    pub team: Team,
    pub coach: Option<String>,
    pub formation: Option<String>,
    pub starting: Vec<Player>,
    pub substitutes: Vec<Player>,
}

/// Data published close to kickoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LiveDetail {
    pub lineups: Vec<Lineup>,
}

impl LiveDetail {
    /// Lineups are released by the provider roughly an hour before kickoff
    pub fn has_lineups(&self) -> bool {
        !self.lineups.is_empty()
    }
}

/// Goals for and against, either side may be missing before data settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Score {
    pub home: Option<u32>,
    pub away: Option<u32>,
}

/// A goal event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Goal {
    pub team: String,
    pub player: String,
    pub minute: Option<u32>,
    pub detail: Option<String>,
}

/// A single statistic line for one team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatLine {
    pub kind: String,
    pub value: String,
}

/// Statistics block for one team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TeamStatistics {
    pub team: Team,
    pub lines: Vec<StatLine>,
}

/// How a past fixture ended for the team it was fetched for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormOutcome {
    Win,
    Draw,
    Loss,
}

/// A finished fixture from one team's point of view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentResult {
    pub played_at: DateTime<Utc>,
    pub opponent: String,
    pub goals_for: Option<u32>,
    pub goals_against: Option<u32>,
}

impl RecentResult {
    /// `None` while either score is missing
    pub fn outcome(&self) -> Option<FormOutcome> {
        let (ours, theirs) = (self.goals_for?, self.goals_against?);
        Some(match ours.cmp(&theirs) {
            std::cmp::Ordering::Greater => FormOutcome::Win,
            std::cmp::Ordering::Equal => FormOutcome::Draw,
            std::cmp::Ordering::Less => FormOutcome::Loss,
        })
    }
}

/// Everything known about a fixture once it has ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalResult {
    pub event: Event,
    pub status_code: String,
    pub score: Score,
    pub penalties: Option<Score>,
    pub goals: Vec<Goal>,
    pub statistics: Vec<TeamStatistics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_parse_aliases() {
        assert_eq!(Stage::parse("pre"), Some(Stage::PreEvent));
        assert_eq!(Stage::parse("Post-Match"), Some(Stage::PostEvent));
        assert_eq!(Stage::parse("live_event"), Some(Stage::LiveEvent));
        assert_eq!(Stage::parse("halftime"), None);
    }

    #[test]
    fn test_stage_round_trips_through_as_str() {
        for stage in Stage::all() {
            assert_eq!(Stage::parse(stage.as_str()), Some(stage));
        }
    }

    #[test]
    fn test_recent_result_outcome() {
        let result = |goals_for, goals_against| RecentResult {
            played_at: Utc::now(),
            opponent: "Grêmio".into(),
            goals_for,
            goals_against,
        };
        assert_eq!(result(Some(2), Some(0)).outcome(), Some(FormOutcome::Win));
        assert_eq!(result(Some(1), Some(1)).outcome(), Some(FormOutcome::Draw));
        assert_eq!(result(Some(0), Some(3)).outcome(), Some(FormOutcome::Loss));
        assert_eq!(result(None, Some(3)).outcome(), None);
    }

    #[test]
    fn test_event_id_parse() {
        assert_eq!(" 1208021 ".parse::<EventId>().unwrap(), EventId(1208021));
        assert!("abc".parse::<EventId>().is_err());
    }
}
