//! Opponent nicknames for thread titles
//!
//! Loaded from a JSON file shaped as `{"teams": {"Grêmio": ["...", "..."]}}`.
//! Lookups ignore case and surrounding whitespace. When a team has several
//! nicknames the event id picks one, so every retry and every restart
//! renders the same title for the same fixture.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::models::EventId;

#[derive(Debug, Deserialize)]
struct NicknameFile {
    #[serde(default)]
    teams: HashMap<String, Vec<String>>,
}

/// Team name to nickname candidates
#[derive(Debug, Clone, Default)]
pub struct NicknameBook {
    teams: HashMap<String, Vec<String>>,
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

impl NicknameBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON nickname file format
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: NicknameFile = serde_json::from_str(json)?;
        Ok(file
            .teams
            .into_iter()
            .fold(Self::new(), |book, (team, nicknames)| book.with_team(&team, nicknames)))
    }

    /// Read and parse a nickname file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read nickname file {}", path.display()))?;
        let book = Self::from_json(&json)
            .with_context(|| format!("Failed to parse nickname file {}", path.display()))?;
        tracing::debug!(path = %path.display(), teams = book.len(), "Nicknames loaded");
        Ok(book)
    }

    pub fn with_team<I, S>(mut self, team: &str, nicknames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let nicknames: Vec<String> = nicknames
            .into_iter()
            .map(Into::into)
            .filter(|n| !n.trim().is_empty())
            .collect();
        if !nicknames.is_empty() {
            self.teams.insert(normalize(team), nicknames);
        }
        self
    }

    /// Nickname for `team` in the fixture `event_id`, if any is known
    pub fn nickname(&self, team: &str, event_id: EventId) -> Option<&str> {
        let candidates = self.teams.get(&normalize(team))?;
        let index = (event_id.0 % candidates.len() as u64) as usize;
        candidates.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let book = NicknameBook::new().with_team("Grêmio", ["Tricolor"]);
        assert_eq!(book.nickname("  GRÊMIO ", EventId(1)), Some("Tricolor"));
        assert_eq!(book.nickname("Palmeiras", EventId(1)), None);
    }

    #[test]
    fn test_choice_is_stable_per_event() {
        let book = NicknameBook::new().with_team("Grêmio", ["Tricolor", "Imortal"]);
        let first = book.nickname("Grêmio", EventId(1_208_021));
        assert_eq!(first, book.nickname("Grêmio", EventId(1_208_021)));
        assert_eq!(book.nickname("Grêmio", EventId(2)), Some("Tricolor"));
        assert_eq!(book.nickname("Grêmio", EventId(3)), Some("Imortal"));
    }

    #[test]
    fn test_from_json() {
        let book = NicknameBook::from_json(
            r#"{"teams": {"Grêmio": ["Tricolor"], "Juventude": [], "Caxias": ["  "]}}"#,
        )
        .unwrap();
        assert_eq!(book.len(), 1);
        assert!(NicknameBook::from_json("{}").unwrap().is_empty());
        assert!(NicknameBook::from_json("not json").is_err());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = NicknameBook::load(Path::new("/nonexistent/nicknames.json")).unwrap_err();
        assert!(err.to_string().contains("nickname file"));
    }
}
