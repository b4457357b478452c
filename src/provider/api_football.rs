//! API-Football HTTP client
//!
//! Endpoints used:
//! - `GET /fixtures?team=&season=&next=1` - next fixture for the tracked team
//! - `GET /fixtures?id=` - fixture details and status
//! - `GET /fixtures?team=&league=&season=&last=` - recent results for the form guide
//! - `GET /fixtures/lineups?fixture=` - lineups
//! - `GET /fixtures/events?fixture=` - goals and cards
//! - `GET /fixtures/statistics?fixture=` - team statistics
//!
//! Requests are spaced by a governor rate limiter, counted against the daily
//! quota, and retried on HTTP 429.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT},
    Client, StatusCode,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::metrics;
use crate::models::{
    Competition, Event, EventId, FinalResult, Goal, LiveDetail, Lineup, Player, RecentResult,
    Score, StatLine, Team, TeamStatistics, Venue,
};
use crate::provider::{DataProvider, QuotaTracker};
use crate::utils::error::ProviderError;
use crate::utils::retry::{with_retry_if, RetryConfig};

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for the provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_host: String,
    pub team_id: u64,
    pub season: i32,
    pub requests_per_minute: u32,
    pub request_timeout: Duration,
    /// Retry policy for HTTP 429
    pub retry: RetryConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-football-v1.p.rapidapi.com/v3".to_string(),
            api_key: String::new(),
            api_host: "api-football-v1.p.rapidapi.com".to_string(),
            team_id: 119,
            season: 2025,
            requests_per_minute: 10,
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::linear(2, Duration::from_secs(10)),
        }
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default = "Vec::new")]
    response: Vec<T>,
    #[serde(default)]
    errors: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiTeam {
    id: u64,
    name: String,
}

impl From<ApiTeam> for Team {
    fn from(team: ApiTeam) -> Self {
        Team {
            id: team.id,
            name: team.name,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ApiVenue {
    name: Option<String>,
    city: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiStatus {
    short: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiFixture {
    id: u64,
    date: DateTime<Utc>,
    #[serde(default)]
    venue: ApiVenue,
    #[serde(default)]
    status: ApiStatus,
}

#[derive(Debug, Deserialize)]
struct ApiLeague {
    id: Option<u64>,
    #[serde(default)]
    name: String,
    round: Option<String>,
    season: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ApiTeams {
    home: ApiTeam,
    away: ApiTeam,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
struct ApiGoals {
    home: Option<u32>,
    away: Option<u32>,
}

impl From<ApiGoals> for Score {
    fn from(goals: ApiGoals) -> Self {
        Score {
            home: goals.home,
            away: goals.away,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ApiScore {
    penalty: Option<ApiGoals>,
}

#[derive(Debug, Deserialize)]
struct ApiFixtureItem {
    fixture: ApiFixture,
    league: ApiLeague,
    teams: ApiTeams,
    #[serde(default)]
    goals: ApiGoals,
    #[serde(default)]
    score: ApiScore,
}

impl ApiFixtureItem {
    fn status_code(&self) -> Option<String> {
        self.fixture.status.short.clone()
    }

    /// Result seen from `team_id`; `None` when that team did not play
    fn into_recent_result(self, team_id: u64) -> Option<RecentResult> {
        let (opponent, goals_for, goals_against) = if self.teams.home.id == team_id {
            (self.teams.away.name, self.goals.home, self.goals.away)
        } else if self.teams.away.id == team_id {
            (self.teams.home.name, self.goals.away, self.goals.home)
        } else {
            return None;
        };
        Some(RecentResult {
            played_at: self.fixture.date,
            opponent,
            goals_for,
            goals_against,
        })
    }

    fn into_event(self) -> Event {
        Event {
            id: EventId(self.fixture.id),
            start: self.fixture.date,
            home: self.teams.home.into(),
            away: self.teams.away.into(),
            venue: Venue {
                name: self.fixture.venue.name,
                city: self.fixture.venue.city,
            },
            competition: Competition {
                id: self.league.id,
                name: self.league.name,
                round: self.league.round,
                season: self.league.season,
            },
            status_code: self.fixture.status.short,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ApiNamed {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiPlayer {
    name: Option<String>,
    number: Option<u32>,
    pos: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiPlayerSlot {
    player: ApiPlayer,
}

impl From<ApiPlayerSlot> for Player {
    fn from(slot: ApiPlayerSlot) -> Self {
        Player {
            name: slot.player.name.unwrap_or_else(|| "Unknown".to_string()),
            number: slot.player.number,
            position: slot.player.pos,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiLineup {
    team: ApiTeam,
    #[serde(default)]
    coach: ApiNamed,
    formation: Option<String>,
    #[serde(rename = "startXI", default)]
    start_xi: Vec<ApiPlayerSlot>,
    #[serde(default)]
    substitutes: Vec<ApiPlayerSlot>,
}

impl From<ApiLineup> for Lineup {
    fn from(lineup: ApiLineup) -> Self {
        Lineup {
            team: lineup.team.into(),
            coach: lineup.coach.name,
            formation: lineup.formation,
            starting: lineup.start_xi.into_iter().map(Player::from).collect(),
            substitutes: lineup.substitutes.into_iter().map(Player::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ApiTime {
    elapsed: Option<u32>,
    extra: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiMatchEvent {
    #[serde(default)]
    time: ApiTime,
    team: ApiTeam,
    #[serde(default)]
    player: ApiNamed,
    #[serde(rename = "type")]
    kind: String,
    detail: Option<String>,
}

impl ApiMatchEvent {
    fn into_goal(self) -> Option<Goal> {
        if self.kind != "Goal" || self.detail.as_deref() == Some("Missed Penalty") {
            return None;
        }
        let minute = match (self.time.elapsed, self.time.extra) {
            (Some(m), Some(extra)) => Some(m + extra),
            (m, _) => m,
        };
        Some(Goal {
            team: self.team.name,
            player: self.player.name.unwrap_or_else(|| "Unknown".to_string()),
            minute,
            detail: self.detail,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiStatEntry {
    #[serde(rename = "type")]
    kind: String,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiTeamStatistics {
    team: ApiTeam,
    #[serde(default)]
    statistics: Vec<ApiStatEntry>,
}

impl From<ApiTeamStatistics> for TeamStatistics {
    fn from(stats: ApiTeamStatistics) -> Self {
        TeamStatistics {
            team: stats.team.into(),
            lines: stats
                .statistics
                .into_iter()
                .map(|entry| StatLine {
                    kind: entry.kind,
                    value: match entry.value {
                        serde_json::Value::Null => "0".to_string(),
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    },
                })
                .collect(),
        }
    }
}

/// `errors` is `[]` on success and an object of messages otherwise
fn envelope_error(errors: &serde_json::Value) -> Option<ProviderError> {
    match errors {
        serde_json::Value::Object(map) if !map.is_empty() => {
            if map.contains_key("rateLimit") || map.contains_key("requests") {
                Some(ProviderError::RateLimited)
            } else {
                Some(ProviderError::InvalidResponse(errors.to_string()))
            }
        }
        serde_json::Value::Array(items) if !items.is_empty() => {
            Some(ProviderError::InvalidResponse(errors.to_string()))
        }
        _ => None,
    }
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for API-Football
pub struct ApiFootballClient {
    client: Client,
    config: ProviderConfig,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    quota: Option<Arc<QuotaTracker>>,
}

impl ApiFootballClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Http` if the HTTP client cannot be created and
    /// `ProviderError::InvalidResponse` if the credentials are not valid header values
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-rapidapi-key",
            HeaderValue::from_str(&config.api_key)
                .map_err(|e| ProviderError::InvalidResponse(format!("invalid api key: {e}")))?,
        );
        headers.insert(
            "x-rapidapi-host",
            HeaderValue::from_str(&config.api_host)
                .map_err(|e| ProviderError::InvalidResponse(format!("invalid api host: {e}")))?,
        );

        let client = Client::builder()
            .timeout(config.request_timeout)
            .gzip(true)
            .default_headers(headers)
            .build()?;

        let rate = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_minute(rate));

        Ok(Self {
            client,
            config,
            rate_limiter,
            quota: None,
        })
    }

    /// Create a client against a custom base URL for testing
    pub fn with_base_url(base_url: &str) -> Result<Self, ProviderError> {
        Self::new(ProviderConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: "test-key".to_string(),
            requests_per_minute: 6000,
            retry: RetryConfig::linear(2, Duration::from_millis(10)),
            ..Default::default()
        })
    }

    /// Count requests against a daily budget
    pub fn with_quota(mut self, quota: Arc<QuotaTracker>) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// GET an endpoint, retrying on HTTP 429
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, ProviderError> {
        with_retry_if(
            &self.config.retry,
            || self.get_once(path, query),
            |e| matches!(e, ProviderError::RateLimited),
        )
        .await
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, ProviderError> {
        if let Some(quota) = &self.quota {
            quota.acquire(path).await?;
        }
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.base_url, path);
        tracing::debug!(endpoint = path, "Provider request");

        let started = Instant::now();
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        metrics::record_provider_request(path, status.as_u16(), started.elapsed().as_secs_f64());

        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(endpoint = path, "Provider rate limit hit (429)");
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Upstream(status.as_u16()));
        }

        let body = response.text().await?;
        let envelope: ApiEnvelope<T> = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("{path}: {e}")))?;

        if let Some(err) = envelope_error(&envelope.errors) {
            return Err(err);
        }
        Ok(envelope.response)
    }

    async fn fixture(&self, event_id: EventId) -> Result<ApiFixtureItem, ProviderError> {
        self.get::<ApiFixtureItem>("/fixtures", &[("id", event_id.to_string())])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotYetAvailable(format!("fixture {event_id}")))
    }
}

#[async_trait]
impl DataProvider for ApiFootballClient {
    async fn fetch_event(&self) -> Result<Option<Event>, ProviderError> {
        let items = self
            .get::<ApiFixtureItem>(
                "/fixtures",
                &[
                    ("team", self.config.team_id.to_string()),
                    ("season", self.config.season.to_string()),
                    ("next", "1".to_string()),
                ],
            )
            .await?;

        let event = items.into_iter().next().map(ApiFixtureItem::into_event);
        match &event {
            Some(event) => tracing::info!(
                event_id = %event.id,
                fixture = %event.label(),
                start = %event.start,
                "Next fixture fetched"
            ),
            None => tracing::info!(team_id = self.config.team_id, "No upcoming fixture"),
        }
        Ok(event)
    }

    async fn fetch_live_detail(&self, event_id: EventId) -> Result<LiveDetail, ProviderError> {
        let lineups = self
            .get::<ApiLineup>("/fixtures/lineups", &[("fixture", event_id.to_string())])
            .await?;

        if lineups.is_empty() {
            tracing::warn!(event_id = %event_id, "Provider returned no lineups");
        }
        Ok(LiveDetail {
            lineups: lineups.into_iter().map(Lineup::from).collect(),
        })
    }

    async fn fetch_final_data(&self, event_id: EventId) -> Result<FinalResult, ProviderError> {
        let query = [("fixture", event_id.to_string())];
        let (fixture, events, statistics) = futures::try_join!(
            self.fixture(event_id),
            self.get::<ApiMatchEvent>("/fixtures/events", &query),
            self.get::<ApiTeamStatistics>("/fixtures/statistics", &query),
        )?;

        let status_code = fixture.status_code().unwrap_or_else(|| "FT".to_string());
        let score = Score::from(fixture.goals);
        let penalties = fixture.score.penalty.map(Score::from);

        Ok(FinalResult {
            event: fixture.into_event(),
            status_code,
            score,
            penalties,
            goals: events.into_iter().filter_map(ApiMatchEvent::into_goal).collect(),
            statistics: statistics.into_iter().map(TeamStatistics::from).collect(),
        })
    }

    async fn fetch_status(&self, event_id: EventId) -> Result<String, ProviderError> {
        self.fixture(event_id)
            .await?
            .status_code()
            .ok_or_else(|| ProviderError::InvalidResponse(format!("fixture {event_id} has no status")))
    }

    async fn fetch_recent_form(
        &self,
        team_id: u64,
        competition: &Competition,
        count: u8,
    ) -> Result<Vec<RecentResult>, ProviderError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut query = vec![
            ("team", team_id.to_string()),
            (
                "season",
                competition.season.unwrap_or(self.config.season).to_string(),
            ),
            ("last", count.to_string()),
        ];
        if let Some(league) = competition.id {
            query.push(("league", league.to_string()));
        }

        let items = self.get::<ApiFixtureItem>("/fixtures", &query).await?;
        let mut results: Vec<RecentResult> = items
            .into_iter()
            .filter_map(|item| item.into_recent_result(team_id))
            .collect();
        results.sort_by(|a, b| b.played_at.cmp(&a.played_at));

        tracing::debug!(team_id, results = results.len(), "Recent form fetched");
        Ok(results)
    }
}
