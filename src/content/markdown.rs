//! Match thread rendering with Handlebars templates
//!
//! Titles are built in code; bodies come from the templates under
//! `templates/`. Provider data is fetched per stage:
//!
//! - pre-event: recent form of both teams
//! - live: lineups (`Partial` while they are not released) and recent form
//! - post-event: final result, goals and statistics
//!
//! Recent form is an extra: when it cannot be fetched the section is left
//! out and the rest of the thread is rendered as usual.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use handlebars::Handlebars;
use regex::Regex;
use serde::Serialize;

use crate::content::nickname::NicknameBook;
use crate::content::{Completeness, Content, ContentAssembler, ContentRequest};
use crate::models::{Event, FinalResult, FormOutcome, Lineup, Player, RecentResult, Stage, Team};
use crate::provider::DataProvider;
use crate::scheduler::status::irregular_reason;
use crate::utils::error::AssemblyError;

const PRE_EVENT_TEMPLATE: &str = include_str!("../../templates/pre_event.hbs");
const LIVE_EVENT_TEMPLATE: &str = include_str!("../../templates/live_event.hbs");
const POST_EVENT_TEMPLATE: &str = include_str!("../../templates/post_event.hbs");

static REGULAR_SEASON_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)regular season\s*-\s*(\d+)").expect("valid regex"));
static GROUP_STAGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)group stage\s*-\s*(\w+)").expect("valid regex"));

const UNKNOWN: &str = "Unknown";

/// Finished fixtures listed per team in the form section
pub const DEFAULT_FORM_MATCHES: u8 = 5;

// ============================================================================
// Template Data
// ============================================================================

#[derive(Debug, Serialize)]
struct HeaderData {
    competition: String,
    round: String,
    home: String,
    away: String,
    venue: String,
    city: String,
    kickoff: String,
}

impl HeaderData {
    fn from_event(event: &Event) -> Self {
        Self {
            competition: format_competition(&event.competition.name),
            round: format_round(event.competition.round.as_deref()),
            home: event.home.name.clone(),
            away: event.away.name.clone(),
            venue: event.venue.name.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            city: event.venue.city.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            kickoff: event.start.format("%A, %d %B %Y %H:%M UTC").to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LineupData {
    team: String,
    formation: Option<String>,
    coach: String,
    starting: String,
    substitutes: String,
}

impl From<&Lineup> for LineupData {
    fn from(lineup: &Lineup) -> Self {
        Self {
            team: lineup.team.name.clone(),
            formation: lineup.formation.clone(),
            coach: lineup.coach.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            starting: join_players(&lineup.starting),
            substitutes: join_players(&lineup.substitutes),
        }
    }
}

#[derive(Debug, Serialize)]
struct FormData {
    team: String,
    results: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PreData {
    #[serde(flatten)]
    header: HeaderData,
    form: Vec<FormData>,
}

#[derive(Debug, Serialize)]
struct LiveData {
    #[serde(flatten)]
    header: HeaderData,
    lineups: Vec<LineupData>,
    form: Vec<FormData>,
}

#[derive(Debug, Serialize)]
struct StatRow {
    name: String,
    home: String,
    away: String,
}

#[derive(Debug, Serialize)]
struct PostData {
    #[serde(flatten)]
    header: HeaderData,
    score_line: String,
    status_code: String,
    irregular_reason: Option<String>,
    goals: Vec<String>,
    stats: Vec<StatRow>,
}

// ============================================================================
// Formatting Helpers
// ============================================================================

/// Competition names are shown upper-cased in titles and headers
pub fn format_competition(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        "COMPETITION".to_string()
    } else {
        name.to_uppercase()
    }
}

/// "Regular Season - 5" -> "Round 5", "Group Stage - B" -> "Group B"
pub fn format_round(round: Option<&str>) -> String {
    let Some(round) = round.map(str::trim).filter(|r| !r.is_empty()) else {
        return String::new();
    };

    if let Some(caps) = REGULAR_SEASON_REGEX.captures(round) {
        return format!("Round {}", &caps[1]);
    }
    if let Some(caps) = GROUP_STAGE_REGEX.captures(round) {
        return format!("Group {}", &caps[1]);
    }
    round.to_string()
}

fn join_players(players: &[Player]) -> String {
    if players.is_empty() {
        return "N/A".to_string();
    }
    players
        .iter()
        .map(|p| match p.number {
            Some(n) => format!("{} ({n})", p.name),
            None => p.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// "Win against Palmeiras (2x1)"
fn format_recent_result(result: &RecentResult) -> String {
    let outcome = match result.outcome() {
        Some(FormOutcome::Win) => "✅ Win",
        Some(FormOutcome::Draw) => "➖ Draw",
        Some(FormOutcome::Loss) => "❌ Loss",
        None => "❔ No result",
    };
    format!(
        "{outcome} against {} ({}x{})",
        result.opponent,
        score_value(result.goals_for),
        score_value(result.goals_against)
    )
}

fn score_value(value: Option<u32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// "HOME 2 x 1 AWAY", with an extra-time or penalty suffix
fn score_line(result: &FinalResult) -> String {
    let mut line = format!(
        "{} {} x {} {}",
        result.event.home.name.to_uppercase(),
        score_value(result.score.home),
        score_value(result.score.away),
        result.event.away.name.to_uppercase()
    );

    match result.status_code.as_str() {
        "AET" => line.push_str(" (after extra time)"),
        "PEN" => {
            if let Some(pen) = result.penalties {
                line.push_str(&format!(
                    " (penalties: {} x {})",
                    score_value(pen.home),
                    score_value(pen.away)
                ));
            }
        }
        _ => {}
    }
    line
}

fn stat_rows(result: &FinalResult) -> Vec<StatRow> {
    let [home, away] = match result.statistics.as_slice() {
        [home, away, ..] => [home, away],
        _ => return Vec::new(),
    };

    home.lines
        .iter()
        .map(|line| StatRow {
            name: line.kind.clone(),
            home: line.value.clone(),
            away: away
                .lines
                .iter()
                .find(|l| l.kind == line.kind)
                .map_or_else(|| "-".to_string(), |l| l.value.clone()),
        })
        .collect()
}

fn stage_tag(stage: Stage) -> &'static str {
    match stage {
        Stage::PreEvent => "[PRE-MATCH]",
        Stage::LiveEvent => "[MATCH THREAD]",
        Stage::PostEvent => "[POST-MATCH]",
    }
}

/// Title without a score; used before the result is known and by the fallback
fn plain_title(request: &ContentRequest, (home, away): (String, String)) -> String {
    let event = &request.event;
    let mut title = format!(
        "{} | {} | {home} X {away}",
        stage_tag(request.stage),
        format_competition(&event.competition.name),
    );

    if let Some(reason) = request
        .terminal
        .as_ref()
        .filter(|t| t.is_irregular())
        .and_then(|t| irregular_reason(&t.raw_code))
    {
        title.push_str(&format!(" ({})", reason.to_uppercase()));
    }

    let round = format_round(event.competition.round.as_deref());
    if !round.is_empty() {
        title.push_str(&format!(" | {round}"));
    }
    title
}

fn result_title(request: &ContentRequest, result: &FinalResult) -> String {
    if request.is_irregular() {
        return plain_title(request, official_names(&request.event));
    }

    let event = &request.event;
    let mut title = format!(
        "{} | {} | {} {} X {} {}",
        stage_tag(request.stage),
        format_competition(&event.competition.name),
        event.home.name.to_uppercase(),
        score_value(result.score.home),
        score_value(result.score.away),
        event.away.name.to_uppercase()
    );

    let round = format_round(event.competition.round.as_deref());
    if !round.is_empty() {
        title.push_str(&format!(" | {round}"));
    }
    title
}

// ============================================================================
// Assembler
// ============================================================================

fn official_names(event: &Event) -> (String, String) {
    (event.home.name.to_uppercase(), event.away.name.to_uppercase())
}

/// Renders match threads from provider data
pub struct MatchThreadAssembler {
    provider: Arc<dyn DataProvider>,
    handlebars: Handlebars<'static>,
    form_matches: u8,
    nicknames: NicknameBook,
    tracked_team: Option<u64>,
}

impl MatchThreadAssembler {
    /// Create an assembler with the built-in templates
    pub fn new(provider: Arc<dyn DataProvider>) -> Result<Self, AssemblyError> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);

        for (name, template) in [
            (Stage::PreEvent.as_str(), PRE_EVENT_TEMPLATE),
            (Stage::LiveEvent.as_str(), LIVE_EVENT_TEMPLATE),
            (Stage::PostEvent.as_str(), POST_EVENT_TEMPLATE),
        ] {
            handlebars
                .register_template_string(name, template)
                .map_err(|e| AssemblyError::Render(format!("template '{name}': {e}")))?;
        }

        Ok(Self {
            provider,
            handlebars,
            form_matches: DEFAULT_FORM_MATCHES,
            nicknames: NicknameBook::new(),
            tracked_team: None,
        })
    }

    /// Fixtures per team in the form section; zero drops the section
    pub fn with_form_matches(mut self, count: u8) -> Self {
        self.form_matches = count;
        self
    }

    /// Show the opponent of `tracked_team` by nickname in pre-match and match thread titles
    pub fn with_nicknames(mut self, nicknames: NicknameBook, tracked_team: u64) -> Self {
        self.nicknames = nicknames;
        self.tracked_team = Some(tracked_team);
        self
    }

    /// Upper-cased team names for the title
    fn title_names(&self, request: &ContentRequest) -> (String, String) {
        let event = &request.event;
        let (home, away) = official_names(event);
        let Some(tracked) = self.tracked_team else {
            return (home, away);
        };
        if request.stage == Stage::PostEvent || (event.home.id != tracked && event.away.id != tracked)
        {
            return (home, away);
        }

        let nickname = |team: &Team| {
            let nickname = self.nicknames.nickname(&team.name, event.id)?;
            tracing::debug!(team = %team.name, nickname, "Using nickname for opponent");
            Some(nickname.to_uppercase())
        };
        if event.home.id == tracked {
            (home, nickname(&event.away).unwrap_or(away))
        } else {
            (nickname(&event.home).unwrap_or(home), away)
        }
    }

    async fn team_form(&self, team: &Team, event: &Event) -> Option<FormData> {
        match self
            .provider
            .fetch_recent_form(team.id, &event.competition, self.form_matches)
            .await
        {
            Ok(results) if results.is_empty() => None,
            Ok(results) => Some(FormData {
                team: team.name.clone(),
                results: results.iter().map(format_recent_result).collect(),
            }),
            Err(e) => {
                tracing::warn!(event_id = %event.id, team = %team.name, error = %e, "Recent form unavailable");
                None
            }
        }
    }

    /// Form of both teams; teams without history are left out
    async fn form(&self, event: &Event) -> Vec<FormData> {
        if self.form_matches == 0 {
            return Vec::new();
        }
        let (home, away) =
            futures::join!(self.team_form(&event.home, event), self.team_form(&event.away, event));
        home.into_iter().chain(away).collect()
    }

    fn render<T: Serialize>(&self, stage: Stage, data: &T) -> Result<String, AssemblyError> {
        self.handlebars
            .render(stage.as_str(), data)
            .map(|body| body.trim().to_string())
            .map_err(|e| AssemblyError::Render(e.to_string()))
    }

    async fn assemble_pre_event(&self, request: &ContentRequest) -> Result<Content, AssemblyError> {
        let data = PreData {
            header: HeaderData::from_event(&request.event),
            form: self.form(&request.event).await,
        };
        let body = self.render(Stage::PreEvent, &data)?;
        Ok(Content::new(
            plain_title(request, self.title_names(request)),
            body,
            Completeness::Complete,
        ))
    }

    async fn assemble_live_event(&self, request: &ContentRequest) -> Result<Content, AssemblyError> {
        let (detail, form) = futures::join!(
            self.provider.fetch_live_detail(request.event.id),
            self.form(&request.event)
        );
        let detail = detail?;

        let completeness = if detail.has_lineups() {
            Completeness::Complete
        } else {
            tracing::debug!(event_id = %request.event.id, "Lineups not released yet");
            Completeness::Partial
        };

        let data = LiveData {
            header: HeaderData::from_event(&request.event),
            lineups: detail.lineups.iter().map(LineupData::from).collect(),
            form,
        };
        let body = self.render(Stage::LiveEvent, &data)?;
        Ok(Content::new(
            plain_title(request, self.title_names(request)),
            body,
            completeness,
        ))
    }

    async fn assemble_post_event(&self, request: &ContentRequest) -> Result<Content, AssemblyError> {
        let terminal = request.terminal.as_ref().ok_or_else(|| {
            AssemblyError::Invalid("post-event content requires a terminal status".to_string())
        })?;

        let result = match self.provider.fetch_final_data(request.event.id).await {
            Ok(result) => result,
            // Irregular endings often have no final data at all; say what we know
            Err(e) if terminal.is_irregular() => {
                tracing::debug!(event_id = %request.event.id, error = %e, "No final data for irregular ending");
                return self.irregular_without_result(request, &terminal.raw_code);
            }
            Err(e) => return Err(e.into()),
        };

        let has_score = result.score.home.is_some() && result.score.away.is_some();
        let stats = stat_rows(&result);
        let completeness = if (has_score || terminal.is_irregular()) && !stats.is_empty() {
            Completeness::Complete
        } else {
            Completeness::Partial
        };

        let data = PostData {
            header: HeaderData::from_event(&request.event),
            score_line: score_line(&result),
            status_code: terminal.raw_code.clone(),
            irregular_reason: irregular_reason(&terminal.raw_code).map(str::to_string),
            goals: result
                .goals
                .iter()
                .map(|g| match g.minute {
                    Some(m) => format!("{}: {} ({m}')", g.team, g.player),
                    None => format!("{}: {}", g.team, g.player),
                })
                .collect(),
            stats,
        };

        let body = self.render(Stage::PostEvent, &data)?;
        Ok(Content::new(result_title(request, &result), body, completeness))
    }

    fn irregular_without_result(
        &self,
        request: &ContentRequest,
        raw_code: &str,
    ) -> Result<Content, AssemblyError> {
        let event = &request.event;
        let data = PostData {
            header: HeaderData::from_event(event),
            score_line: format!(
                "{} x {}",
                event.home.name.to_uppercase(),
                event.away.name.to_uppercase()
            ),
            status_code: raw_code.to_string(),
            irregular_reason: irregular_reason(raw_code).map(str::to_string),
            goals: Vec::new(),
            stats: Vec::new(),
        };
        let body = self.render(Stage::PostEvent, &data)?;
        Ok(Content::new(
            plain_title(request, official_names(event)),
            body,
            Completeness::Partial,
        ))
    }
}

#[async_trait]
impl ContentAssembler for MatchThreadAssembler {
    async fn assemble(&self, request: &ContentRequest) -> Result<Content, AssemblyError> {
        if request.event.home.name.trim().is_empty() || request.event.away.name.trim().is_empty() {
            return Err(AssemblyError::Invalid(format!(
                "event {} has no team names",
                request.event.id
            )));
        }

        match request.stage {
            Stage::PreEvent => self.assemble_pre_event(request).await,
            Stage::LiveEvent => self.assemble_live_event(request).await,
            Stage::PostEvent => self.assemble_post_event(request).await,
        }
    }

    fn fallback(&self, request: &ContentRequest) -> Content {
        let event = &request.event;
        let mut body = format!(
            "## {} - {}\n\n**{}** vs **{}**\n\n🕓 *Kickoff: {}*\n\n",
            format_competition(&event.competition.name),
            format_round(event.competition.round.as_deref()),
            event.home.name,
            event.away.name,
            event.start.format("%A, %d %B %Y %H:%M UTC"),
        );

        if let Some(reason) = request
            .terminal
            .as_ref()
            .filter(|t| t.is_irregular())
            .and_then(|t| irregular_reason(&t.raw_code))
        {
            body.push_str(&format!("⚠️ **The match did not finish normally: {reason}.**\n\n"));
        }

        body.push_str("_Details are not available yet and will be added when the data provider publishes them._\n\n---\n\n^(*This thread was created automatically by a bot.*)");

        Content::new(
            plain_title(request, self.title_names(request)),
            body,
            Completeness::Degraded,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::TerminalStatus;
    use crate::models::{
        Competition, EventId, Goal, LiveDetail, Score, StatLine, Team, TeamStatistics, Venue,
    };
    use chrono::Duration;
    use crate::scheduler::status::StatusCategory;
    use crate::utils::error::ProviderError;
    use chrono::{TimeZone, Utc};

    struct StaticProvider {
        live: LiveDetail,
        result: Option<FinalResult>,
        /// `None` fails every form request
        form: Option<Vec<RecentResult>>,
    }

    #[async_trait]
    impl DataProvider for StaticProvider {
        async fn fetch_event(&self) -> Result<Option<Event>, ProviderError> {
            Ok(None)
        }
        async fn fetch_live_detail(
            &self,
            _: EventId,
        ) -> Result<LiveDetail, ProviderError> {
            Ok(self.live.clone())
        }
        async fn fetch_final_data(&self, _: EventId) -> Result<FinalResult, ProviderError> {
            self.result
                .clone()
                .ok_or_else(|| ProviderError::NotYetAvailable("final".into()))
        }
        async fn fetch_status(&self, _: EventId) -> Result<String, ProviderError> {
            Ok("FT".into())
        }
        async fn fetch_recent_form(
            &self,
            team_id: u64,
            _: &Competition,
            count: u8,
        ) -> Result<Vec<RecentResult>, ProviderError> {
            let form = self.form.clone().ok_or(ProviderError::Upstream(503))?;
            // only the home side has history
            Ok(if team_id == 119 {
                form.into_iter().take(count as usize).collect()
            } else {
                Vec::new()
            })
        }
    }

    fn event() -> Event {
        Event {
            id: EventId(1208021),
            start: Utc.with_ymd_and_hms(2025, 5, 4, 19, 0, 0).unwrap(),
            home: Team {
                id: 119,
                name: "Internacional".into(),
            },
            away: Team {
                id: 121,
                name: "Palmeiras".into(),
            },
            venue: Venue {
                name: Some("Estádio Beira-Rio".into()),
                city: Some("Porto Alegre".into()),
            },
            competition: Competition {
                id: Some(71),
                name: "Serie A".into(),
                round: Some("Regular Season - 7".into()),
                season: Some(2025),
            },
            status_code: Some("NS".into()),
        }
    }

    fn final_result(status: &str) -> FinalResult {
        let home = Team {
            id: 119,
            name: "Internacional".into(),
        };
        let away = Team {
            id: 121,
            name: "Palmeiras".into(),
        };
        FinalResult {
            event: event(),
            status_code: status.into(),
            score: Score {
                home: Some(2),
                away: Some(2),
            },
            penalties: Some(Score {
                home: Some(4),
                away: Some(3),
            }),
            goals: vec![Goal {
                team: "Internacional".into(),
                player: "Borré".into(),
                minute: Some(12),
                detail: None,
            }],
            statistics: vec![
                TeamStatistics {
                    team: home,
                    lines: vec![StatLine {
                        kind: "Ball Possession".into(),
                        value: "55%".into(),
                    }],
                },
                TeamStatistics {
                    team: away,
                    lines: vec![StatLine {
                        kind: "Ball Possession".into(),
                        value: "45%".into(),
                    }],
                },
            ],
        }
    }

    fn assembler(live: LiveDetail, result: Option<FinalResult>) -> MatchThreadAssembler {
        MatchThreadAssembler::new(Arc::new(StaticProvider {
            live,
            result,
            form: Some(Vec::new()),
        }))
        .unwrap()
    }

    fn recent_form() -> Vec<RecentResult> {
        let played_at = Utc.with_ymd_and_hms(2025, 4, 27, 21, 30, 0).unwrap();
        [("Grêmio", 2, 0), ("Juventude", 1, 1), ("Flamengo", 0, 3)]
            .into_iter()
            .enumerate()
            .map(|(i, (opponent, ours, theirs))| RecentResult {
                played_at: played_at - Duration::days(7 * i as i64),
                opponent: opponent.into(),
                goals_for: Some(ours),
                goals_against: Some(theirs),
            })
            .collect()
    }

    fn form_assembler(form: Option<Vec<RecentResult>>) -> MatchThreadAssembler {
        MatchThreadAssembler::new(Arc::new(StaticProvider {
            live: LiveDetail::default(),
            result: None,
            form,
        }))
        .unwrap()
    }

    #[test]
    fn test_format_round() {
        assert_eq!(format_round(Some("Regular Season - 12")), "Round 12");
        assert_eq!(format_round(Some("Group Stage - B")), "Group B");
        assert_eq!(format_round(Some("Quarter-finals")), "Quarter-finals");
        assert_eq!(format_round(None), "");
    }

    #[tokio::test]
    async fn test_pre_event_content() {
        let assembler = assembler(LiveDetail::default(), None);
        let content = assembler
            .assemble(&ContentRequest::new(event(), Stage::PreEvent))
            .await
            .unwrap();

        assert_eq!(
            content.title,
            "[PRE-MATCH] | SERIE A | INTERNACIONAL X PALMEIRAS | Round 7"
        );
        assert!(content.body.contains("**Internacional** vs **Palmeiras**"));
        assert!(content.body.contains("Estádio Beira-Rio, Porto Alegre"));
        assert!(content.is_complete());
    }

    #[tokio::test]
    async fn test_pre_event_recent_form() {
        let content = form_assembler(Some(recent_form()))
            .with_form_matches(2)
            .assemble(&ContentRequest::new(event(), Stage::PreEvent))
            .await
            .unwrap();

        assert!(content.body.contains("### Recent form"));
        assert!(content.body.contains("✅ Win against Grêmio (2x0)"));
        assert!(content.body.contains("➖ Draw against Juventude (1x1)"));
        assert!(!content.body.contains("Flamengo"));
        assert_eq!(content.body.matches("**Internacional**").count(), 2);
        assert_eq!(content.body.matches("**Palmeiras**").count(), 1);
    }

    #[tokio::test]
    async fn test_recent_form_failure_drops_section() {
        let content = form_assembler(None)
            .assemble(&ContentRequest::new(event(), Stage::PreEvent))
            .await
            .unwrap();

        assert!(content.is_complete());
        assert!(!content.body.contains("Recent form"));

        let content = form_assembler(Some(recent_form()))
            .with_form_matches(0)
            .assemble(&ContentRequest::new(event(), Stage::LiveEvent))
            .await
            .unwrap();
        assert!(!content.body.contains("Recent form"));
    }

    #[tokio::test]
    async fn test_opponent_nickname_in_titles() {
        let assembler = assembler(LiveDetail::default(), Some(final_result("FT"))).with_nicknames(
            crate::content::nickname::NicknameBook::new()
                .with_team("palmeiras", ["Porco"])
                .with_team("Internacional", ["Colorado"]),
            119,
        );

        let live = assembler
            .assemble(&ContentRequest::new(event(), Stage::LiveEvent))
            .await
            .unwrap();
        assert_eq!(
            live.title,
            "[MATCH THREAD] | SERIE A | INTERNACIONAL X PORCO | Round 7"
        );

        let post = ContentRequest::new(event(), Stage::PostEvent)
            .with_terminal(TerminalStatus::new(StatusCategory::FinishedNormal, "FT"));
        let content = assembler.assemble(&post).await.unwrap();
        assert!(content.title.contains("INTERNACIONAL 2 X 2 PALMEIRAS"));
    }

    #[tokio::test]
    async fn test_live_content_partial_without_lineups() {
        let assembler = assembler(LiveDetail::default(), None);
        let content = assembler
            .assemble(&ContentRequest::new(event(), Stage::LiveEvent))
            .await
            .unwrap();

        assert_eq!(content.completeness, Completeness::Partial);
        assert!(content.body.contains("Lineups not available yet"));
    }

    #[tokio::test]
    async fn test_live_content_with_lineups() {
        let live = LiveDetail {
            lineups: vec![Lineup {
                team: Team {
                    id: 119,
                    name: "Internacional".into(),
                },
                coach: Some("Roger Machado".into()),
                formation: Some("4-2-3-1".into()),
                starting: vec![Player {
                    name: "Rochet".into(),
                    number: Some(1),
                    position: Some("G".into()),
                }],
                substitutes: vec![],
            }],
        };
        let content = assembler(live, None)
            .assemble(&ContentRequest::new(event(), Stage::LiveEvent))
            .await
            .unwrap();

        assert!(content.is_complete());
        assert!(content.body.contains("**Internacional** (4-2-3-1)"));
        assert!(content.body.contains("Rochet (1)"));
    }

    #[tokio::test]
    async fn test_post_event_penalties() {
        let request = ContentRequest::new(event(), Stage::PostEvent)
            .with_terminal(TerminalStatus::new(StatusCategory::FinishedNormal, "PEN"));
        let content = assembler(LiveDetail::default(), Some(final_result("PEN")))
            .assemble(&request)
            .await
            .unwrap();

        assert_eq!(
            content.title,
            "[POST-MATCH] | SERIE A | INTERNACIONAL 2 X 2 PALMEIRAS | Round 7"
        );
        assert!(content.body.contains("(penalties: 4 x 3)"));
        assert!(content.body.contains("Borré (12')"));
        assert!(content.body.contains("| Ball Possession | 55% | 45% |"));
        assert!(content.is_complete());
    }

    #[tokio::test]
    async fn test_post_event_irregular_without_data() {
        let request = ContentRequest::new(event(), Stage::PostEvent)
            .with_terminal(TerminalStatus::new(StatusCategory::FinishedIrregular, "ABD"));
        let content = assembler(LiveDetail::default(), None)
            .assemble(&request)
            .await
            .unwrap();

        assert!(content.title.contains("(ABANDONED)"));
        assert!(content.body.contains("did not finish normally: abandoned (ABD)"));
        assert_eq!(content.completeness, Completeness::Partial);
    }

    #[tokio::test]
    async fn test_post_event_requires_terminal() {
        let err = assembler(LiveDetail::default(), None)
            .assemble(&ContentRequest::new(event(), Stage::PostEvent))
            .await
            .unwrap_err();
        assert!(matches!(err, AssemblyError::Invalid(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_fallback_is_degraded() {
        let request = ContentRequest::new(event(), Stage::PostEvent)
            .with_terminal(TerminalStatus::new(StatusCategory::FinishedIrregular, "CANC"));
        let content = assembler(LiveDetail::default(), None).fallback(&request);

        assert_eq!(content.completeness, Completeness::Degraded);
        assert!(content.title.contains("(CANCELLED)"));
        assert!(content.body.contains("did not finish normally: cancelled"));
    }
}
