//! Configuration management for the matchday scheduler
//!
//! Configuration is loaded from a TOML file or from `MATCHDAY_*` environment
//! variables, validated once at startup and then converted into the typed
//! settings each component takes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::provider::ProviderConfig;
use crate::publisher::PublisherConfig;
use crate::scheduler::poller::PollingConfig;
use crate::scheduler::timing::TimingConfig;
use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Stage timing and host cadence
    pub schedule: ScheduleConfig,

    /// Live-status polling
    pub polling: PollingSettings,

    /// Content assembly retry budget
    pub assembly: AssemblyConfig,

    /// Idempotency ledger backend
    pub ledger: LedgerConfig,

    /// Data provider connection
    pub provider: ProviderSettings,

    /// Announcement sink
    pub publisher: PublisherSettings,

    /// Thread content extras
    pub content: ContentSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Stage offsets and host cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub pre_event_offset_hours: i64,
    pub live_event_offset_minutes: i64,
    pub typical_duration_minutes: i64,
    /// Sleep between ticks in `run` mode
    pub tick_interval_secs: u64,
    /// Maximum age of the cached event before it is fetched again
    pub event_refresh_hours: i64,
    pub event_cache_path: PathBuf,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            pre_event_offset_hours: 24,
            live_event_offset_minutes: 15,
            typical_duration_minutes: 120,
            tick_interval_secs: 300,
            event_refresh_hours: 24,
            event_cache_path: PathBuf::from("data/event-cache.json"),
        }
    }
}

impl ScheduleConfig {
    pub fn timing(&self) -> TimingConfig {
        TimingConfig::default()
            .with_pre_event_offset(chrono::Duration::hours(self.pre_event_offset_hours))
            .with_live_event_offset(chrono::Duration::minutes(self.live_event_offset_minutes))
            .with_typical_duration(chrono::Duration::minutes(self.typical_duration_minutes))
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    #[must_use]
    pub fn event_refresh(&self) -> chrono::Duration {
        chrono::Duration::hours(self.event_refresh_hours)
    }
}

/// Live-status polling cadence and throttling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_secs: u64,
    pub error_threshold: u32,
    pub throttle_factor: u32,
    pub pre_start_threshold: u32,
    pub max_duration_minutes: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_secs: 120,
            error_threshold: 5,
            throttle_factor: 5,
            pre_start_threshold: 30,
            max_duration_minutes: 240,
        }
    }
}

impl PollingSettings {
    pub fn to_polling_config(&self) -> PollingConfig {
        PollingConfig::default()
            .with_interval(Duration::from_secs(self.interval_secs))
            .with_max_duration(Duration::from_secs(self.max_duration_minutes * 60))
            .with_throttle(self.error_threshold, self.pre_start_threshold, self.throttle_factor)
    }
}

/// Content assembly retry budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay grows by this much per attempt (10s, 20s, ...)
    pub backoff_step_secs: u64,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step_secs: 10,
        }
    }
}

impl AssemblyConfig {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::linear(
            self.max_attempts.saturating_sub(1),
            Duration::from_secs(self.backoff_step_secs),
        )
    }
}

/// Which store backs the idempotency ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// Lost on exit; dry runs and tests only
    Memory,
    #[default]
    File,
    Sqlite,
    Redis,
}

impl LedgerBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Sqlite => "sqlite",
            Self::Redis => "redis",
        }
    }

    /// Whether publication records survive a restart
    pub fn is_durable(&self) -> bool {
        !matches!(self, Self::Memory)
    }
}

impl fmt::Display for LedgerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" | "json" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            "redis" => Ok(Self::Redis),
            other => anyhow::bail!("unknown ledger backend: {other}"),
        }
    }
}

/// Idempotency ledger location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    /// JSON file or SQLite database path
    pub path: PathBuf,
    pub redis_url: String,
    pub key_prefix: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::File,
            path: PathBuf::from("data/thread-state.json"),
            redis_url: String::from("redis://127.0.0.1:6379"),
            key_prefix: String::from("matchday"),
        }
    }
}

/// Data provider connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: String,
    pub api_host: String,
    pub team_id: u64,
    pub season: i32,
    pub requests_per_minute: u32,
    /// Calls per UTC day; 0 disables the budget
    pub daily_quota: u32,
    pub quota_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        let defaults = ProviderConfig::default();
        Self {
            base_url: defaults.base_url,
            api_key: String::new(),
            api_host: defaults.api_host,
            team_id: defaults.team_id,
            season: defaults.season,
            requests_per_minute: defaults.requests_per_minute,
            daily_quota: 100,
            quota_path: Some(PathBuf::from("data/api-calls.json")),
            request_timeout_secs: 30,
        }
    }
}

impl ProviderSettings {
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            api_key: self.api_key.clone(),
            api_host: self.api_host.clone(),
            team_id: self.team_id,
            season: self.season,
            requests_per_minute: self.requests_per_minute,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..Default::default()
        }
    }
}

/// Announcement sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    /// Log announcements instead of submitting them
    pub dry_run: bool,
    pub subreddit: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
    pub auth_url: String,
    pub api_url: String,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        let defaults = PublisherConfig::default();
        Self {
            dry_run: true,
            subreddit: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            username: String::new(),
            password: String::new(),
            user_agent: defaults.user_agent,
            auth_url: defaults.auth_url,
            api_url: defaults.api_url,
        }
    }
}

impl PublisherSettings {
    pub fn to_publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            subreddit: self.subreddit.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            user_agent: self.user_agent.clone(),
            auth_url: self.auth_url.trim_end_matches('/').to_string(),
            api_url: self.api_url.trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }
}

/// Thread content extras
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSettings {
    /// Finished fixtures per team in the recent form section; 0 disables it
    pub form_matches: u8,
    /// JSON file of opponent nicknames used in thread titles
    pub nicknames_path: Option<PathBuf>,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            form_matches: crate::content::markdown::DEFAULT_FORM_MATCHES,
            nicknames_path: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_string(keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| std::env::var(key).ok())
        .filter(|v| !v.is_empty())
}

fn env_flag(keys: &[&str]) -> Option<bool> {
    env_string(keys).map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        let schedule = &mut config.schedule;
        if let Some(v) = env_parse("MATCHDAY_PRE_EVENT_OFFSET_HOURS") {
            schedule.pre_event_offset_hours = v;
        }
        if let Some(v) = env_parse("MATCHDAY_LIVE_EVENT_OFFSET_MINUTES") {
            schedule.live_event_offset_minutes = v;
        }
        if let Some(v) = env_parse("MATCHDAY_TYPICAL_DURATION_MINUTES") {
            schedule.typical_duration_minutes = v;
        }
        if let Some(v) = env_parse("MATCHDAY_TICK_INTERVAL_SECS") {
            schedule.tick_interval_secs = v;
        }
        if let Some(v) = env_parse("MATCHDAY_EVENT_REFRESH_HOURS") {
            schedule.event_refresh_hours = v;
        }
        if let Some(v) = env_string(&["MATCHDAY_EVENT_CACHE_PATH"]) {
            schedule.event_cache_path = PathBuf::from(v);
        }

        let polling = &mut config.polling;
        if let Some(v) = env_parse("MATCHDAY_POLL_INTERVAL_SECS") {
            polling.interval_secs = v;
        }
        if let Some(v) = env_parse("MATCHDAY_POLL_ERROR_THRESHOLD") {
            polling.error_threshold = v;
        }
        if let Some(v) = env_parse("MATCHDAY_POLL_THROTTLE_FACTOR") {
            polling.throttle_factor = v;
        }
        if let Some(v) = env_parse("MATCHDAY_POLL_MAX_DURATION_MINUTES") {
            polling.max_duration_minutes = v;
        }

        if let Some(v) = env_parse("MATCHDAY_ASSEMBLY_MAX_ATTEMPTS") {
            config.assembly.max_attempts = v;
        }
        if let Some(v) = env_parse("MATCHDAY_ASSEMBLY_BACKOFF_SECS") {
            config.assembly.backoff_step_secs = v;
        }

        let ledger = &mut config.ledger;
        if let Some(v) = env_string(&["MATCHDAY_LEDGER_BACKEND"]) {
            ledger.backend = v.parse()?;
        }
        if let Some(v) = env_string(&["MATCHDAY_LEDGER_PATH"]) {
            ledger.path = PathBuf::from(v);
        }
        if let Some(v) = env_string(&["MATCHDAY_REDIS_URL", "REDIS_URL"]) {
            ledger.redis_url = v;
        }
        if let Some(v) = env_string(&["MATCHDAY_LEDGER_KEY_PREFIX"]) {
            ledger.key_prefix = v;
        }

        let provider = &mut config.provider;
        if let Some(v) = env_string(&["MATCHDAY_API_BASE_URL"]) {
            provider.base_url = v;
        }
        if let Some(v) = env_string(&["MATCHDAY_API_KEY", "RAPIDAPI_KEY"]) {
            provider.api_key = v;
        }
        if let Some(v) = env_string(&["MATCHDAY_API_HOST", "RAPIDAPI_HOST"]) {
            provider.api_host = v;
        }
        if let Some(v) = env_parse("MATCHDAY_TEAM_ID") {
            provider.team_id = v;
        }
        if let Some(v) = env_parse("MATCHDAY_SEASON") {
            provider.season = v;
        }
        if let Some(v) = env_parse("MATCHDAY_REQUESTS_PER_MINUTE") {
            provider.requests_per_minute = v;
        }
        if let Some(v) = env_parse("MATCHDAY_DAILY_QUOTA") {
            provider.daily_quota = v;
        }

        let publisher = &mut config.publisher;
        if let Some(v) = env_flag(&["MATCHDAY_DRY_RUN", "DRY_RUN"]) {
            publisher.dry_run = v;
        }
        if let Some(v) = env_string(&["MATCHDAY_SUBREDDIT", "REDDIT_SUBREDDIT"]) {
            publisher.subreddit = v;
        }
        if let Some(v) = env_string(&["MATCHDAY_REDDIT_CLIENT_ID", "REDDIT_CLIENT_ID"]) {
            publisher.client_id = v;
        }
        if let Some(v) = env_string(&["MATCHDAY_REDDIT_CLIENT_SECRET", "REDDIT_CLIENT_SECRET"]) {
            publisher.client_secret = v;
        }
        if let Some(v) = env_string(&["MATCHDAY_REDDIT_USERNAME", "REDDIT_USERNAME"]) {
            publisher.username = v;
        }
        if let Some(v) = env_string(&["MATCHDAY_REDDIT_PASSWORD", "REDDIT_PASSWORD"]) {
            publisher.password = v;
        }
        if let Some(v) = env_string(&["MATCHDAY_USER_AGENT", "REDDIT_USER_AGENT"]) {
            publisher.user_agent = v;
        }

        if let Some(v) = env_parse("MATCHDAY_FORM_MATCHES") {
            config.content.form_matches = v;
        }
        if let Some(v) = env_string(&["MATCHDAY_NICKNAMES_PATH"]) {
            config.content.nicknames_path = Some(PathBuf::from(v));
        }

        if let Some(v) = env_string(&["MATCHDAY_LOG_LEVEL"]) {
            config.logging.level = v;
        }
        if let Some(v) = env_string(&["MATCHDAY_LOG_FORMAT"]) {
            config.logging.format = v;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let schedule = &self.schedule;
        if schedule.pre_event_offset_hours < 0
            || schedule.live_event_offset_minutes < 0
            || schedule.typical_duration_minutes <= 0
        {
            anyhow::bail!("schedule offsets must be non-negative and typical_duration_minutes positive");
        }

        if schedule.live_event_offset_minutes > schedule.pre_event_offset_hours * 60 {
            anyhow::bail!("live_event_offset_minutes must not exceed pre_event_offset_hours");
        }

        if schedule.tick_interval_secs == 0 {
            anyhow::bail!("tick_interval_secs must be greater than 0");
        }

        if self.polling.interval_secs == 0 {
            anyhow::bail!("polling.interval_secs must be greater than 0");
        }

        if self.polling.throttle_factor < 1 {
            anyhow::bail!("polling.throttle_factor must be at least 1");
        }

        if self.polling.max_duration_minutes == 0 {
            anyhow::bail!("polling.max_duration_minutes must be greater than 0");
        }

        if self.assembly.max_attempts == 0 {
            anyhow::bail!("assembly.max_attempts must be greater than 0");
        }

        if self.ledger.backend == LedgerBackend::Redis && self.ledger.redis_url.is_empty() {
            anyhow::bail!("ledger.redis_url is required for the redis backend");
        }

        if self.provider.requests_per_minute == 0 {
            anyhow::bail!("provider.requests_per_minute must be greater than 0");
        }

        if self.content.form_matches > 10 {
            anyhow::bail!("content.form_matches must be at most 10");
        }

        if !self.publisher.dry_run && self.publisher.subreddit.is_empty() {
            anyhow::bail!("publisher.subreddit is required unless dry_run is set");
        }

        Ok(())
    }

    /// Get provider request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.publisher.dry_run);
        assert_eq!(config.ledger.backend, LedgerBackend::File);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.polling.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.assembly.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.polling.throttle_factor = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.schedule.pre_event_offset_hours = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.publisher.dry_run = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_assembly_retry_conversion() {
        let retry = AssemblyConfig::default().to_retry_config();
        assert_eq!(retry.max_attempts(), 3);
        assert_eq!(retry.delay_for(1), Duration::from_secs(10));
        assert_eq!(retry.delay_for(2), Duration::from_secs(20));
    }

    #[test]
    fn test_timing_conversion() {
        let timing = ScheduleConfig::default().timing();
        assert_eq!(timing.pre_event_offset, chrono::Duration::hours(24));
        assert_eq!(timing.live_event_offset, chrono::Duration::minutes(15));
        assert_eq!(timing.typical_duration, chrono::Duration::minutes(120));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [ledger]
            backend = "sqlite"
            path = "data/ledger.db"

            [polling]
            interval_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.ledger.backend, LedgerBackend::Sqlite);
        assert_eq!(config.polling.interval_secs, 60);
        assert_eq!(config.polling.error_threshold, 5);
        assert_eq!(config.schedule.pre_event_offset_hours, 24);
        assert_eq!(config.content.form_matches, 5);
        assert!(config.content.nicknames_path.is_none());
    }

    #[test]
    fn test_content_section() {
        let config: Config = toml::from_str(
            r#"
            [content]
            form_matches = 3
            nicknames_path = "nicknames.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.content.form_matches, 3);
        assert_eq!(
            config.content.nicknames_path.as_deref(),
            Some(Path::new("nicknames.json"))
        );
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.content.form_matches = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ledger_backend_parse() {
        assert_eq!("Redis".parse::<LedgerBackend>().unwrap(), LedgerBackend::Redis);
        assert_eq!("json".parse::<LedgerBackend>().unwrap(), LedgerBackend::File);
        assert!("postgres".parse::<LedgerBackend>().is_err());
        assert!(!LedgerBackend::Memory.is_durable());
    }
}
