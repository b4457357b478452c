//! Tests for config module

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use serial_test::serial;
use tempfile::NamedTempFile;

use matchday::config::{Config, LedgerBackend};

const ENV_KEYS: &[&str] = &[
    "MATCHDAY_PRE_EVENT_OFFSET_HOURS",
    "MATCHDAY_POLL_INTERVAL_SECS",
    "MATCHDAY_LEDGER_BACKEND",
    "MATCHDAY_LEDGER_PATH",
    "MATCHDAY_DRY_RUN",
    "DRY_RUN",
    "MATCHDAY_SUBREDDIT",
    "REDDIT_SUBREDDIT",
    "MATCHDAY_API_KEY",
    "RAPIDAPI_KEY",
    "MATCHDAY_TEAM_ID",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();

    let config = Config::from_env().unwrap();

    assert_eq!(config.schedule.pre_event_offset_hours, 24);
    assert_eq!(config.schedule.live_event_offset_minutes, 15);
    assert_eq!(config.polling.interval_secs, 120);
    assert_eq!(config.ledger.backend, LedgerBackend::File);
    assert_eq!(config.ledger.path, PathBuf::from("data/thread-state.json"));
    assert!(config.publisher.dry_run);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    std::env::set_var("MATCHDAY_PRE_EVENT_OFFSET_HOURS", "12");
    std::env::set_var("MATCHDAY_POLL_INTERVAL_SECS", "60");
    std::env::set_var("MATCHDAY_LEDGER_BACKEND", "sqlite");
    std::env::set_var("MATCHDAY_LEDGER_PATH", "/var/lib/matchday/ledger.db");
    std::env::set_var("MATCHDAY_TEAM_ID", "121");

    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(config.schedule.pre_event_offset_hours, 12);
    assert_eq!(config.polling.to_polling_config().interval, Duration::from_secs(60));
    assert_eq!(config.ledger.backend, LedgerBackend::Sqlite);
    assert_eq!(config.ledger.path, PathBuf::from("/var/lib/matchday/ledger.db"));
    assert_eq!(config.provider.team_id, 121);
}

#[test]
#[serial]
fn test_from_env_legacy_names() {
    clear_env();
    std::env::set_var("DRY_RUN", "false");
    std::env::set_var("REDDIT_SUBREDDIT", "Internacional");
    std::env::set_var("RAPIDAPI_KEY", "secret-key");

    let config = Config::from_env().unwrap();
    clear_env();

    assert!(!config.publisher.dry_run);
    assert_eq!(config.publisher.subreddit, "Internacional");
    assert_eq!(config.provider.api_key, "secret-key");
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_from_env_rejects_unknown_backend() {
    clear_env();
    std::env::set_var("MATCHDAY_LEDGER_BACKEND", "postgres");

    let result = Config::from_env();
    clear_env();

    assert!(result.is_err());
}

#[test]
fn test_live_publishing_requires_subreddit() {
    let mut config = Config::default();
    config.publisher.dry_run = false;
    config.publisher.subreddit.clear();
    assert!(config.validate().is_err());
}

#[test]
fn test_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[schedule]
pre_event_offset_hours = 6
live_event_offset_minutes = 30
tick_interval_secs = 60

[polling]
interval_secs = 90
max_duration_minutes = 180

[assembly]
max_attempts = 5
backoff_step_secs = 15

[ledger]
backend = "redis"
redis_url = "redis://cache:6379"
key_prefix = "inter"

[publisher]
dry_run = false
subreddit = "Internacional"

[logging]
level = "debug"
format = "json"
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    config.validate().unwrap();

    let timing = config.schedule.timing();
    assert_eq!(timing.pre_event_offset, chrono::Duration::hours(6));
    assert_eq!(timing.live_event_offset, chrono::Duration::minutes(30));
    assert_eq!(config.schedule.tick_interval(), Duration::from_secs(60));

    let polling = config.polling.to_polling_config();
    assert_eq!(polling.interval, Duration::from_secs(90));
    assert_eq!(polling.max_duration, Duration::from_secs(180 * 60));

    let retry = config.assembly.to_retry_config();
    assert_eq!(retry.max_attempts(), 5);
    assert_eq!(retry.delay_for(2), Duration::from_secs(30));

    assert_eq!(config.ledger.backend, LedgerBackend::Redis);
    assert_eq!(config.ledger.key_prefix, "inter");
    assert_eq!(config.logging.format, "json");
    // sections left out keep their defaults
    assert_eq!(config.provider.daily_quota, 100);
}

#[test]
fn test_from_file_missing() {
    let result = Config::from_file(std::path::Path::new("does-not-exist.toml"));
    assert!(result.is_err());
}
