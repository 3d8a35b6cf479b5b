//! Tests for `src/logging.rs`.

use discord_relay::logging::{LoggingGuard, LOG_FILE_PREFIX};

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn log_prefix_names_the_binary() {
    assert!(LOG_FILE_PREFIX.starts_with("discord-relay"));
}

#[test]
fn init_production_creates_logs_dir() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs");
    assert!(!logs_dir.exists());

    // Only one global subscriber can be installed per process, so the result
    // may be an error; the directory is created first either way.
    let _result = discord_relay::logging::init_production(&logs_dir);
    assert!(logs_dir.exists(), "logs directory should be created");
}

#[test]
fn init_cli_tolerates_existing_subscriber() {
    discord_relay::logging::init_cli();
    discord_relay::logging::init_cli();
}
