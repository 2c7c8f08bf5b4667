use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use tradesight::config::{load_and_validate, load_or_default, parse_duration};
use tradesight::errors::EngineError;
use tradesight_test_utils::builders::ConfigFileBuilder;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn expect_config_error(contents: &str) -> String {
    match load_and_validate(write_config(contents).path()) {
        Err(EngineError::ConfigError(msg)) => msg,
        Err(e) => panic!("Expected ConfigError, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_empty_file_yields_defaults() {
    let cfg = load_and_validate(write_config("").path()).unwrap();
    let s = cfg.settings();

    assert_eq!(s.engine.worker_pool_size, 4);
    assert_eq!(s.engine.task_timeout, Duration::from_secs(5));
    assert_eq!(s.engine.max_retries, 2);
    assert_eq!(s.engine.retry_backoff, Duration::from_millis(100));
    assert_eq!(s.engine.run_deadline, Some(Duration::from_secs(30)));
    assert_eq!(s.engine.reasoning_timeout, Duration::from_secs(3));
    assert_eq!(s.policy.escalate_threshold, 0.75);
    assert_eq!(s.policy.monitor_threshold, 0.5);
    assert!(s.policy.violation_categories.contains("SPOOFING"));
    assert_eq!(s.enrichment.similar_case_limit, 5);
    assert_eq!(s.enrichment.communication_window, Duration::from_secs(1800));
    assert!(s.alert_id_pattern.is_match("ALERT-2025-0001"));
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_or_default(dir.path().join("TradeSight.toml")).unwrap();
    assert_eq!(cfg.settings().engine.worker_pool_size, 4);
}

#[test]
fn test_full_config_is_resolved() {
    let file = write_config(
        r#"
[engine]
worker_pool_size = 8
task_timeout = "2s"
max_retries = 0
retry_backoff = "0ms"
run_deadline = "0s"
reasoning_timeout = "1500ms"

[policy]
escalate_threshold = 0.8
monitor_threshold = 0.4
violation_categories = [" spoofing ", "layering", ""]

[enrichment]
similar_case_limit = 3
communication_window = "1h"

[validation]
alert_id_pattern = "^ALERT-[0-9]+$"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    let s = cfg.settings();

    assert_eq!(s.engine.worker_pool_size, 8);
    assert_eq!(s.engine.task_timeout, Duration::from_secs(2));
    assert_eq!(s.engine.max_retries, 0);
    assert_eq!(s.engine.retry_backoff, Duration::ZERO);
    // A zero deadline disables it.
    assert_eq!(s.engine.run_deadline, None);
    assert_eq!(s.engine.reasoning_timeout, Duration::from_millis(1500));
    assert_eq!(
        s.policy.violation_categories.iter().collect::<Vec<_>>(),
        vec!["LAYERING", "SPOOFING"]
    );
    assert_eq!(s.enrichment.similar_case_limit, 3);
    assert_eq!(s.enrichment.communication_window, Duration::from_secs(3600));
    assert!(s.alert_id_pattern.is_match("ALERT-7"));
    assert!(!s.alert_id_pattern.is_match("alert-7"));

    // Raw sections are kept alongside the resolved settings.
    assert_eq!(cfg.engine.task_timeout, "2s");
}

#[test]
fn test_unknown_field_is_rejected() {
    let file = write_config(
        r#"
[engine]
worker_pool_size = 2
shiny = true
"#,
    );

    match load_and_validate(file.path()) {
        Err(EngineError::TomlError(e)) => assert!(e.to_string().contains("shiny")),
        other => panic!("Expected TomlError, got: {other:?}"),
    }
}

#[test]
fn test_inverted_thresholds_are_rejected() {
    let msg = expect_config_error(
        r#"
[policy]
escalate_threshold = 0.4
monitor_threshold = 0.6
"#,
    );
    assert!(msg.contains("monitor_threshold"));
    assert!(msg.contains("escalate_threshold"));
}

#[test]
fn test_threshold_outside_unit_interval_is_rejected() {
    let msg = expect_config_error(
        r#"
[policy]
reasoning_acceptance = 1.5
"#,
    );
    assert!(msg.contains("reasoning_acceptance"));
}

#[test]
fn test_weak_similarity_above_strong_is_rejected() {
    let msg = expect_config_error(
        r#"
[policy]
weak_match_similarity = 0.9
strong_match_similarity = 0.8
"#,
    );
    assert!(msg.contains("weak_match_similarity"));
}

#[test]
fn test_empty_violation_categories_are_rejected() {
    let msg = expect_config_error(
        r#"
[policy]
violation_categories = ["  "]
"#,
    );
    assert!(msg.contains("violation_categories"));
}

#[test]
fn test_reasoning_timeout_must_be_shorter_than_task_timeout() {
    let msg = expect_config_error(
        r#"
[engine]
task_timeout = "1s"
reasoning_timeout = "1s"
"#,
    );
    assert!(msg.contains("reasoning_timeout"));
}

#[test]
fn test_zero_worker_pool_is_rejected() {
    let msg = expect_config_error(
        r#"
[engine]
worker_pool_size = 0
"#,
    );
    assert!(msg.contains("worker_pool_size"));
}

#[test]
fn test_bad_duration_names_the_key() {
    let msg = expect_config_error(
        r#"
[engine]
task_timeout = "soon"
"#,
    );
    assert!(msg.contains("[engine].task_timeout"));
}

#[test]
fn test_invalid_alert_id_regex_is_rejected() {
    let msg = expect_config_error(
        r#"
[validation]
alert_id_pattern = "^ALERT-(["
"#,
    );
    assert!(msg.contains("alert_id_pattern"));
}

#[test]
fn test_builder_rejects_what_the_file_loader_rejects() {
    let raw = ConfigFileBuilder::new()
        .escalate_threshold(0.3)
        .monitor_threshold(0.6)
        .raw();
    assert!(matches!(
        tradesight::config::ConfigFile::try_from(raw),
        Err(EngineError::ConfigError(_))
    ));
}

#[test]
fn test_parse_duration_units() {
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
    assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
    assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("5 parsecs").is_err());
}

#[test]
fn test_oversized_duration_is_rejected() {
    let err = parse_duration("9999999999999999h").unwrap_err();
    assert!(err.contains("too large"), "unexpected error: {err}");
    assert!(parse_duration("9999999999999999m").is_ok());

    let msg = expect_config_error(
        r#"
[engine]
task_timeout = "9999999999999999h"
"#,
    );
    assert!(msg.contains("[engine].task_timeout"));
}
