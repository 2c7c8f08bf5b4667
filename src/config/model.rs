// src/config/model.rs

use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::policy::PolicyThresholds;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [engine]
/// worker_pool_size = 4
/// task_timeout = "5s"
/// max_retries = 2
///
/// [policy]
/// escalate_threshold = 0.75
/// violation_categories = ["SPOOFING", "LAYERING"]
///
/// [validation]
/// alert_id_pattern = "^ALERT-[0-9]+$"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub policy: PolicySection,

    #[serde(default)]
    pub enrichment: EnrichmentSection,

    #[serde(default)]
    pub validation: ValidationSection,
}

/// A validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>`, so holding one means
/// every threshold, duration and pattern has been checked and resolved into
/// [`Settings`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineSection,
    pub policy: PolicySection,
    pub enrichment: EnrichmentSection,
    pub validation: ValidationSection,
    settings: Settings,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, settings: Settings) -> Self {
        Self {
            engine: raw.engine,
            policy: raw.policy,
            enrichment: raw.enrichment,
            validation: raw.validation,
            settings,
        }
    }

    /// Resolved, typed settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }
}

/// `[engine]` section: scheduling, timeouts and retries.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Maximum number of task attempts executing at once across all runs.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Hard limit for a single task attempt (e.g. `"5s"`).
    #[serde(default = "default_task_timeout")]
    pub task_timeout: String,

    /// Additional attempts allowed after a transient failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between attempts of the same task.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: String,

    /// Deadline for a whole alert analysis; `None` disables it.
    #[serde(default = "default_run_deadline")]
    pub run_deadline: Option<String>,

    /// Budget for one reasoning-service call inside decision synthesis.
    /// Must be shorter than `task_timeout` so the fallback policy still runs.
    #[serde(default = "default_reasoning_timeout")]
    pub reasoning_timeout: String,
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_task_timeout() -> String {
    "5s".to_string()
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff() -> String {
    "100ms".to_string()
}

fn default_run_deadline() -> Option<String> {
    Some("30s".to_string())
}

fn default_reasoning_timeout() -> String {
    "3s".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            task_timeout: default_task_timeout(),
            max_retries: default_max_retries(),
            retry_backoff: default_retry_backoff(),
            run_deadline: default_run_deadline(),
            reasoning_timeout: default_reasoning_timeout(),
        }
    }
}

/// `[policy]` section: fallback decision thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    #[serde(default = "default_escalate_threshold")]
    pub escalate_threshold: f64,

    #[serde(default = "default_monitor_threshold")]
    pub monitor_threshold: f64,

    /// Similarity at or above which a violation case is a qualifying match.
    #[serde(default = "default_strong_match_similarity")]
    pub strong_match_similarity: f64,

    /// Similarity at or above which a violation case counts as weak
    /// corroboration.
    #[serde(default = "default_weak_match_similarity")]
    pub weak_match_similarity: f64,

    /// Reasoning-service answers below this self-confidence are discarded.
    #[serde(default = "default_reasoning_acceptance")]
    pub reasoning_acceptance: f64,

    /// Amount added to each side of the confidence interval when scoring
    /// without historical matches.
    #[serde(default = "default_degraded_interval_widening")]
    pub degraded_interval_widening: f64,

    /// Case outcome labels that denote a confirmed violation.
    #[serde(default = "default_violation_categories")]
    pub violation_categories: Vec<String>,
}

fn default_escalate_threshold() -> f64 {
    0.75
}

fn default_monitor_threshold() -> f64 {
    0.5
}

fn default_strong_match_similarity() -> f64 {
    0.85
}

fn default_weak_match_similarity() -> f64 {
    0.6
}

fn default_reasoning_acceptance() -> f64 {
    0.7
}

fn default_degraded_interval_widening() -> f64 {
    0.1
}

fn default_violation_categories() -> Vec<String> {
    [
        "SPOOFING",
        "LAYERING",
        "WASH_TRADING",
        "INSIDER_TRADING",
        "FRONT_RUNNING",
        "MARKING_THE_CLOSE",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            escalate_threshold: default_escalate_threshold(),
            monitor_threshold: default_monitor_threshold(),
            strong_match_similarity: default_strong_match_similarity(),
            weak_match_similarity: default_weak_match_similarity(),
            reasoning_acceptance: default_reasoning_acceptance(),
            degraded_interval_widening: default_degraded_interval_widening(),
            violation_categories: default_violation_categories(),
        }
    }
}

/// `[enrichment]` section: search limits and market-context heuristics.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnrichmentSection {
    #[serde(default = "default_similar_case_limit")]
    pub similar_case_limit: usize,

    #[serde(default = "default_communication_limit")]
    pub communication_limit: usize,

    /// Time window around the alert's trades searched for communications.
    #[serde(default = "default_communication_window")]
    pub communication_window: String,

    /// Share of market volume above which the alert's trading is flagged.
    #[serde(default = "default_volume_participation_threshold")]
    pub volume_participation_threshold: f64,

    /// Quoted spread (basis points) above which volatility is flagged.
    #[serde(default = "default_volatility_spread_bps")]
    pub volatility_spread_bps: f64,
}

fn default_similar_case_limit() -> usize {
    5
}

fn default_communication_limit() -> usize {
    10
}

fn default_communication_window() -> String {
    "30m".to_string()
}

fn default_volume_participation_threshold() -> f64 {
    0.05
}

fn default_volatility_spread_bps() -> f64 {
    50.0
}

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self {
            similar_case_limit: default_similar_case_limit(),
            communication_limit: default_communication_limit(),
            communication_window: default_communication_window(),
            volume_participation_threshold: default_volume_participation_threshold(),
            volatility_spread_bps: default_volatility_spread_bps(),
        }
    }
}

/// `[validation]` section: inbound request checks.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationSection {
    #[serde(default = "default_alert_id_pattern")]
    pub alert_id_pattern: String,
}

pub(crate) fn default_alert_id_pattern() -> String {
    "^[A-Za-z0-9][A-Za-z0-9_.:-]{0,127}$".to_string()
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            alert_id_pattern: default_alert_id_pattern(),
        }
    }
}

/// Typed engine settings resolved from `[engine]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub worker_pool_size: usize,
    pub task_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub run_deadline: Option<Duration>,
    pub reasoning_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            task_timeout: Duration::from_secs(5),
            max_retries: default_max_retries(),
            retry_backoff: Duration::from_millis(100),
            run_deadline: Some(Duration::from_secs(30)),
            reasoning_timeout: Duration::from_secs(3),
        }
    }
}

/// Typed enrichment settings resolved from `[enrichment]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichmentSettings {
    pub similar_case_limit: usize,
    pub communication_limit: usize,
    pub communication_window: Duration,
    pub volume_participation_threshold: f64,
    pub volatility_spread_bps: f64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            similar_case_limit: default_similar_case_limit(),
            communication_limit: default_communication_limit(),
            communication_window: Duration::from_secs(30 * 60),
            volume_participation_threshold: default_volume_participation_threshold(),
            volatility_spread_bps: default_volatility_spread_bps(),
        }
    }
}

/// Everything the engine needs at runtime, fully typed.
#[derive(Debug, Clone)]
pub struct Settings {
    pub engine: EngineSettings,
    pub policy: PolicyThresholds,
    pub enrichment: EnrichmentSettings,
    pub alert_id_pattern: Regex,
}
