// src/config/validate.rs

use std::collections::BTreeSet;
use std::time::Duration;

use regex::Regex;

use crate::config::duration::parse_duration;
use crate::config::model::{
    ConfigFile, EngineSection, EngineSettings, EnrichmentSection, EnrichmentSettings,
    PolicySection, RawConfigFile, Settings, ValidationSection,
};
use crate::errors::{EngineError, Result};
use crate::policy::PolicyThresholds;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = EngineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let settings = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, settings))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<Settings> {
    let engine = validate_engine(&cfg.engine)?;
    let policy = validate_policy(&cfg.policy)?;
    let enrichment = validate_enrichment(&cfg.enrichment)?;
    let alert_id_pattern = validate_alert_id_pattern(&cfg.validation)?;

    Ok(Settings {
        engine,
        policy,
        enrichment,
        alert_id_pattern,
    })
}

fn config_duration(section: &str, key: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| EngineError::ConfigError(format!("[{section}].{key}: {e}")))
}

fn validate_engine(section: &EngineSection) -> Result<EngineSettings> {
    if section.worker_pool_size == 0 {
        return Err(EngineError::ConfigError(
            "[engine].worker_pool_size must be >= 1 (got 0)".to_string(),
        ));
    }

    let task_timeout = config_duration("engine", "task_timeout", &section.task_timeout)?;
    if task_timeout.is_zero() {
        return Err(EngineError::ConfigError(
            "[engine].task_timeout must be greater than zero".to_string(),
        ));
    }

    let retry_backoff = config_duration("engine", "retry_backoff", &section.retry_backoff)?;

    let run_deadline = match section.run_deadline.as_deref() {
        Some(s) => {
            let d = config_duration("engine", "run_deadline", s)?;
            if d.is_zero() { None } else { Some(d) }
        }
        None => None,
    };

    let reasoning_timeout =
        config_duration("engine", "reasoning_timeout", &section.reasoning_timeout)?;
    if reasoning_timeout.is_zero() || reasoning_timeout >= task_timeout {
        return Err(EngineError::ConfigError(format!(
            "[engine].reasoning_timeout ({}) must be non-zero and shorter than task_timeout ({})",
            section.reasoning_timeout, section.task_timeout
        )));
    }

    Ok(EngineSettings {
        worker_pool_size: section.worker_pool_size,
        task_timeout,
        max_retries: section.max_retries,
        retry_backoff,
        run_deadline,
        reasoning_timeout,
    })
}

fn ensure_unit_interval(key: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(EngineError::ConfigError(format!(
            "[policy].{key} must be within [0, 1] (got {value})"
        )));
    }
    Ok(())
}

fn validate_policy(section: &PolicySection) -> Result<PolicyThresholds> {
    ensure_unit_interval("escalate_threshold", section.escalate_threshold)?;
    ensure_unit_interval("monitor_threshold", section.monitor_threshold)?;
    ensure_unit_interval("strong_match_similarity", section.strong_match_similarity)?;
    ensure_unit_interval("weak_match_similarity", section.weak_match_similarity)?;
    ensure_unit_interval("reasoning_acceptance", section.reasoning_acceptance)?;
    ensure_unit_interval(
        "degraded_interval_widening",
        section.degraded_interval_widening,
    )?;

    if section.monitor_threshold >= section.escalate_threshold {
        return Err(EngineError::ConfigError(format!(
            "[policy].monitor_threshold ({}) must be below escalate_threshold ({})",
            section.monitor_threshold, section.escalate_threshold
        )));
    }

    if section.weak_match_similarity > section.strong_match_similarity {
        return Err(EngineError::ConfigError(format!(
            "[policy].weak_match_similarity ({}) must not exceed strong_match_similarity ({})",
            section.weak_match_similarity, section.strong_match_similarity
        )));
    }

    let violation_categories: BTreeSet<String> = section
        .violation_categories
        .iter()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect();

    if violation_categories.is_empty() {
        return Err(EngineError::ConfigError(
            "[policy].violation_categories must name at least one category".to_string(),
        ));
    }

    Ok(PolicyThresholds {
        escalate_threshold: section.escalate_threshold,
        monitor_threshold: section.monitor_threshold,
        strong_match_similarity: section.strong_match_similarity,
        weak_match_similarity: section.weak_match_similarity,
        reasoning_acceptance: section.reasoning_acceptance,
        degraded_interval_widening: section.degraded_interval_widening,
        violation_categories,
    })
}

fn validate_enrichment(section: &EnrichmentSection) -> Result<EnrichmentSettings> {
    if section.similar_case_limit == 0 {
        return Err(EngineError::ConfigError(
            "[enrichment].similar_case_limit must be >= 1 (got 0)".to_string(),
        ));
    }

    let communication_window = config_duration(
        "enrichment",
        "communication_window",
        &section.communication_window,
    )?;

    if section.volume_participation_threshold <= 0.0 {
        return Err(EngineError::ConfigError(format!(
            "[enrichment].volume_participation_threshold must be positive (got {})",
            section.volume_participation_threshold
        )));
    }

    if section.volatility_spread_bps <= 0.0 {
        return Err(EngineError::ConfigError(format!(
            "[enrichment].volatility_spread_bps must be positive (got {})",
            section.volatility_spread_bps
        )));
    }

    Ok(EnrichmentSettings {
        similar_case_limit: section.similar_case_limit,
        communication_limit: section.communication_limit,
        communication_window,
        volume_participation_threshold: section.volume_participation_threshold,
        volatility_spread_bps: section.volatility_spread_bps,
    })
}

fn validate_alert_id_pattern(section: &ValidationSection) -> Result<Regex> {
    Regex::new(&section.alert_id_pattern).map_err(|e| {
        EngineError::ConfigError(format!(
            "[validation].alert_id_pattern is not a valid regex: {e}"
        ))
    })
}
