// src/engine/request.rs

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::audit::AuditTrail;
use crate::context::AlertContext;
use crate::types::{ConfidenceLevel, ContextDepth, Priority, Recommendation};

/// Inbound request to analyze one alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub alert_id: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub context_depth: ContextDepth,
}

impl AnalysisRequest {
    pub fn new(alert_id: impl Into<String>) -> Self {
        Self {
            alert_id: alert_id.into(),
            priority: Priority::default(),
            context_depth: ContextDepth::default(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context_depth(mut self, context_depth: ContextDepth) -> Self {
        self.context_depth = context_depth;
        self
    }
}

/// Checks requests before any task is scheduled.
#[derive(Debug, Clone)]
pub struct RequestValidator {
    alert_id_pattern: Regex,
}

impl RequestValidator {
    pub fn new(alert_id_pattern: Regex) -> Self {
        Self { alert_id_pattern }
    }

    pub fn validate(&self, request: &AnalysisRequest) -> Result<(), String> {
        if request.alert_id.trim().is_empty() {
            return Err("alert_id must not be empty".to_string());
        }
        if !self.alert_id_pattern.is_match(&request.alert_id) {
            return Err(format!(
                "alert_id '{}' does not match pattern {}",
                request.alert_id,
                self.alert_id_pattern.as_str()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reasoning {
    pub summary: String,
    pub evidence: BTreeMap<String, String>,
}

/// Result returned to the caller for a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResponse {
    pub alert_id: String,
    pub recommendation: Recommendation,
    pub confidence_level: ConfidenceLevel,
    pub reasoning: Reasoning,
    pub suggested_actions: Vec<String>,
    pub audit_trace_id: Ulid,
    pub data_sources_consulted: Vec<String>,
}

impl AnalysisResponse {
    /// `None` unless the context holds a decision.
    pub fn from_run(context: &AlertContext, audit: &AuditTrail) -> Option<Self> {
        let decision = context.decision()?;
        Some(Self {
            alert_id: context.alert_id().to_string(),
            recommendation: decision.recommendation,
            confidence_level: decision.confidence_level,
            reasoning: Reasoning {
                summary: decision.summary.clone(),
                evidence: decision.evidence.clone(),
            },
            suggested_actions: decision.suggested_actions.clone(),
            audit_trace_id: audit.trace_id(),
            data_sources_consulted: audit.data_sources_consulted(),
        })
    }
}
