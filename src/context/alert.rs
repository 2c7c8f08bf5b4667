// src/context/alert.rs

use std::fmt;

use serde::Serialize;

use crate::context::records::{
    ClientProfile, CommunicationSignal, ConfidenceInterval, Decision, EvidenceCoverage,
    MarketContext, MarketData, PatternDetails, SimilarCase, TradeRecord,
};
use crate::types::{ConfidenceLevel, ContextDepth, Priority, Recommendation};

/// Every field of [`AlertContext`] that a task may read or write.
///
/// Used for merge diagnostics and for the "inputs used" column of the audit
/// trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextField {
    AlertId,
    Priority,
    ContextDepth,
    TradeRecords,
    ClientProfile,
    MarketData,
    AnomalyScore,
    ConfidenceInterval,
    SimilarCases,
    PatternDetails,
    CommunicationSignals,
    MarketContext,
    EvidenceCoverage,
    Decision,
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContextField::AlertId => "alert_id",
            ContextField::Priority => "priority",
            ContextField::ContextDepth => "context_depth",
            ContextField::TradeRecords => "trade_records",
            ContextField::ClientProfile => "client_profile",
            ContextField::MarketData => "market_data",
            ContextField::AnomalyScore => "anomaly_score",
            ContextField::ConfidenceInterval => "confidence_interval",
            ContextField::SimilarCases => "similar_cases",
            ContextField::PatternDetails => "pattern_details",
            ContextField::CommunicationSignals => "communication_signals",
            ContextField::MarketContext => "market_context",
            ContextField::EvidenceCoverage => "evidence_coverage",
            ContextField::Decision => "decision",
        };
        f.write_str(s)
    }
}

/// Shared state of one alert analysis.
///
/// Fields start empty and are filled exactly once, each by a single task
/// variant, through [`crate::context::Merger`]. Tasks only ever see a shared
/// (`Arc`) snapshot; there is no way to mutate a context from outside the
/// `context` module.
#[derive(Debug, Clone, Serialize)]
pub struct AlertContext {
    pub(super) alert_id: String,
    pub(super) priority: Priority,
    pub(super) context_depth: ContextDepth,

    pub(super) trade_records: Option<Vec<TradeRecord>>,
    pub(super) client_profile: Option<ClientProfile>,
    pub(super) market_data: Option<MarketData>,

    pub(super) anomaly_score: Option<f64>,
    pub(super) confidence_interval: Option<ConfidenceInterval>,
    pub(super) similar_cases: Option<Vec<SimilarCase>>,
    pub(super) pattern_details: Option<PatternDetails>,

    pub(super) communication_signals: Option<Vec<CommunicationSignal>>,
    pub(super) market_context: Option<MarketContext>,
    pub(super) evidence_coverage: Option<EvidenceCoverage>,

    pub(super) decision: Option<Decision>,

    #[serde(skip)]
    pub(super) finalized: bool,
}

impl AlertContext {
    pub fn new(alert_id: impl Into<String>, priority: Priority, context_depth: ContextDepth) -> Self {
        Self {
            alert_id: alert_id.into(),
            priority,
            context_depth,
            trade_records: None,
            client_profile: None,
            market_data: None,
            anomaly_score: None,
            confidence_interval: None,
            similar_cases: None,
            pattern_details: None,
            communication_signals: None,
            market_context: None,
            evidence_coverage: None,
            decision: None,
            finalized: false,
        }
    }

    pub fn alert_id(&self) -> &str {
        &self.alert_id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn context_depth(&self) -> ContextDepth {
        self.context_depth
    }

    pub fn trade_records(&self) -> Option<&[TradeRecord]> {
        self.trade_records.as_deref()
    }

    pub fn client_profile(&self) -> Option<&ClientProfile> {
        self.client_profile.as_ref()
    }

    pub fn market_data(&self) -> Option<&MarketData> {
        self.market_data.as_ref()
    }

    pub fn anomaly_score(&self) -> Option<f64> {
        self.anomaly_score
    }

    pub fn confidence_interval(&self) -> Option<ConfidenceInterval> {
        self.confidence_interval
    }

    pub fn similar_cases(&self) -> Option<&[SimilarCase]> {
        self.similar_cases.as_deref()
    }

    pub fn pattern_details(&self) -> Option<&PatternDetails> {
        self.pattern_details.as_ref()
    }

    pub fn communication_signals(&self) -> Option<&[CommunicationSignal]> {
        self.communication_signals.as_deref()
    }

    pub fn market_context(&self) -> Option<&MarketContext> {
        self.market_context.as_ref()
    }

    pub fn evidence_coverage(&self) -> Option<EvidenceCoverage> {
        self.evidence_coverage
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    pub fn recommendation(&self) -> Option<Recommendation> {
        self.decision.as_ref().map(|d| d.recommendation)
    }

    pub fn confidence_level(&self) -> Option<ConfidenceLevel> {
        self.decision.as_ref().map(|d| d.confidence_level)
    }

    /// True once the decision has been merged; no further update is accepted.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Whether the given field currently holds a value.
    pub fn is_set(&self, field: ContextField) -> bool {
        match field {
            ContextField::AlertId | ContextField::Priority | ContextField::ContextDepth => true,
            ContextField::TradeRecords => self.trade_records.is_some(),
            ContextField::ClientProfile => self.client_profile.is_some(),
            ContextField::MarketData => self.market_data.is_some(),
            ContextField::AnomalyScore => self.anomaly_score.is_some(),
            ContextField::ConfidenceInterval => self.confidence_interval.is_some(),
            ContextField::SimilarCases => self.similar_cases.is_some(),
            ContextField::PatternDetails => self.pattern_details.is_some(),
            ContextField::CommunicationSignals => self.communication_signals.is_some(),
            ContextField::MarketContext => self.market_context.is_some(),
            ContextField::EvidenceCoverage => self.evidence_coverage.is_some(),
            ContextField::Decision => self.decision.is_some(),
        }
    }
}
