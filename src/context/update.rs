// src/context/update.rs

//! Partial updates returned by tasks.
//!
//! Each variant carries exactly the fields its task is allowed to write, so
//! two tasks can never produce overlapping updates.

use crate::context::alert::ContextField;
use crate::context::records::{
    ClientProfile, CommunicationSignal, ConfidenceInterval, Decision, EvidenceCoverage,
    MarketContext, MarketData, PatternDetails, SimilarCase, TradeRecord,
};
use crate::tasks::TaskKind;

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalUpdate {
    pub trade_records: Vec<TradeRecord>,
    pub client_profile: ClientProfile,
    pub market_data: MarketData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternUpdate {
    /// Absent when the anomaly model could not score the trades.
    pub anomaly_score: Option<f64>,
    pub confidence_interval: Option<ConfidenceInterval>,
    pub similar_cases: Vec<SimilarCase>,
    pub pattern_details: PatternDetails,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentUpdate {
    pub communication_signals: Vec<CommunicationSignal>,
    pub market_context: MarketContext,
    pub evidence_coverage: EvidenceCoverage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartialUpdate {
    Retrieval(RetrievalUpdate),
    Pattern(PatternUpdate),
    Enrichment(EnrichmentUpdate),
    Decision(Decision),
}

impl PartialUpdate {
    /// The only task variant allowed to produce this update.
    pub fn writer(&self) -> TaskKind {
        match self {
            PartialUpdate::Retrieval(_) => TaskKind::DataRetrieval,
            PartialUpdate::Pattern(_) => TaskKind::PatternAnalysis,
            PartialUpdate::Enrichment(_) => TaskKind::ContextEnrichment,
            PartialUpdate::Decision(_) => TaskKind::DecisionSynthesis,
        }
    }

    /// Fields written by this update.
    pub fn fields(&self) -> &'static [ContextField] {
        self.writer().writes()
    }
}
