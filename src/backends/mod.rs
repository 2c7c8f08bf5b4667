// src/backends/mod.rs

//! Interfaces to the external collaborators of the engine.
//!
//! The engine never talks to a database, model server or search index
//! directly; tasks go through these traits so that production adapters,
//! the TOML-backed [`fixture`] implementation and test fakes are
//! interchangeable.
//!
//! Every backend must report unavailability as [`BackendError::Unavailable`]
//! rather than an empty result, so tasks can record a degraded outcome
//! instead of a false-negative success.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;

use crate::context::{
    AlertContext, ClientProfile, CommunicationSignal, ConfidenceInterval, MarketData,
    PatternDetails, SimilarCase, TradeRecord,
};
use crate::tasks::TaskKind;
use crate::types::Recommendation;

pub mod fixture;

pub use fixture::FixtureBackends;

/// Names recorded in the audit trail as data sources consulted.
pub mod sources {
    pub const TRADE_DB: &str = "trade_db";
    pub const CLIENT_PROFILE: &str = "client_profile";
    pub const MARKET_FEED: &str = "market_feed";
    pub const ANOMALY_MODEL: &str = "anomaly_model";
    pub const CASE_LIBRARY: &str = "case_library";
    pub const COMMUNICATIONS_INDEX: &str = "communications_index";
    pub const REASONING_SERVICE: &str = "reasoning_service";
    pub const DECISION_POLICY: &str = "decision_policy";
}

/// Errors surfaced by backend calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The requested entity does not exist. Never retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend could not be reached or timed out. Retryable.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the request as malformed. Never retried.
    #[error("request rejected: {0}")]
    Rejected(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Boxed future returned by backend calls.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = BackendResult<T>> + Send + 'a>>;

/// Foundational data for one alert.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertData {
    pub trade_records: Vec<TradeRecord>,
    pub client_profile: ClientProfile,
    pub market_data: MarketData,
}

/// Query-by-alert store for trades, client records and market snapshots.
pub trait TradeDataSource: Send + Sync + Debug {
    fn fetch_alert_data<'a>(&'a self, alert_id: &'a str) -> BackendFuture<'a, AlertData>;
}

/// Result of statistical scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyAssessment {
    pub anomaly_score: f64,
    pub confidence_interval: ConfidenceInterval,
    pub pattern_details: PatternDetails,
}

/// Statistical / ML scoring of a trade sequence.
pub trait AnomalyModel: Send + Sync + Debug {
    fn score<'a>(&'a self, trades: &'a [TradeRecord]) -> BackendFuture<'a, AnomalyAssessment>;
}

/// Content fingerprint of a trade sequence, used as the similarity key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradeFingerprint(String);

impl TradeFingerprint {
    /// BLAKE3 over the trades' identifying fields, in trade-id order so the
    /// fingerprint does not depend on retrieval order.
    pub fn of(trades: &[TradeRecord]) -> Self {
        let mut sorted: Vec<&TradeRecord> = trades.iter().collect();
        sorted.sort_by(|a, b| a.trade_id.cmp(&b.trade_id));

        let mut hasher = blake3::Hasher::new();
        for t in sorted {
            hasher.update(t.trade_id.as_bytes());
            hasher.update(b"\x1f");
            hasher.update(t.symbol.as_bytes());
            hasher.update(b"\x1f");
            hasher.update(&t.price.to_le_bytes());
            hasher.update(&t.volume.to_le_bytes());
            hasher.update(&[u8::from(t.cancelled)]);
            hasher.update(&t.timestamp.unix_timestamp_nanos().to_le_bytes());
            hasher.update(b"\x1e");
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TradeFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseQuery {
    pub fingerprint: TradeFingerprint,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunicationQuery {
    pub client_id: String,
    pub symbol: String,
    pub window_start: OffsetDateTime,
    pub window_end: OffsetDateTime,
    pub limit: usize,
}

/// Vector-similarity search over the historical case library and the
/// communications archive.
pub trait SimilaritySearch: Send + Sync + Debug {
    /// Ranked historical matches, most similar first.
    fn find_similar_cases<'a>(&'a self, query: &'a CaseQuery)
        -> BackendFuture<'a, Vec<SimilarCase>>;

    /// Communications relevant to the client and symbol within the window.
    fn search_communications<'a>(
        &'a self,
        query: &'a CommunicationQuery,
    ) -> BackendFuture<'a, Vec<CommunicationSignal>>;
}

/// Aggregated context handed to the reasoning service.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningRequest<'a> {
    pub context: &'a AlertContext,
    /// Upstream tasks that finished degraded.
    pub degraded: &'a [TaskKind],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningResponse {
    pub recommendation: Recommendation,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
    pub summary: String,
    pub evidence: BTreeMap<String, String>,
    pub suggested_actions: Vec<String>,
}

/// Natural-language reasoning over the aggregated evidence.
pub trait ReasoningService: Send + Sync + Debug {
    fn synthesize<'a>(&'a self, request: ReasoningRequest<'a>)
        -> BackendFuture<'a, ReasoningResponse>;
}

/// The full set of collaborators a run needs.
#[derive(Debug, Clone)]
pub struct Backends {
    pub trade_data: Arc<dyn TradeDataSource>,
    pub anomaly_model: Arc<dyn AnomalyModel>,
    pub similarity: Arc<dyn SimilaritySearch>,
    pub reasoning: Arc<dyn ReasoningService>,
}

impl Backends {
    /// Use one object for every role.
    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: TradeDataSource + AnomalyModel + SimilaritySearch + ReasoningService + 'static,
    {
        Self {
            trade_data: backend.clone(),
            anomaly_model: backend.clone(),
            similarity: backend.clone(),
            reasoning: backend,
        }
    }
}
