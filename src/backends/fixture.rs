// src/backends/fixture.rs

//! TOML-backed implementation of every backend trait.
//!
//! Drives the engine end to end without live services:
//!
//! ```toml
//! [availability]
//! similarity = false          # simulate an unreachable search index
//!
//! [latency]
//! reasoning = "200ms"
//!
//! [alert.ALERT-001.client]
//! client_id = "C123"
//! name = "Trader T12345"
//! risk_rating = "Medium"
//! trading_style = "Aggressive"
//!
//! [alert.ALERT-001.market]
//! symbol = "AAPL"
//! bid = 100.0
//! ask = 101.0
//! volume = 1000000
//!
//! [[alert.ALERT-001.trades]]
//! trade_id = "T1"
//! timestamp = "2025-01-13T10:00:00Z"
//! symbol = "AAPL"
//! price = 100.0
//! volume = 1000
//!
//! [alert.ALERT-001.assessment]
//! anomaly_score = 0.85
//! lower = 0.78
//! upper = 0.92
//! pattern_type = "Rapid cancel"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::sleep;
use tracing::debug;

use crate::backends::{
    AlertData, AnomalyAssessment, AnomalyModel, BackendError, BackendFuture, CaseQuery,
    CommunicationQuery, ReasoningRequest, ReasoningResponse, ReasoningService, SimilaritySearch,
    TradeDataSource, TradeFingerprint,
};
use crate::config::parse_duration;
use crate::context::{
    ClientProfile, CommunicationSignal, ConfidenceInterval, MarketData, PatternDetails,
    SimilarCase, TradeRecord,
};
use crate::errors::{EngineError, Result};
use crate::types::Recommendation;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureFile {
    #[serde(default)]
    pub availability: Availability,

    #[serde(default)]
    pub latency: LatencySection,

    /// Keyed by alert id.
    #[serde(default)]
    pub alert: BTreeMap<String, AlertFixture>,
}

/// Per-backend reachability switches; everything is reachable by default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Availability {
    #[serde(default = "reachable")]
    pub trade_data: bool,
    #[serde(default = "reachable")]
    pub anomaly_model: bool,
    #[serde(default = "reachable")]
    pub similarity: bool,
    #[serde(default = "reachable")]
    pub reasoning: bool,
}

fn reachable() -> bool {
    true
}

impl Default for Availability {
    fn default() -> Self {
        Self {
            trade_data: true,
            anomaly_model: true,
            similarity: true,
            reasoning: true,
        }
    }
}

/// Artificial per-call delay for each backend (e.g. `"250ms"`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LatencySection {
    pub trade_data: Option<String>,
    pub anomaly_model: Option<String>,
    pub similarity: Option<String>,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertFixture {
    pub client: ClientProfile,
    pub market: MarketData,
    #[serde(default)]
    pub trades: Vec<TradeRecord>,
    #[serde(default)]
    pub assessment: Option<AssessmentFixture>,
    #[serde(default)]
    pub similar_cases: Vec<SimilarCase>,
    #[serde(default)]
    pub communications: Vec<CommunicationSignal>,
    #[serde(default)]
    pub reasoning: Option<ReasoningFixture>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssessmentFixture {
    pub anomaly_score: f64,
    pub lower: f64,
    pub upper: f64,
    pub pattern_type: String,
    #[serde(default)]
    pub order_cancellation_rate: Option<f64>,
    #[serde(default)]
    pub order_timing: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReasoningFixture {
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub summary: String,
    #[serde(default)]
    pub evidence: BTreeMap<String, String>,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Latency {
    trade_data: Option<Duration>,
    anomaly_model: Option<Duration>,
    similarity: Option<Duration>,
    reasoning: Option<Duration>,
}

/// All four backends answered from a [`FixtureFile`].
#[derive(Debug, Clone)]
pub struct FixtureBackends {
    fixture: FixtureFile,
    latency: Latency,
    by_fingerprint: HashMap<TradeFingerprint, String>,
}

impl FixtureBackends {
    pub fn new(fixture: FixtureFile) -> Result<Self> {
        let latency = Latency {
            trade_data: fixture_latency("trade_data", fixture.latency.trade_data.as_deref())?,
            anomaly_model: fixture_latency(
                "anomaly_model",
                fixture.latency.anomaly_model.as_deref(),
            )?,
            similarity: fixture_latency("similarity", fixture.latency.similarity.as_deref())?,
            reasoning: fixture_latency("reasoning", fixture.latency.reasoning.as_deref())?,
        };

        let by_fingerprint = fixture
            .alert
            .iter()
            .filter(|(_, a)| !a.trades.is_empty())
            .map(|(id, a)| (TradeFingerprint::of(&a.trades), id.clone()))
            .collect();

        Ok(Self {
            fixture,
            latency,
            by_fingerprint,
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let fixture: FixtureFile = toml::from_str(contents)?;
        Self::new(fixture)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Alert ids present in the fixture.
    pub fn alert_ids(&self) -> impl Iterator<Item = &str> {
        self.fixture.alert.keys().map(|s| s.as_str())
    }

    pub fn availability(&self) -> &Availability {
        &self.fixture.availability
    }

    fn alert_for_trades(&self, trades: &[TradeRecord]) -> Option<&AlertFixture> {
        let id = self.by_fingerprint.get(&TradeFingerprint::of(trades))?;
        self.fixture.alert.get(id)
    }
}

fn fixture_latency(key: &str, value: Option<&str>) -> Result<Option<Duration>> {
    value
        .map(|s| {
            parse_duration(s)
                .map_err(|e| EngineError::FixtureError(format!("[latency].{key}: {e}")))
        })
        .transpose()
}

async fn simulate_latency(delay: Option<Duration>) {
    if let Some(d) = delay {
        sleep(d).await;
    }
}

impl TradeDataSource for FixtureBackends {
    fn fetch_alert_data<'a>(&'a self, alert_id: &'a str) -> BackendFuture<'a, AlertData> {
        Box::pin(async move {
            simulate_latency(self.latency.trade_data).await;

            if !self.fixture.availability.trade_data {
                return Err(BackendError::Unavailable("trade data store".to_string()));
            }

            let alert = self
                .fixture
                .alert
                .get(alert_id)
                .ok_or_else(|| BackendError::NotFound(format!("alert '{alert_id}'")))?;

            debug!(alert_id, trades = alert.trades.len(), "fixture: serving alert data");

            Ok(AlertData {
                trade_records: alert.trades.clone(),
                client_profile: alert.client.clone(),
                market_data: alert.market.clone(),
            })
        })
    }
}

impl AnomalyModel for FixtureBackends {
    fn score<'a>(&'a self, trades: &'a [TradeRecord]) -> BackendFuture<'a, AnomalyAssessment> {
        Box::pin(async move {
            simulate_latency(self.latency.anomaly_model).await;

            if !self.fixture.availability.anomaly_model {
                return Err(BackendError::Unavailable("anomaly model".to_string()));
            }

            let assessment = self
                .alert_for_trades(trades)
                .and_then(|a| a.assessment.as_ref())
                .ok_or_else(|| {
                    BackendError::NotFound("no model assessment for trade sequence".to_string())
                })?;

            Ok(AnomalyAssessment {
                anomaly_score: assessment.anomaly_score,
                confidence_interval: ConfidenceInterval::new(assessment.lower, assessment.upper),
                pattern_details: PatternDetails {
                    pattern_type: assessment.pattern_type.clone(),
                    order_cancellation_rate: assessment.order_cancellation_rate,
                    order_timing: assessment.order_timing.clone(),
                    historical_matching: true,
                },
            })
        })
    }
}

impl SimilaritySearch for FixtureBackends {
    fn find_similar_cases<'a>(
        &'a self,
        query: &'a CaseQuery,
    ) -> BackendFuture<'a, Vec<SimilarCase>> {
        Box::pin(async move {
            simulate_latency(self.latency.similarity).await;

            if !self.fixture.availability.similarity {
                return Err(BackendError::Unavailable("case library index".to_string()));
            }

            let mut cases = self
                .by_fingerprint
                .get(&query.fingerprint)
                .and_then(|id| self.fixture.alert.get(id))
                .map(|a| a.similar_cases.clone())
                .unwrap_or_default();

            cases.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
            cases.truncate(query.limit);
            Ok(cases)
        })
    }

    fn search_communications<'a>(
        &'a self,
        query: &'a CommunicationQuery,
    ) -> BackendFuture<'a, Vec<CommunicationSignal>> {
        Box::pin(async move {
            simulate_latency(self.latency.similarity).await;

            if !self.fixture.availability.similarity {
                return Err(BackendError::Unavailable("communications index".to_string()));
            }

            let mut hits: Vec<CommunicationSignal> = self
                .fixture
                .alert
                .values()
                .filter(|a| a.client.client_id == query.client_id)
                .flat_map(|a| a.communications.iter())
                .filter(|c| c.timestamp >= query.window_start && c.timestamp <= query.window_end)
                .cloned()
                .collect();

            hits.sort_by_key(|c| c.timestamp);
            hits.dedup();
            hits.truncate(query.limit);
            Ok(hits)
        })
    }
}

impl ReasoningService for FixtureBackends {
    fn synthesize<'a>(
        &'a self,
        request: ReasoningRequest<'a>,
    ) -> BackendFuture<'a, ReasoningResponse> {
        Box::pin(async move {
            simulate_latency(self.latency.reasoning).await;

            if !self.fixture.availability.reasoning {
                return Err(BackendError::Unavailable("reasoning service".to_string()));
            }

            let alert_id = request.context.alert_id();
            let answer = self
                .fixture
                .alert
                .get(alert_id)
                .and_then(|a| a.reasoning.as_ref())
                .ok_or_else(|| {
                    BackendError::Rejected(format!("no reasoning answer for alert '{alert_id}'"))
                })?;

            Ok(ReasoningResponse {
                recommendation: answer.recommendation,
                confidence: answer.confidence,
                summary: answer.summary.clone(),
                evidence: answer.evidence.clone(),
                suggested_actions: answer.suggested_actions.clone(),
            })
        })
    }
}
