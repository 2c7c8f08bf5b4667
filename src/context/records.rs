// src/context/records.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{ConfidenceLevel, Recommendation};

/// A single execution belonging to the alerted activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub symbol: String,
    pub price: f64,
    pub volume: u64,
    /// Whether the order behind this record was cancelled before filling.
    #[serde(default)]
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub client_id: String,
    pub name: String,
    pub risk_rating: String,
    pub trading_style: String,
}

/// Market snapshot for the alert's time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    /// Total market volume traded in the window.
    pub volume: u64,
}

/// Bounds around an anomaly score, `lower <= upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Widen both sides by `amount`, clamped to `[0, 1]`.
    pub fn widened(self, amount: f64) -> Self {
        Self {
            lower: (self.lower - amount).max(0.0),
            upper: (self.upper + amount).min(1.0),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// A historical case resembling the alerted pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarCase {
    pub case_id: String,
    pub similarity: f64,
    /// Outcome label of the historical case (e.g. `"SPOOFING"`, `"CLEARED"`).
    pub outcome: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDetails {
    pub pattern_type: String,
    #[serde(default)]
    pub order_cancellation_rate: Option<f64>,
    #[serde(default)]
    pub order_timing: Option<String>,
    /// False when historical matching was unavailable and the score is
    /// purely statistical.
    #[serde(default = "default_true")]
    pub historical_matching: bool,
}

fn default_true() -> bool {
    true
}

/// A communication surfaced by semantic search near the alerted trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationSignal {
    /// Channel, e.g. `"email"` or `"chat"`.
    pub channel: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub relevance: String,
    pub sentiment: String,
    #[serde(default)]
    pub suspicious: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    /// Alert volume as a share of market volume.
    pub participation_rate: f64,
    pub spread_bps: f64,
    pub volume_anomaly: bool,
    pub volatility_spike: bool,
}

/// How complete the evidentiary picture from enrichment is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceCoverage {
    Full,
    Reduced,
}

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionBasis {
    ReasoningService,
    FallbackPolicy,
}

/// The output of decision synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub recommendation: Recommendation,
    pub confidence_level: ConfidenceLevel,
    pub summary: String,
    /// Claim → supporting fact.
    pub evidence: BTreeMap<String, String>,
    pub suggested_actions: Vec<String>,
    pub basis: DecisionBasis,
}
