#![allow(dead_code)]

use std::collections::BTreeMap;

use time::OffsetDateTime;
use tradesight::backends::{AnomalyAssessment, ReasoningResponse};
use tradesight::config::{ConfigFile, RawConfigFile, Settings};
use tradesight::context::{
    ClientProfile, CommunicationSignal, ConfidenceInterval, MarketData, PatternDetails,
    SimilarCase, TradeRecord,
};
use tradesight::types::Recommendation;

use crate::fake_backends::AlertScenario;

/// 2025-01-13T10:00:00Z
pub const BASE_TIMESTAMP: i64 = 1_736_762_400;

pub fn at(offset_secs: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(BASE_TIMESTAMP + offset_secs)
        .expect("timestamp in range")
}

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the built-in defaults but with short timings so tests finish
/// quickly.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.engine.task_timeout = "500ms".to_string();
        config.engine.reasoning_timeout = "250ms".to_string();
        config.engine.retry_backoff = "5ms".to_string();
        config.engine.run_deadline = Some("5s".to_string());
        Self { config }
    }

    pub fn worker_pool_size(mut self, n: usize) -> Self {
        self.config.engine.worker_pool_size = n;
        self
    }

    pub fn task_timeout(mut self, d: &str) -> Self {
        self.config.engine.task_timeout = d.to_string();
        self
    }

    pub fn reasoning_timeout(mut self, d: &str) -> Self {
        self.config.engine.reasoning_timeout = d.to_string();
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.engine.max_retries = n;
        self
    }

    pub fn retry_backoff(mut self, d: &str) -> Self {
        self.config.engine.retry_backoff = d.to_string();
        self
    }

    pub fn run_deadline(mut self, d: Option<&str>) -> Self {
        self.config.engine.run_deadline = d.map(str::to_string);
        self
    }

    pub fn escalate_threshold(mut self, v: f64) -> Self {
        self.config.policy.escalate_threshold = v;
        self
    }

    pub fn monitor_threshold(mut self, v: f64) -> Self {
        self.config.policy.monitor_threshold = v;
        self
    }

    pub fn reasoning_acceptance(mut self, v: f64) -> Self {
        self.config.policy.reasoning_acceptance = v;
        self
    }

    pub fn alert_id_pattern(mut self, p: &str) -> Self {
        self.config.validation.alert_id_pattern = p.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    pub fn settings(self) -> Settings {
        self.build().into_settings()
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the data one alert resolves to in [`ScriptedBackends`].
///
/// [`ScriptedBackends`]: crate::fake_backends::ScriptedBackends
pub struct AlertScenarioBuilder {
    scenario: AlertScenario,
}

impl AlertScenarioBuilder {
    /// One AAPL trade for client C123, no assessment, no cases.
    pub fn new() -> Self {
        Self {
            scenario: AlertScenario {
                trades: vec![trade("T1", 0, 1_000)],
                client: ClientProfile {
                    client_id: "C123".to_string(),
                    name: "Trader T12345".to_string(),
                    risk_rating: "Medium".to_string(),
                    trading_style: "Aggressive".to_string(),
                },
                market: MarketData {
                    symbol: "AAPL".to_string(),
                    bid: 100.0,
                    ask: 100.1,
                    volume: 1_000_000,
                },
                assessment: None,
                similar_cases: Vec::new(),
                communications: Vec::new(),
                reasoning: None,
            },
        }
    }

    pub fn trades(mut self, trades: Vec<TradeRecord>) -> Self {
        self.scenario.trades = trades;
        self
    }

    pub fn client_id(mut self, id: &str) -> Self {
        self.scenario.client.client_id = id.to_string();
        self
    }

    pub fn market(mut self, bid: f64, ask: f64, volume: u64) -> Self {
        self.scenario.market.bid = bid;
        self.scenario.market.ask = ask;
        self.scenario.market.volume = volume;
        self
    }

    /// Anomaly score with a symmetric ±0.05 interval, clamped to [0, 1].
    pub fn score(self, score: f64) -> Self {
        self.score_within(score, (score - 0.05).max(0.0), (score + 0.05).min(1.0))
    }

    pub fn score_within(mut self, score: f64, lower: f64, upper: f64) -> Self {
        self.scenario.assessment = Some(AnomalyAssessment {
            anomaly_score: score,
            confidence_interval: ConfidenceInterval::new(lower, upper),
            pattern_details: PatternDetails {
                pattern_type: "Rapid order placement and cancellation".to_string(),
                order_cancellation_rate: Some(0.94),
                order_timing: Some("Within 2 seconds of placement".to_string()),
                historical_matching: true,
            },
        });
        self
    }

    pub fn similar_case(mut self, id: &str, similarity: f64, outcome: &str) -> Self {
        self.scenario.similar_cases.push(SimilarCase {
            case_id: id.to_string(),
            similarity,
            outcome: outcome.to_string(),
        });
        self
    }

    pub fn communication(mut self, offset_secs: i64, suspicious: bool) -> Self {
        self.scenario.communications.push(CommunicationSignal {
            channel: "chat".to_string(),
            timestamp: at(offset_secs),
            relevance: if suspicious { "high" } else { "low" }.to_string(),
            sentiment: "neutral".to_string(),
            suspicious,
        });
        self
    }

    pub fn reasoning(mut self, recommendation: Recommendation, confidence: f64) -> Self {
        let mut evidence = BTreeMap::new();
        evidence.insert(
            "reasoning".to_string(),
            format!("scripted answer with confidence {confidence:.2}"),
        );
        self.scenario.reasoning = Some(ReasoningResponse {
            recommendation,
            confidence,
            summary: format!("Reasoning service recommends {recommendation}"),
            evidence,
            suggested_actions: vec!["Follow scripted reasoning advice".to_string()],
        });
        self
    }

    /// Extra evidence claimed by the scripted reasoning answer. Call after
    /// [`reasoning`](Self::reasoning).
    pub fn reasoning_evidence(mut self, key: &str, value: &str) -> Self {
        if let Some(response) = self.scenario.reasoning.as_mut() {
            response.evidence.insert(key.to_string(), value.to_string());
        }
        self
    }

    pub fn build(self) -> AlertScenario {
        self.scenario
    }
}

impl Default for AlertScenarioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn trade(id: &str, offset_secs: i64, volume: u64) -> TradeRecord {
    TradeRecord {
        trade_id: id.to_string(),
        timestamp: at(offset_secs),
        symbol: "AAPL".to_string(),
        price: 100.0,
        volume,
        cancelled: false,
    }
}
