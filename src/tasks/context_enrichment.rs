// src/tasks/context_enrichment.rs

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::backends::{CommunicationQuery, SimilaritySearch};
use crate::config::EnrichmentSettings;
use crate::context::{
    AlertContext, ContextField, EnrichmentUpdate, EvidenceCoverage, MarketContext, MarketData,
    PartialUpdate, TradeRecord,
};
use crate::tasks::{TaskError, TaskInput, TaskKind, TaskOutcome, missing_input};

/// Gathers communications around the alerted trades and derives market
/// context from the retrieved snapshot.
///
/// Market context is computed locally and always available. An unavailable
/// communication index is retried like any transient failure; once no retry
/// is left the task degrades to market context with reduced coverage.
#[derive(Debug, Clone)]
pub struct ContextEnrichment {
    similarity: Arc<dyn SimilaritySearch>,
    settings: EnrichmentSettings,
}

impl ContextEnrichment {
    pub fn new(similarity: Arc<dyn SimilaritySearch>, settings: EnrichmentSettings) -> Self {
        Self {
            similarity,
            settings,
        }
    }

    pub async fn execute(&self, input: &TaskInput) -> Result<TaskOutcome, TaskError> {
        let ctx = &input.context;
        let kind = TaskKind::ContextEnrichment;

        let trades = ctx
            .trade_records()
            .ok_or_else(|| missing_input(kind, ContextField::TradeRecords))?;
        let client = ctx
            .client_profile()
            .ok_or_else(|| missing_input(kind, ContextField::ClientProfile))?;
        let market = ctx
            .market_data()
            .ok_or_else(|| missing_input(kind, ContextField::MarketData))?;

        let market_context = derive_market_context(trades, market, &self.settings);
        let (window_start, window_end) = search_window(trades, self.settings.communication_window);

        let query = CommunicationQuery {
            client_id: client.client_id.clone(),
            symbol: market.symbol.clone(),
            window_start,
            window_end,
            limit: self.settings.communication_limit * ctx.context_depth().search_multiplier(),
        };

        match self.similarity.search_communications(&query).await {
            Ok(communication_signals) => {
                debug!(
                    alert_id = ctx.alert_id(),
                    communications = communication_signals.len(),
                    participation = market_context.participation_rate,
                    "context enrichment complete"
                );

                Ok(TaskOutcome::Success(PartialUpdate::Enrichment(
                    EnrichmentUpdate {
                        communication_signals,
                        market_context,
                        evidence_coverage: EvidenceCoverage::Full,
                    },
                )))
            }
            Err(err) if input.retry_on(&err) => Err(err.into()),
            Err(err) => {
                warn!(
                    alert_id = ctx.alert_id(),
                    attempt = input.attempt,
                    error = %err,
                    "communication search failed; evidence coverage reduced"
                );

                Ok(TaskOutcome::Degraded(
                    reduced(market_context),
                    format!("communication search failed ({err}); evidence coverage reduced"),
                ))
            }
        }
    }

    /// Market context alone, for when the communication search never
    /// answered. `None` if the retrieval data is missing.
    pub fn without_communications(&self, ctx: &AlertContext) -> Option<PartialUpdate> {
        let trades = ctx.trade_records()?;
        let market = ctx.market_data()?;
        Some(reduced(derive_market_context(trades, market, &self.settings)))
    }
}

fn reduced(market_context: MarketContext) -> PartialUpdate {
    PartialUpdate::Enrichment(EnrichmentUpdate {
        communication_signals: Vec::new(),
        market_context,
        evidence_coverage: EvidenceCoverage::Reduced,
    })
}

/// Participation rate, quoted spread and the two heuristic flags.
pub fn derive_market_context(
    trades: &[TradeRecord],
    market: &MarketData,
    settings: &EnrichmentSettings,
) -> MarketContext {
    let alert_volume: u64 = trades.iter().map(|t| t.volume).sum();

    // No market volume means the alert is the only observed activity.
    let participation_rate = if market.volume == 0 {
        if alert_volume == 0 { 0.0 } else { 1.0 }
    } else {
        alert_volume as f64 / market.volume as f64
    };

    let mid = (market.bid + market.ask) / 2.0;
    let spread_bps = if mid > 0.0 {
        ((market.ask - market.bid) / mid * 10_000.0).max(0.0)
    } else {
        0.0
    };

    MarketContext {
        participation_rate,
        spread_bps,
        volume_anomaly: participation_rate > settings.volume_participation_threshold,
        volatility_spike: spread_bps > settings.volatility_spread_bps,
    }
}

fn search_window(
    trades: &[TradeRecord],
    window: std::time::Duration,
) -> (OffsetDateTime, OffsetDateTime) {
    let first = trades
        .iter()
        .map(|t| t.timestamp)
        .min()
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let last = trades.iter().map(|t| t.timestamp).max().unwrap_or(first);

    let pad = time::Duration::try_from(window).unwrap_or(time::Duration::ZERO);
    (
        first.checked_sub(pad).unwrap_or(first),
        last.checked_add(pad).unwrap_or(last),
    )
}
