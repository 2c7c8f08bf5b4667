// src/tasks/pattern_analysis.rs

use std::sync::Arc;

use tracing::{debug, warn};

use crate::backends::{AnomalyModel, BackendError, CaseQuery, SimilaritySearch, TradeFingerprint};
use crate::context::{ContextField, PartialUpdate, PatternDetails, PatternUpdate};
use crate::tasks::{TaskError, TaskInput, TaskKind, TaskOutcome, missing_input};

/// Scores the alert's trades and looks up resembling historical cases.
///
/// Outages of either backend are retried while attempts remain. On the last
/// attempt the task degrades instead of failing: without the case library it
/// keeps the statistical score with a widened interval and
/// `historical_matching = false`; without the model it reports the historical
/// matches alone and leaves the score unset. It fails only when neither
/// source answers.
#[derive(Debug, Clone)]
pub struct PatternAnalysis {
    model: Arc<dyn AnomalyModel>,
    similarity: Arc<dyn SimilaritySearch>,
    case_limit: usize,
    interval_widening: f64,
}

impl PatternAnalysis {
    pub fn new(
        model: Arc<dyn AnomalyModel>,
        similarity: Arc<dyn SimilaritySearch>,
        case_limit: usize,
        interval_widening: f64,
    ) -> Self {
        Self {
            model,
            similarity,
            case_limit,
            interval_widening,
        }
    }

    pub async fn execute(&self, input: &TaskInput) -> Result<TaskOutcome, TaskError> {
        let ctx = &input.context;
        let trades = ctx
            .trade_records()
            .ok_or_else(|| missing_input(TaskKind::PatternAnalysis, ContextField::TradeRecords))?;

        let query = CaseQuery {
            fingerprint: TradeFingerprint::of(trades),
            limit: self.case_limit * ctx.context_depth().search_multiplier(),
        };

        let assessment = match self.model.score(trades).await {
            Ok(assessment) => assessment,
            Err(err) if input.retry_on(&err) => return Err(err.into()),
            Err(err) => return self.unscored(input, &query, err).await,
        };

        match self.similarity.find_similar_cases(&query).await {
            Ok(similar_cases) => {
                debug!(
                    alert_id = ctx.alert_id(),
                    score = assessment.anomaly_score,
                    cases = similar_cases.len(),
                    fingerprint = %query.fingerprint,
                    "pattern analysis complete"
                );

                Ok(TaskOutcome::Success(PartialUpdate::Pattern(PatternUpdate {
                    anomaly_score: Some(assessment.anomaly_score),
                    confidence_interval: Some(assessment.confidence_interval),
                    similar_cases,
                    pattern_details: assessment.pattern_details,
                })))
            }
            Err(err) if input.retry_on(&err) => Err(err.into()),
            Err(err) => {
                warn!(
                    alert_id = ctx.alert_id(),
                    attempt = input.attempt,
                    error = %err,
                    "similarity search failed; using statistical score only"
                );

                let mut pattern_details = assessment.pattern_details;
                pattern_details.historical_matching = false;

                let update = PatternUpdate {
                    anomaly_score: Some(assessment.anomaly_score),
                    confidence_interval: Some(
                        assessment
                            .confidence_interval
                            .widened(self.interval_widening),
                    ),
                    similar_cases: Vec::new(),
                    pattern_details,
                };

                Ok(TaskOutcome::Degraded(
                    PartialUpdate::Pattern(update),
                    format!(
                        "historical case search failed ({err}); statistical-only score, \
                         confidence interval widened by {}",
                        self.interval_widening
                    ),
                ))
            }
        }
    }

    /// Historical matches without a score, after the model failed for good.
    async fn unscored(
        &self,
        input: &TaskInput,
        query: &CaseQuery,
        model_err: BackendError,
    ) -> Result<TaskOutcome, TaskError> {
        let alert_id = input.context.alert_id();

        let similar_cases = match self.similarity.find_similar_cases(query).await {
            Ok(cases) => cases,
            Err(search_err) if input.retry_on(&search_err) => return Err(search_err.into()),
            Err(search_err) => {
                warn!(
                    alert_id,
                    model_error = %model_err,
                    search_error = %search_err,
                    "anomaly model and similarity search both failed"
                );
                return Err(model_err.into());
            }
        };

        warn!(
            alert_id,
            error = %model_err,
            cases = similar_cases.len(),
            "anomaly model failed; reporting historical matches only"
        );

        let reason = format!(
            "anomaly model failed ({model_err}); no score, {} historical case(s) retrieved",
            similar_cases.len()
        );
        let update = PatternUpdate {
            anomaly_score: None,
            confidence_interval: None,
            similar_cases,
            pattern_details: PatternDetails {
                pattern_type: "Unscored".to_string(),
                order_cancellation_rate: None,
                order_timing: None,
                historical_matching: true,
            },
        };

        Ok(TaskOutcome::Degraded(PartialUpdate::Pattern(update), reason))
    }
}
