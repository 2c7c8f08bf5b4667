// src/context/merge.rs

//! Deterministic merge of partial updates into an [`AlertContext`].
//!
//! A merge either applies every field of the update or none of them: all
//! checks run before the first write.

use thiserror::Error;
use tracing::debug;

use crate::context::alert::{AlertContext, ContextField};
use crate::context::update::PartialUpdate;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MergeError {
    #[error("context for alert '{0}' is finalized; no further updates are accepted")]
    Finalized(String),

    #[error("field '{0}' is already set and cannot be written twice")]
    FieldAlreadySet(ContextField),

    #[error("field '{field}' value {value} is outside [0, 1]")]
    OutOfRange { field: ContextField, value: f64 },

    #[error("confidence interval is inverted (lower {lower} > upper {upper})")]
    InvertedInterval { lower: f64, upper: f64 },

    #[error("anomaly score {score} lies outside its confidence interval [{lower}, {upper}]")]
    ScoreOutsideInterval { score: f64, lower: f64, upper: f64 },

    #[error("anomaly score and confidence interval must be set together")]
    UnpairedScore,
}

/// Applies partial updates to a context.
#[derive(Debug, Clone, Copy, Default)]
pub struct Merger;

impl Merger {
    /// Validate `update` against `ctx` and, if it passes, publish every field
    /// it carries. Merging a decision finalizes the context.
    ///
    /// Returns the fields that were written. A pattern update without a
    /// score leaves the score and its interval unset.
    pub fn apply(
        ctx: &mut AlertContext,
        update: PartialUpdate,
    ) -> Result<Vec<ContextField>, MergeError> {
        Self::check(ctx, &update)?;

        let fields = update.fields();
        match update {
            PartialUpdate::Retrieval(u) => {
                ctx.trade_records = Some(u.trade_records);
                ctx.client_profile = Some(u.client_profile);
                ctx.market_data = Some(u.market_data);
            }
            PartialUpdate::Pattern(u) => {
                ctx.anomaly_score = u.anomaly_score;
                ctx.confidence_interval = u.confidence_interval;
                ctx.similar_cases = Some(u.similar_cases);
                ctx.pattern_details = Some(u.pattern_details);
            }
            PartialUpdate::Enrichment(u) => {
                ctx.communication_signals = Some(u.communication_signals);
                ctx.market_context = Some(u.market_context);
                ctx.evidence_coverage = Some(u.evidence_coverage);
            }
            PartialUpdate::Decision(d) => {
                ctx.decision = Some(d);
                ctx.finalized = true;
            }
        }

        let written: Vec<ContextField> = fields
            .iter()
            .copied()
            .filter(|f| ctx.is_set(*f))
            .collect();
        debug!(alert_id = %ctx.alert_id, fields = ?written, "merged partial update");
        Ok(written)
    }

    /// Run every check `apply` would run, without writing anything.
    pub fn check(ctx: &AlertContext, update: &PartialUpdate) -> Result<(), MergeError> {
        if ctx.finalized {
            return Err(MergeError::Finalized(ctx.alert_id.clone()));
        }

        for field in update.fields() {
            if ctx.is_set(*field) {
                return Err(MergeError::FieldAlreadySet(*field));
            }
        }

        match update {
            PartialUpdate::Pattern(u) => {
                if let Some(score) = u.anomaly_score {
                    unit_range(ContextField::AnomalyScore, score)?;
                }
                if let Some(ci) = u.confidence_interval {
                    unit_range(ContextField::ConfidenceInterval, ci.lower)?;
                    unit_range(ContextField::ConfidenceInterval, ci.upper)?;
                    if ci.lower > ci.upper {
                        return Err(MergeError::InvertedInterval {
                            lower: ci.lower,
                            upper: ci.upper,
                        });
                    }
                }
                match (u.anomaly_score, u.confidence_interval) {
                    (Some(score), Some(ci)) if !ci.contains(score) => {
                        return Err(MergeError::ScoreOutsideInterval {
                            score,
                            lower: ci.lower,
                            upper: ci.upper,
                        });
                    }
                    (Some(_), None) | (None, Some(_)) => {
                        return Err(MergeError::UnpairedScore);
                    }
                    _ => {}
                }
                for case in &u.similar_cases {
                    unit_range(ContextField::SimilarCases, case.similarity)?;
                }
            }
            PartialUpdate::Retrieval(_)
            | PartialUpdate::Enrichment(_)
            | PartialUpdate::Decision(_) => {}
        }

        Ok(())
    }
}

fn unit_range(field: ContextField, value: f64) -> Result<(), MergeError> {
    // NaN fails this check too.
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MergeError::OutOfRange { field, value })
    }
}
