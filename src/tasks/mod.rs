// src/tasks/mod.rs

//! The four analysis tasks of the alert graph.
//!
//! Every task exposes the same capability, [`Task::execute`]: it reads a
//! shared snapshot of the [`AlertContext`] and returns a [`TaskOutcome`]
//! carrying a partial update. Tasks never mutate the context themselves.
//!
//! - [`data_retrieval`] loads the foundational trade/client/market data.
//! - [`pattern_analysis`] scores the trades and finds similar cases.
//! - [`context_enrichment`] gathers communications and market context.
//! - [`decision_synthesis`] turns everything into a recommendation.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::backends::{BackendError, Backends, sources};
use crate::config::Settings;
use crate::context::{AlertContext, ContextField, PartialUpdate};
use crate::policy::DecisionPolicy;

pub mod context_enrichment;
pub mod data_retrieval;
pub mod decision_synthesis;
pub mod pattern_analysis;

pub use context_enrichment::ContextEnrichment;
pub use data_retrieval::DataRetrieval;
pub use decision_synthesis::DecisionSynthesis;
pub use pattern_analysis::PatternAnalysis;

/// Identifies a task variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    DataRetrieval,
    PatternAnalysis,
    ContextEnrichment,
    DecisionSynthesis,
}

/// What the scheduler does when a task cannot produce its update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Downstream tasks cannot run without this data: abort the run.
    AbortRun,
    /// Record the task as degraded and carry on without its fields.
    Degrade,
    /// Produce the update locally with the deterministic decision policy.
    PolicyFallback,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::DataRetrieval,
        TaskKind::PatternAnalysis,
        TaskKind::ContextEnrichment,
        TaskKind::DecisionSynthesis,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TaskKind::DataRetrieval => "data_retrieval",
            TaskKind::PatternAnalysis => "pattern_analysis",
            TaskKind::ContextEnrichment => "context_enrichment",
            TaskKind::DecisionSynthesis => "decision_synthesis",
        }
    }

    /// Context fields the task reads.
    pub fn reads(self) -> &'static [ContextField] {
        match self {
            TaskKind::DataRetrieval => &[ContextField::AlertId],
            TaskKind::PatternAnalysis => &[ContextField::TradeRecords, ContextField::ContextDepth],
            TaskKind::ContextEnrichment => &[
                ContextField::TradeRecords,
                ContextField::ClientProfile,
                ContextField::MarketData,
                ContextField::ContextDepth,
            ],
            TaskKind::DecisionSynthesis => &[
                ContextField::TradeRecords,
                ContextField::ClientProfile,
                ContextField::MarketData,
                ContextField::AnomalyScore,
                ContextField::ConfidenceInterval,
                ContextField::SimilarCases,
                ContextField::PatternDetails,
                ContextField::CommunicationSignals,
                ContextField::MarketContext,
                ContextField::EvidenceCoverage,
            ],
        }
    }

    /// Context fields the task writes. No two kinds share a field.
    pub fn writes(self) -> &'static [ContextField] {
        match self {
            TaskKind::DataRetrieval => &[
                ContextField::TradeRecords,
                ContextField::ClientProfile,
                ContextField::MarketData,
            ],
            TaskKind::PatternAnalysis => &[
                ContextField::AnomalyScore,
                ContextField::ConfidenceInterval,
                ContextField::SimilarCases,
                ContextField::PatternDetails,
            ],
            TaskKind::ContextEnrichment => &[
                ContextField::CommunicationSignals,
                ContextField::MarketContext,
                ContextField::EvidenceCoverage,
            ],
            TaskKind::DecisionSynthesis => &[ContextField::Decision],
        }
    }

    /// External sources a task consults on every attempt.
    pub fn data_sources(self) -> &'static [&'static str] {
        match self {
            TaskKind::DataRetrieval => &[
                sources::TRADE_DB,
                sources::CLIENT_PROFILE,
                sources::MARKET_FEED,
            ],
            TaskKind::PatternAnalysis => &[sources::ANOMALY_MODEL, sources::CASE_LIBRARY],
            TaskKind::ContextEnrichment => &[sources::COMMUNICATIONS_INDEX],
            TaskKind::DecisionSynthesis => &[sources::REASONING_SERVICE],
        }
    }

    pub fn failure_policy(self) -> FailurePolicy {
        match self {
            TaskKind::DataRetrieval => FailurePolicy::AbortRun,
            TaskKind::PatternAnalysis | TaskKind::ContextEnrichment => FailurePolicy::Degrade,
            TaskKind::DecisionSynthesis => FailurePolicy::PolicyFallback,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a task that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(PartialUpdate),
    /// Usable, but based on incomplete external data.
    Degraded(PartialUpdate, String),
    /// Data required downstream could not be produced.
    Fatal(String),
}

/// Attempt-level failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Network trouble or timeout; eligible for retry.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl From<BackendError> for TaskError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(_) => TaskError::Transient(err.to_string()),
            BackendError::NotFound(_) | BackendError::Rejected(_) => {
                TaskError::Permanent(err.to_string())
            }
        }
    }
}

/// What a task receives: a shared, read-only snapshot plus the upstream
/// tasks that finished degraded.
#[derive(Debug, Clone)]
pub struct TaskInput {
    pub context: Arc<AlertContext>,
    pub degraded: Vec<TaskKind>,
    /// 1-based attempt number.
    pub attempt: u32,
    /// No retry follows this attempt. Tasks that can degrade do so only
    /// on their last attempt and report outages as transient before that.
    pub final_attempt: bool,
}

impl TaskInput {
    pub fn new(context: Arc<AlertContext>, degraded: Vec<TaskKind>) -> Self {
        Self {
            context,
            degraded,
            attempt: 1,
            final_attempt: true,
        }
    }

    pub fn for_attempt(&self, attempt: u32, final_attempt: bool) -> Self {
        Self {
            attempt,
            final_attempt,
            ..self.clone()
        }
    }

    /// Whether a backend failure should be retried rather than absorbed.
    pub(crate) fn retry_on(&self, err: &BackendError) -> bool {
        !self.final_attempt && matches!(err, BackendError::Unavailable(_))
    }
}

pub(crate) fn missing_input(kind: TaskKind, field: ContextField) -> TaskError {
    TaskError::Permanent(format!("{kind} requires '{field}', which is not set"))
}

/// Closed set of task variants.
#[derive(Debug, Clone)]
pub enum Task {
    DataRetrieval(DataRetrieval),
    PatternAnalysis(PatternAnalysis),
    ContextEnrichment(ContextEnrichment),
    DecisionSynthesis(DecisionSynthesis),
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::DataRetrieval(_) => TaskKind::DataRetrieval,
            Task::PatternAnalysis(_) => TaskKind::PatternAnalysis,
            Task::ContextEnrichment(_) => TaskKind::ContextEnrichment,
            Task::DecisionSynthesis(_) => TaskKind::DecisionSynthesis,
        }
    }

    pub async fn execute(&self, input: &TaskInput) -> Result<TaskOutcome, TaskError> {
        match self {
            Task::DataRetrieval(t) => t.execute(input).await,
            Task::PatternAnalysis(t) => t.execute(input).await,
            Task::ContextEnrichment(t) => t.execute(input).await,
            Task::DecisionSynthesis(t) => t.execute(input).await,
        }
    }
}

/// One configured instance of every task variant.
#[derive(Debug, Clone)]
pub struct TaskSet {
    data_retrieval: DataRetrieval,
    pattern_analysis: PatternAnalysis,
    context_enrichment: ContextEnrichment,
    decision_synthesis: DecisionSynthesis,
}

impl TaskSet {
    pub fn new(backends: &Backends, settings: &Settings) -> Self {
        let policy = DecisionPolicy::new(settings.policy.clone());

        Self {
            data_retrieval: DataRetrieval::new(backends.trade_data.clone()),
            pattern_analysis: PatternAnalysis::new(
                backends.anomaly_model.clone(),
                backends.similarity.clone(),
                settings.enrichment.similar_case_limit,
                settings.policy.degraded_interval_widening,
            ),
            context_enrichment: ContextEnrichment::new(
                backends.similarity.clone(),
                settings.enrichment,
            ),
            decision_synthesis: DecisionSynthesis::new(
                backends.reasoning.clone(),
                policy,
                settings.engine.reasoning_timeout,
            ),
        }
    }

    pub fn get(&self, kind: TaskKind) -> Task {
        match kind {
            TaskKind::DataRetrieval => Task::DataRetrieval(self.data_retrieval.clone()),
            TaskKind::PatternAnalysis => Task::PatternAnalysis(self.pattern_analysis.clone()),
            TaskKind::ContextEnrichment => {
                Task::ContextEnrichment(self.context_enrichment.clone())
            }
            TaskKind::DecisionSynthesis => {
                Task::DecisionSynthesis(self.decision_synthesis.clone())
            }
        }
    }

    pub fn decision_synthesis(&self) -> &DecisionSynthesis {
        &self.decision_synthesis
    }

    /// The update a degradable task still contributes after its attempts
    /// are exhausted, built from data already in the context.
    pub fn degraded_update(&self, kind: TaskKind, ctx: &AlertContext) -> Option<PartialUpdate> {
        match kind {
            TaskKind::ContextEnrichment => self.context_enrichment.without_communications(ctx),
            TaskKind::DataRetrieval | TaskKind::PatternAnalysis | TaskKind::DecisionSynthesis => {
                None
            }
        }
    }
}
