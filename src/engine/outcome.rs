// src/engine/outcome.rs

use std::collections::BTreeMap;

use ulid::Ulid;

use crate::audit::AuditTrail;
use crate::context::AlertContext;
use crate::dag::{AbortReason, RunState, TaskRunState};
use crate::engine::request::AnalysisResponse;
use crate::errors::{EngineError, Result};
use crate::tasks::TaskKind;
use crate::types::Recommendation;

/// Terminal state of one alert analysis.
///
/// A completed run always carries a decision; an aborted one never does,
/// and reports why it stopped. Both carry the full audit trail.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub(crate) state: RunState,
    pub(crate) abort_reason: Option<AbortReason>,
    pub(crate) context: AlertContext,
    pub(crate) audit: AuditTrail,
    pub(crate) tasks: BTreeMap<TaskKind, TaskRunState>,
}

impl RunOutcome {
    pub fn trace_id(&self) -> Ulid {
        self.audit.trace_id()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        self.abort_reason.as_ref()
    }

    pub fn context(&self) -> &AlertContext {
        &self.context
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn task_state(&self, task: TaskKind) -> Option<TaskRunState> {
        self.tasks.get(&task).copied()
    }

    pub fn task_states(&self) -> &BTreeMap<TaskKind, TaskRunState> {
        &self.tasks
    }

    pub fn recommendation(&self) -> Option<Recommendation> {
        if self.is_completed() {
            self.context.recommendation()
        } else {
            None
        }
    }

    /// The caller-facing response, if the run completed.
    pub fn response(&self) -> Option<AnalysisResponse> {
        if !self.is_completed() {
            return None;
        }
        AnalysisResponse::from_run(&self.context, &self.audit)
    }

    /// The response, or [`EngineError::Aborted`] with the abort reason.
    pub fn into_result(self) -> Result<AnalysisResponse> {
        if let Some(response) = self.response() {
            return Ok(response);
        }
        let reason = self.abort_reason.unwrap_or(AbortReason::Fatal {
            task: TaskKind::DecisionSynthesis,
            reason: "run ended without a decision".to_string(),
        });
        Err(EngineError::Aborted {
            trace_id: self.audit.trace_id(),
            reason,
        })
    }
}
