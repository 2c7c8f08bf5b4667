// src/dag/state.rs

//! Run lifecycle and per-task state.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::tasks::TaskKind;

/// Lifecycle of one alert analysis.
///
/// `Pending -> Running -> Completed | Aborted`, or `Pending -> Aborted`
/// when the request is rejected before any task starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Aborted,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Pending, RunState::Running)
                | (RunState::Pending, RunState::Aborted)
                | (RunState::Running, RunState::Completed)
                | (RunState::Running, RunState::Aborted)
        )
    }
}

/// Why a run ended without a recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// The request was malformed; no task ran.
    Validation { message: String },
    /// A task whose data is required downstream failed.
    Fatal { task: TaskKind, reason: String },
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Validation { message } => write!(f, "invalid request: {message}"),
            AbortReason::Fatal { task, reason } => write!(f, "task '{task}' failed: {reason}"),
            AbortReason::Cancelled => f.write_str("cancelled by caller"),
            AbortReason::DeadlineExceeded => f.write_str("run deadline exceeded"),
        }
    }
}

/// Public, read-only view of a task's state within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunState {
    Pending,
    Running,
    Succeeded,
    Degraded,
    Failed,
    /// Interrupted by cancellation or the deadline.
    Cancelled,
    /// Never started because the run ended first.
    Skipped,
}

/// Run state plus the state of every task in the graph.
#[derive(Debug, Clone)]
pub struct RunStatus {
    state: RunState,
    tasks: BTreeMap<TaskKind, TaskRunState>,
}

impl RunStatus {
    pub fn new(tasks: impl IntoIterator<Item = TaskKind>) -> Self {
        Self {
            state: RunState::Pending,
            tasks: tasks
                .into_iter()
                .map(|t| (t, TaskRunState::Pending))
                .collect(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Move the run to `next`. Illegal transitions are ignored and logged;
    /// terminal states are never left.
    pub fn transition(&mut self, next: RunState) -> bool {
        if self.state.can_transition_to(next) {
            debug!(from = ?self.state, to = ?next, "run state transition");
            self.state = next;
            true
        } else {
            warn!(from = ?self.state, to = ?next, "ignoring illegal run state transition");
            false
        }
    }

    pub fn task(&self, task: TaskKind) -> Option<TaskRunState> {
        self.tasks.get(&task).copied()
    }

    pub fn tasks(&self) -> &BTreeMap<TaskKind, TaskRunState> {
        &self.tasks
    }

    pub fn set_task(&mut self, task: TaskKind, state: TaskRunState) {
        if let Some(s) = self.tasks.get_mut(&task) {
            *s = state;
        }
    }

    /// Mark every task that never started as skipped.
    pub fn skip_pending(&mut self) {
        for s in self.tasks.values_mut() {
            if *s == TaskRunState::Pending {
                *s = TaskRunState::Skipped;
            }
        }
    }
}
