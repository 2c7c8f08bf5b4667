// src/exec/runner.rs

//! Drives one task through its attempts.
//!
//! Each attempt waits for a worker permit, runs under the per-attempt
//! timeout and races against the run's cancellation/deadline signal.
//! Transient failures are retried with a fixed backoff until the retry
//! budget is spent. Every attempt leaves exactly one audit entry.

use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::audit::{AttemptOutcome, AuditEntry};
use crate::backends::sources;
use crate::config::EngineSettings;
use crate::context::{DecisionBasis, PartialUpdate};
use crate::dag::AbortReason;
use crate::exec::pool::WorkerPool;
use crate::exec::signal::RunSignal;
use crate::tasks::{FailurePolicy, Task, TaskError, TaskInput, TaskKind, TaskOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl From<&EngineSettings> for AttemptPolicy {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            timeout: settings.task_timeout,
            max_retries: settings.max_retries,
            backoff: settings.retry_backoff,
        }
    }
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The task returned an outcome (possibly degraded or fatal).
    Completed(TaskOutcome),
    /// Permanent error, or transient errors until the budget ran out.
    Failed(String),
    /// The run was cancelled or hit its deadline.
    Interrupted(AbortReason),
}

#[derive(Debug, Clone)]
pub struct TaskRun {
    pub task: TaskKind,
    pub resolution: Resolution,
    pub entries: Vec<AuditEntry>,
}

enum AttemptFailure {
    Transient(String),
    Permanent(String),
}

pub async fn run_task(
    task: &Task,
    input: &TaskInput,
    pool: &WorkerPool,
    policy: AttemptPolicy,
    signal: &mut RunSignal,
) -> TaskRun {
    let kind = task.kind();
    let alert_id = input.context.alert_id();
    let mut entries = Vec::new();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        if let Some(reason) = signal.check() {
            return interrupted(kind, entries, reason);
        }

        let started_at = OffsetDateTime::now_utc();
        let attempt_input = input.for_attempt(attempt, attempt > policy.max_retries);
        debug!(task = %kind, alert_id, attempt, "starting attempt");

        let result = tokio::select! {
            biased;
            reason = signal.interrupted() => {
                info!(task = %kind, alert_id, attempt, %reason, "attempt interrupted");
                entries.push(AuditEntry::new(
                    kind,
                    attempt,
                    started_at,
                    AttemptOutcome::Cancelled { reason: reason.to_string() },
                ));
                return interrupted(kind, entries, reason);
            }
            r = pool.run(|| timeout(policy.timeout, task.execute(&attempt_input))) => r,
        };

        let failure = match result {
            Ok(Ok(Ok(outcome))) => {
                entries.push(completed_entry(kind, attempt, started_at, &outcome));
                debug!(task = %kind, alert_id, attempt, "attempt completed");
                return TaskRun {
                    task: kind,
                    resolution: Resolution::Completed(outcome),
                    entries,
                };
            }
            Ok(Ok(Err(TaskError::Transient(reason)))) => AttemptFailure::Transient(reason),
            Ok(Ok(Err(TaskError::Permanent(reason)))) => AttemptFailure::Permanent(reason),
            Ok(Err(_elapsed)) => AttemptFailure::Transient(format!(
                "attempt timed out after {:?}",
                policy.timeout
            )),
            Err(_closed) => AttemptFailure::Permanent("worker pool is closed".to_string()),
        };

        let reason = match failure {
            AttemptFailure::Transient(reason) if attempt <= policy.max_retries => {
                warn!(
                    task = %kind,
                    alert_id,
                    attempt,
                    max_retries = policy.max_retries,
                    %reason,
                    "transient failure; retrying"
                );
                entries.push(AuditEntry::new(
                    kind,
                    attempt,
                    started_at,
                    AttemptOutcome::Retried { reason },
                ));

                if !policy.backoff.is_zero() {
                    tokio::select! {
                        biased;
                        reason = signal.interrupted() => {
                            return interrupted(kind, entries, reason);
                        }
                        _ = sleep(policy.backoff) => {}
                    }
                }
                continue;
            }
            AttemptFailure::Transient(reason) => {
                format!("retry budget exhausted after {attempt} attempt(s): {reason}")
            }
            AttemptFailure::Permanent(reason) => reason,
        };

        warn!(task = %kind, alert_id, attempt, %reason, "task failed");
        let outcome = match kind.failure_policy() {
            FailurePolicy::AbortRun => AttemptOutcome::Fatal {
                reason: reason.clone(),
            },
            FailurePolicy::Degrade | FailurePolicy::PolicyFallback => AttemptOutcome::Degraded {
                reason: reason.clone(),
            },
        };
        entries.push(AuditEntry::new(kind, attempt, started_at, outcome));

        return TaskRun {
            task: kind,
            resolution: Resolution::Failed(reason),
            entries,
        };
    }
}

fn interrupted(task: TaskKind, entries: Vec<AuditEntry>, reason: AbortReason) -> TaskRun {
    TaskRun {
        task,
        resolution: Resolution::Interrupted(reason),
        entries,
    }
}

fn completed_entry(
    kind: TaskKind,
    attempt: u32,
    started_at: OffsetDateTime,
    outcome: &TaskOutcome,
) -> AuditEntry {
    let (audit, update) = match outcome {
        TaskOutcome::Success(u) => (AttemptOutcome::Success, Some(u)),
        TaskOutcome::Degraded(u, reason) => (
            AttemptOutcome::Degraded {
                reason: reason.clone(),
            },
            Some(u),
        ),
        TaskOutcome::Fatal(reason) => (
            AttemptOutcome::Fatal {
                reason: reason.clone(),
            },
            None,
        ),
    };

    let mut entry = AuditEntry::new(kind, attempt, started_at, audit);
    if let Some(PartialUpdate::Decision(d)) = update {
        if d.basis == DecisionBasis::FallbackPolicy {
            entry.data_sources.push(sources::DECISION_POLICY.to_string());
        }
    }
    entry
}
