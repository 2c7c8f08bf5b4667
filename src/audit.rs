// src/audit.rs

//! Per-run audit trail and the in-memory store that keeps them.
//!
//! One [`AuditEntry`] is written per task attempt, including attempts that
//! were retried, timed out or cancelled. A trail is immutable once handed
//! out of the engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use time::OffsetDateTime;
use ulid::Ulid;

use crate::context::ContextField;
use crate::tasks::TaskKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Degraded { reason: String },
    Fatal { reason: String },
    /// Transient failure; another attempt follows.
    Retried { reason: String },
    /// Interrupted by cancellation or the run deadline.
    Cancelled { reason: String },
}

impl AttemptOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, AttemptOutcome::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            AttemptOutcome::Success => None,
            AttemptOutcome::Degraded { reason }
            | AttemptOutcome::Fatal { reason }
            | AttemptOutcome::Retried { reason }
            | AttemptOutcome::Cancelled { reason } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub task: TaskKind,
    /// 1-based.
    pub attempt: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub outcome: AttemptOutcome,
    pub data_sources: Vec<String>,
    pub inputs_used: Vec<ContextField>,
    /// Filled in once the attempt's update has been merged.
    pub fields_written: Vec<ContextField>,
}

impl AuditEntry {
    pub fn new(
        task: TaskKind,
        attempt: u32,
        started_at: OffsetDateTime,
        outcome: AttemptOutcome,
    ) -> Self {
        Self {
            task,
            attempt,
            started_at,
            finished_at: OffsetDateTime::now_utc(),
            outcome,
            data_sources: task.data_sources().iter().map(|s| s.to_string()).collect(),
            inputs_used: task.reads().to_vec(),
            fields_written: Vec::new(),
        }
    }
}

/// Ordered record of every attempt made during one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditTrail {
    trace_id: Ulid,
    alert_id: String,
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub(crate) fn new(trace_id: Ulid, alert_id: impl Into<String>) -> Self {
        Self {
            trace_id,
            alert_id: alert_id.into(),
            entries: Vec::new(),
        }
    }

    pub(crate) fn extend(&mut self, entries: impl IntoIterator<Item = AuditEntry>) {
        self.entries.extend(entries);
    }

    /// Modify the latest entry recorded for `task`.
    pub(crate) fn amend_last(&mut self, task: TaskKind, amend: impl FnOnce(&mut AuditEntry)) {
        if let Some(entry) = self.entries.iter_mut().rev().find(|e| e.task == task) {
            amend(entry);
        }
    }

    pub fn trace_id(&self) -> Ulid {
        self.trace_id
    }

    pub fn alert_id(&self) -> &str {
        &self.alert_id
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn entries_for(&self, task: TaskKind) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter().filter(move |e| e.task == task)
    }

    pub fn attempts(&self, task: TaskKind) -> usize {
        self.entries_for(task).count()
    }

    /// Outcome of the last attempt of `task`, if it ran at all.
    pub fn final_outcome(&self, task: TaskKind) -> Option<&AttemptOutcome> {
        self.entries_for(task).last().map(|e| &e.outcome)
    }

    /// Tasks whose last attempt ended degraded, in task order.
    pub fn degraded_tasks(&self) -> Vec<TaskKind> {
        TaskKind::ALL
            .into_iter()
            .filter(|t| self.final_outcome(*t).is_some_and(AttemptOutcome::is_degraded))
            .collect()
    }

    /// Every data source consulted, in first-use order, without duplicates.
    pub fn data_sources_consulted(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for source in self.entries.iter().flat_map(|e| e.data_sources.iter()) {
            if !seen.contains(source) {
                seen.push(source.clone());
            }
        }
        seen
    }
}

/// Shared, in-memory store of audit trails keyed by trace id.
///
/// Every run is inserted and nothing is evicted: a trail stays until
/// [`AuditStore::remove`] takes it out. Long-lived processes are expected
/// to drain trails they have persisted elsewhere.
#[derive(Debug, Clone, Default)]
pub struct AuditStore {
    trails: Arc<Mutex<HashMap<Ulid, AuditTrail>>>,
}

impl AuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Ulid, AuditTrail>> {
        // Entries are only ever inserted whole, so a poisoned map is still
        // consistent.
        match self.trails.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn insert(&self, trail: AuditTrail) {
        self.lock().insert(trail.trace_id, trail);
    }

    pub fn get(&self, trace_id: &Ulid) -> Option<AuditTrail> {
        self.lock().get(trace_id).cloned()
    }

    /// Hand a trail over to the caller, e.g. once it has been archived.
    pub fn remove(&self, trace_id: &Ulid) -> Option<AuditTrail> {
        self.lock().remove(trace_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
