// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::context::ContextField;
use crate::errors::{EngineError, Result};
use crate::tasks::TaskKind;

/// Context fields supplied by the request rather than by a task.
const REQUEST_FIELDS: [ContextField; 3] = [
    ContextField::AlertId,
    ContextField::Priority,
    ContextField::ContextDepth,
];

/// Validated task DAG, grouped into barrier-separated stages.
///
/// Edge direction: dependency -> dependent. Tasks in the same stage have no
/// path between them and may run concurrently; a stage starts only after
/// every task of the previous stage has been resolved.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    graph: DiGraphMap<TaskKind, ()>,
    stages: Vec<Vec<TaskKind>>,
}

impl TaskGraph {
    /// DataRetrieval, then PatternAnalysis and ContextEnrichment in
    /// parallel, then DecisionSynthesis.
    pub fn alert_analysis() -> Result<Self> {
        Self::from_edges(&[
            (TaskKind::DataRetrieval, TaskKind::PatternAnalysis),
            (TaskKind::DataRetrieval, TaskKind::ContextEnrichment),
            (TaskKind::PatternAnalysis, TaskKind::DecisionSynthesis),
            (TaskKind::ContextEnrichment, TaskKind::DecisionSynthesis),
        ])
    }

    /// Build and validate a graph from `(dependency, dependent)` edges.
    ///
    /// Rejects cycles, graphs without exactly one entry and one sink, sinks
    /// that do not produce the decision, tasks reading fields no ancestor
    /// writes, and concurrent tasks with overlapping writes.
    pub fn from_edges(edges: &[(TaskKind, TaskKind)]) -> Result<Self> {
        let mut graph: DiGraphMap<TaskKind, ()> = DiGraphMap::new();
        for (dep, task) in edges {
            graph.add_edge(*dep, *task, ());
        }

        if graph.node_count() == 0 {
            return Err(EngineError::InvalidGraph("task graph is empty".to_string()));
        }

        // A topological sort will fail if there is a cycle.
        let order = toposort(&graph, None).map_err(|cycle| {
            EngineError::InvalidGraph(format!(
                "cycle detected in task graph involving '{}'",
                cycle.node_id()
            ))
        })?;

        let entries: Vec<TaskKind> = graph
            .nodes()
            .filter(|n| graph.neighbors_directed(*n, Direction::Incoming).next().is_none())
            .collect();
        if entries.len() != 1 {
            return Err(EngineError::InvalidGraph(format!(
                "expected exactly one entry task, found {entries:?}"
            )));
        }

        let sinks: Vec<TaskKind> = graph
            .nodes()
            .filter(|n| graph.neighbors_directed(*n, Direction::Outgoing).next().is_none())
            .collect();
        match sinks.as_slice() {
            [sink] if sink.writes().contains(&ContextField::Decision) => {}
            [sink] => {
                return Err(EngineError::InvalidGraph(format!(
                    "terminal task '{sink}' does not produce a decision"
                )));
            }
            _ => {
                return Err(EngineError::InvalidGraph(format!(
                    "expected exactly one terminal task, found {sinks:?}"
                )));
            }
        }

        // Level = longest path from the entry; nodes on the same level are
        // independent of each other.
        let mut level: BTreeMap<TaskKind, usize> = BTreeMap::new();
        for node in &order {
            let l = graph
                .neighbors_directed(*node, Direction::Incoming)
                .filter_map(|dep| level.get(&dep))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level.insert(*node, l);
        }

        let depth = level.values().copied().max().unwrap_or(0) + 1;
        let mut stages: Vec<Vec<TaskKind>> = vec![Vec::new(); depth];
        for (node, l) in &level {
            stages[*l].push(*node);
        }

        let tg = Self { graph, stages };
        tg.check_field_contracts()?;
        Ok(tg)
    }

    fn check_field_contracts(&self) -> Result<()> {
        for task in self.tasks() {
            let available: BTreeSet<ContextField> = self
                .ancestors_of(task)
                .iter()
                .flat_map(|a| a.writes().iter().copied())
                .chain(REQUEST_FIELDS)
                .collect();

            if let Some(missing) = task.reads().iter().find(|f| !available.contains(f)) {
                return Err(EngineError::InvalidGraph(format!(
                    "task '{task}' reads '{missing}', which no upstream task writes"
                )));
            }
        }

        for stage in &self.stages {
            let mut written: BTreeMap<ContextField, TaskKind> = BTreeMap::new();
            for task in stage {
                for field in task.writes() {
                    if let Some(other) = written.insert(*field, *task) {
                        return Err(EngineError::InvalidGraph(format!(
                            "tasks '{other}' and '{task}' both write '{field}'"
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn tasks(&self) -> impl Iterator<Item = TaskKind> + '_ {
        self.stages.iter().flatten().copied()
    }

    pub fn stages(&self) -> &[Vec<TaskKind>] {
        &self.stages
    }

    pub fn entry(&self) -> Option<TaskKind> {
        self.stages.first().and_then(|s| s.first()).copied()
    }

    pub fn sink(&self) -> Option<TaskKind> {
        self.stages.last().and_then(|s| s.first()).copied()
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, task: TaskKind) -> Vec<TaskKind> {
        let mut deps: Vec<TaskKind> = self
            .graph
            .neighbors_directed(task, Direction::Incoming)
            .collect();
        deps.sort();
        deps
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, task: TaskKind) -> Vec<TaskKind> {
        let mut deps: Vec<TaskKind> = self
            .graph
            .neighbors_directed(task, Direction::Outgoing)
            .collect();
        deps.sort();
        deps
    }

    /// All transitive dependencies of a task.
    pub fn ancestors_of(&self, task: TaskKind) -> BTreeSet<TaskKind> {
        let mut seen = BTreeSet::new();
        let mut stack = self.dependencies_of(task);
        while let Some(t) = stack.pop() {
            if seen.insert(t) {
                stack.extend(self.dependencies_of(t));
            }
        }
        seen
    }
}
