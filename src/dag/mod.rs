// src/dag/mod.rs

//! DAG representation and run state.
//!
//! - [`graph`] holds the validated task graph and its barrier stages.
//! - [`state`] tracks the run lifecycle and per-task states.

pub mod graph;
pub mod state;

pub use graph::TaskGraph;
pub use state::{AbortReason, RunState, RunStatus, TaskRunState};
