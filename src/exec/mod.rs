// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`pool`] bounds concurrent attempts with a semaphore.
//! - [`signal`] carries cancellation and the run deadline.
//! - [`runner`] runs one task through timeouts and retries.

pub mod pool;
pub mod runner;
pub mod signal;

pub use pool::{PoolClosed, WorkerPool};
pub use runner::{AttemptPolicy, Resolution, TaskRun, run_task};
pub use signal::{CancelHandle, RunSignal};
