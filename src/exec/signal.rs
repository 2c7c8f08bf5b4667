// src/exec/signal.rs

//! Cancellation and deadline propagation for a run.

use std::future::pending;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

use crate::dag::AbortReason;

/// Caller-side switch that cancels every run holding a matching
/// [`RunSignal`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// A handle and the first signal observing it.
    pub fn channel() -> (Self, RunSignal) {
        let (tx, rx) = watch::channel(false);
        (
            Self { tx: Arc::new(tx) },
            RunSignal {
                cancel: Some(rx),
                deadline: None,
            },
        )
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Another signal observing this handle.
    pub fn signal(&self) -> RunSignal {
        RunSignal {
            cancel: Some(self.tx.subscribe()),
            deadline: None,
        }
    }
}

/// Observed by the scheduler and every task attempt of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSignal {
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl RunSignal {
    /// Never cancelled, no deadline.
    pub fn none() -> Self {
        Self::default()
    }

    /// Keep the earlier of the existing deadline and `deadline`.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = match (self.deadline, deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self
    }

    /// Non-blocking check.
    pub fn check(&self) -> Option<AbortReason> {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Some(AbortReason::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(AbortReason::DeadlineExceeded);
        }
        None
    }

    /// Resolves once the run is cancelled or its deadline passes; pending
    /// forever otherwise.
    pub async fn interrupted(&mut self) -> AbortReason {
        let deadline = self.deadline;
        let cancel = self.cancel.as_mut();

        let cancelled = async move {
            match cancel {
                Some(rx) => {
                    // A dropped handle can no longer cancel.
                    if rx.wait_for(|c| *c).await.is_err() {
                        pending::<()>().await;
                    }
                }
                None => pending::<()>().await,
            }
        };

        let expired = async move {
            match deadline {
                Some(d) => sleep_until(d).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => AbortReason::Cancelled,
            _ = expired => AbortReason::DeadlineExceeded,
        }
    }
}
