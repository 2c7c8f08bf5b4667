// src/tasks/data_retrieval.rs

use std::sync::Arc;

use tracing::debug;

use crate::backends::{BackendError, TradeDataSource};
use crate::context::{PartialUpdate, RetrievalUpdate};
use crate::tasks::{TaskError, TaskInput, TaskOutcome};

/// Loads trades, client profile and market snapshot for the alert.
///
/// Everything downstream depends on this data, so an alert that does not
/// resolve to any trade is fatal rather than degraded.
#[derive(Debug, Clone)]
pub struct DataRetrieval {
    source: Arc<dyn TradeDataSource>,
}

impl DataRetrieval {
    pub fn new(source: Arc<dyn TradeDataSource>) -> Self {
        Self { source }
    }

    pub async fn execute(&self, input: &TaskInput) -> Result<TaskOutcome, TaskError> {
        let alert_id = input.context.alert_id();

        let data = match self.source.fetch_alert_data(alert_id).await {
            Ok(data) => data,
            Err(BackendError::NotFound(what)) => {
                return Ok(TaskOutcome::Fatal(format!(
                    "alert '{alert_id}' did not resolve to trade records ({what})"
                )));
            }
            Err(err) => return Err(err.into()),
        };

        if data.trade_records.is_empty() {
            return Ok(TaskOutcome::Fatal(format!(
                "alert '{alert_id}' resolved to zero trade records"
            )));
        }

        debug!(
            alert_id,
            trades = data.trade_records.len(),
            client_id = %data.client_profile.client_id,
            "retrieved alert data"
        );

        Ok(TaskOutcome::Success(PartialUpdate::Retrieval(
            RetrievalUpdate {
                trade_records: data.trade_records,
                client_profile: data.client_profile,
                market_data: data.market_data,
            },
        )))
    }
}
