// src/fetch/mod.rs

//! Concurrent multi-endpoint fetching.
//!
//! `FetchOrchestrator` fans a batch of `(endpoint, params)` requests out to the
//! gateway, waits for all of them, and answers in request order. Remote
//! failures stay in their slot as [`FetchOutcome::Error`]. Once the answers
//! are known the whole batch is handed to the history store on a detached
//! task; persistence never delays or fails the caller.

pub mod tool_life;

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;

use crate::errors::{FleetError, Result};
use crate::exec::DetachedRunner;
use crate::gateway::{FetchOutcome, GatewayClient, RequestKey};
use crate::history::{HistoryStore, RequestResult};
use crate::types::{self, Params};

pub use tool_life::{LifeReading, ToolLifeEntry, ToolLifeError};

pub struct FetchOrchestrator {
    gateway: Arc<dyn GatewayClient>,
    store: Arc<HistoryStore>,
    runner: DetachedRunner,
}

impl fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl FetchOrchestrator {
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        store: Arc<HistoryStore>,
        runner: DetachedRunner,
    ) -> Self {
        Self {
            gateway,
            store,
            runner,
        }
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    /// Fetch every `(endpoints[i], params_list[i])` concurrently.
    ///
    /// `output[i]` answers request `i`. Unequal list lengths are rejected
    /// before any remote call.
    pub async fn fetch_many(
        &self,
        endpoints: &[String],
        params_list: &[Params],
    ) -> Result<Vec<FetchOutcome>> {
        let keys = pair_requests(endpoints, params_list)?;
        let outcomes = self.fetch_batch(&keys).await;

        let stamped = types::now();
        let batch: Vec<RequestResult> = keys
            .into_iter()
            .zip(outcomes.iter().cloned())
            .map(|(key, outcome)| RequestResult::new(key, outcome, stamped))
            .collect();

        let store = Arc::clone(&self.store);
        self.runner
            .submit("persist_fetch_batch", async move { store.append(batch).await });

        Ok(outcomes)
    }

    /// Concurrent fetch without persistence.
    pub(crate) async fn fetch_batch(&self, keys: &[RequestKey]) -> Vec<FetchOutcome> {
        debug!(requests = keys.len(), "fetching batch");
        join_all(
            keys.iter()
                .map(|key| self.gateway.fetch(&key.endpoint, &key.params)),
        )
        .await
    }
}

/// Zip the two request lists into keys, or fail if their lengths differ.
pub fn pair_requests(endpoints: &[String], params_list: &[Params]) -> Result<Vec<RequestKey>> {
    if endpoints.len() != params_list.len() {
        return Err(FleetError::Validation(format!(
            "endpoint list and params list must have the same length ({} != {})",
            endpoints.len(),
            params_list.len()
        )));
    }

    Ok(endpoints
        .iter()
        .zip(params_list.iter())
        .map(|(endpoint, params)| RequestKey::new(endpoint.clone(), params.clone()))
        .collect())
}
