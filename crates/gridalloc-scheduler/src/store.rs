//! Allocation store — the plan under one well-known coordination key.

use std::time::Duration;

use tracing::debug;

use gridalloc_coord::{Coordinator, Revision, WatchStream};
use gridalloc_core::AllocationPlan;

use crate::error::{StoreError, StoreResult};

/// Key the current plan is published under.
pub const ALLOCATION_KEY: &str = "allocation";

/// Publishes and fetches the plan through a [`Coordinator`].
#[derive(Clone)]
pub struct AllocationStore<C: Coordinator> {
    coord: C,
    lease_ttl: Duration,
    get_timeout: Duration,
}

impl<C: Coordinator> AllocationStore<C> {
    pub fn new(coord: C, lease_ttl: Duration, get_timeout: Duration) -> Self {
        Self {
            coord,
            lease_ttl,
            get_timeout,
        }
    }

    /// Publish `plan` under a fresh lease, overwriting any previous plan.
    ///
    /// The plan disappears from the store `lease_ttl` after this call
    /// unless another publish replaces it first.
    pub async fn publish(&self, plan: &AllocationPlan) -> StoreResult<Revision> {
        let value = serde_json::to_vec(plan).map_err(|e| StoreError::Serialize(e.to_string()))?;

        let lease = self
            .coord
            .grant(self.lease_ttl)
            .await
            .map_err(StoreError::Lease)?;
        let revision = self
            .coord
            .put(ALLOCATION_KEY, value, Some(lease))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        debug!(
            lease,
            revision,
            ttl_secs = self.lease_ttl.as_secs(),
            functions = plan.len(),
            "allocation written"
        );
        Ok(revision)
    }

    /// Fetch the current plan.
    pub async fn get(&self) -> StoreResult<AllocationPlan> {
        let read = tokio::time::timeout(self.get_timeout, self.coord.get(ALLOCATION_KEY))
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!("read timed out after {:?}", self.get_timeout))
            })?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let kv = read.ok_or_else(|| StoreError::NotFound(ALLOCATION_KEY.to_string()))?;
        serde_json::from_slice(&kv.value).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    /// Subscribe to changes of the plan key.
    pub fn watch(&self) -> WatchStream {
        self.coord.watch(ALLOCATION_KEY)
    }
}
