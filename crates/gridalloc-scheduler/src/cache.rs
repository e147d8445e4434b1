//! Process-wide allocation cache.

use std::sync::{Arc, RwLock};

use gridalloc_core::AllocationPlan;

/// Last known plan, shared between the role loop (single writer) and any
/// number of readers.
///
/// Readers get an `Arc` to an immutable plan, so a read never holds the
/// lock past the pointer copy and never sees a half-applied update.
#[derive(Debug, Clone, Default)]
pub struct AllocationCache {
    current: Arc<RwLock<Arc<AllocationPlan>>>,
}

impl AllocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last cached plan. Empty until the first replace.
    pub fn get(&self) -> Arc<AllocationPlan> {
        self.current.read().expect("allocation cache lock").clone()
    }

    /// Swap in a new plan as a whole.
    pub fn replace(&self, plan: AllocationPlan) {
        *self.current.write().expect("allocation cache lock") = Arc::new(plan);
    }
}
