//! In-process coordination store.
//!
//! Leases expire on a tokio timer, so tests can drive expiry with a
//! paused clock. Watchers get their own unbounded channel; closed
//! receivers are pruned on the next notification.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::coordinator::*;
use crate::error::{CoordError, CoordResult};

/// Fault injection switches, for exercising failure paths in tests.
#[derive(Debug, Default)]
pub struct CoordFaults {
    pub fail_grant_once: AtomicBool,
    pub fail_grant_always: AtomicBool,
    pub fail_get_once: AtomicBool,
    pub fail_get_always: AtomicBool,
    /// Delay applied to every `get`, in milliseconds.
    pub get_latency_ms: AtomicU64,
}

impl CoordFaults {
    fn should_fail(once: &AtomicBool, always: &AtomicBool) -> bool {
        if always.load(Ordering::Relaxed) {
            return true;
        }
        once.swap(false, Ordering::Relaxed)
    }

    fn should_fail_grant(&self) -> bool {
        Self::should_fail(&self.fail_grant_once, &self.fail_grant_always)
    }

    fn should_fail_get(&self) -> bool {
        Self::should_fail(&self.fail_get_once, &self.fail_get_always)
    }
}

struct Entry {
    value: Vec<u8>,
    mod_revision: Revision,
    lease: Option<LeaseId>,
}

struct Watcher {
    key: String,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Live leases → keys currently bound to them.
    leases: HashMap<LeaseId, HashSet<String>>,
    next_lease: LeaseId,
    revision: Revision,
    watchers: Vec<Watcher>,
}

impl Inner {
    fn notify(&mut self, event: WatchEvent) {
        self.watchers
            .retain(|w| w.key != event.key() || w.tx.send(event.clone()).is_ok());
    }

    fn revoke(&mut self, lease: LeaseId) {
        let Some(keys) = self.leases.remove(&lease) else {
            return;
        };
        for key in keys {
            let bound = self
                .entries
                .get(&key)
                .is_some_and(|e| e.lease == Some(lease));
            if bound {
                self.entries.remove(&key);
                self.revision += 1;
                debug!(%key, lease, revision = self.revision, "key expired with lease");
                let revision = self.revision;
                self.notify(WatchEvent::Delete { key, revision });
            }
        }
    }
}

/// Shared in-memory coordinator. Clones see the same store.
#[derive(Clone, Default)]
pub struct MemoryCoordinator {
    inner: Arc<Mutex<Inner>>,
    faults: Arc<CoordFaults>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault switches shared by every clone of this coordinator.
    pub fn faults(&self) -> &CoordFaults {
        &self.faults
    }

    /// Remove a key regardless of lease.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().expect("coordinator lock");
        let Some(entry) = inner.entries.remove(key) else {
            return false;
        };
        if let Some(keys) = entry.lease.and_then(|l| inner.leases.get_mut(&l)) {
            keys.remove(key);
        }
        inner.revision += 1;
        let revision = inner.revision;
        inner.notify(WatchEvent::Delete {
            key: key.to_string(),
            revision,
        });
        true
    }

    /// Number of leases that have not expired yet.
    pub fn live_leases(&self) -> usize {
        self.inner.lock().expect("coordinator lock").leases.len()
    }

    fn spawn_expiry(inner: Weak<Mutex<Inner>>, lease: LeaseId, ttl: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = inner.upgrade() {
                inner.lock().expect("coordinator lock").revoke(lease);
            }
        });
    }
}

impl Coordinator for MemoryCoordinator {
    async fn grant(&self, ttl: Duration) -> CoordResult<LeaseId> {
        if self.faults.should_fail_grant() {
            return Err(CoordError::Unavailable("lease grant rejected".to_string()));
        }

        let lease = {
            let mut inner = self.inner.lock().expect("coordinator lock");
            inner.next_lease += 1;
            let lease = inner.next_lease;
            inner.leases.insert(lease, HashSet::new());
            lease
        };

        Self::spawn_expiry(Arc::downgrade(&self.inner), lease, ttl);
        debug!(lease, ttl_secs = ttl.as_secs(), "lease granted");
        Ok(lease)
    }

    async fn put(&self, key: &str, value: Vec<u8>, lease: Option<LeaseId>) -> CoordResult<Revision> {
        let mut inner = self.inner.lock().expect("coordinator lock");

        if let Some(id) = lease {
            let keys = inner
                .leases
                .get_mut(&id)
                .ok_or(CoordError::LeaseNotFound(id))?;
            keys.insert(key.to_string());
        }

        let previous = inner.entries.get(key).and_then(|e| e.lease);
        if let Some(old) = previous.filter(|&old| Some(old) != lease)
            && let Some(keys) = inner.leases.get_mut(&old)
        {
            keys.remove(key);
        }

        inner.revision += 1;
        let revision = inner.revision;
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                mod_revision: revision,
                lease,
            },
        );
        inner.notify(WatchEvent::Put {
            key: key.to_string(),
            revision,
        });
        Ok(revision)
    }

    async fn get(&self, key: &str) -> CoordResult<Option<KeyValue>> {
        let latency = self.faults.get_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.faults.should_fail_get() {
            return Err(CoordError::Unavailable("read rejected".to_string()));
        }

        let inner = self.inner.lock().expect("coordinator lock");
        Ok(inner.entries.get(key).map(|e| KeyValue {
            key: key.to_string(),
            value: e.value.clone(),
            mod_revision: e.mod_revision,
            lease: e.lease,
        }))
    }

    fn watch(&self, key: &str) -> WatchStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .expect("coordinator lock")
            .watchers
            .push(Watcher {
                key: key.to_string(),
                tx,
            });
        WatchStream::new(key, rx)
    }
}
