//! The coordination store contract.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

/// Identifier of a granted lease.
pub type LeaseId = u64;

/// Store-wide modification counter.
pub type Revision = u64;

/// A stored value and its bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    pub mod_revision: Revision,
    pub lease: Option<LeaseId>,
}

/// Change notification for a watched key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Put { key: String, revision: Revision },
    /// Explicit removal or lease expiry.
    Delete { key: String, revision: Revision },
}

impl WatchEvent {
    pub fn key(&self) -> &str {
        match self {
            WatchEvent::Put { key, .. } | WatchEvent::Delete { key, .. } => key,
        }
    }

    pub fn revision(&self) -> Revision {
        match self {
            WatchEvent::Put { revision, .. } | WatchEvent::Delete { revision, .. } => *revision,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::Put { .. } => "PUT",
            WatchEvent::Delete { .. } => "DELETE",
        }
    }
}

/// Unbounded subscription to one key.
///
/// Ends (`next` returns `None`) only when the store side is gone; the
/// caller re-subscribes with [`Coordinator::watch`].
pub struct WatchStream {
    key: String,
    rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl WatchStream {
    pub fn new(key: impl Into<String>, rx: mpsc::UnboundedReceiver<WatchEvent>) -> Self {
        Self { key: key.into(), rx }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the next event on the watched key.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }
}

/// Key-value service with leases and watches.
///
/// Implementations are cheap to clone and shared across tasks.
pub trait Coordinator: Clone + Send + Sync + 'static {
    /// Grant a lease that expires after `ttl` unless renewed.
    fn grant(&self, ttl: Duration) -> impl Future<Output = crate::CoordResult<LeaseId>> + Send;

    /// Write `value` under `key`, optionally bound to `lease`.
    fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        lease: Option<LeaseId>,
    ) -> impl Future<Output = crate::CoordResult<Revision>> + Send;

    /// Read the current value of `key`.
    fn get(&self, key: &str) -> impl Future<Output = crate::CoordResult<Option<KeyValue>>> + Send;

    /// Subscribe to changes of `key`.
    fn watch(&self, key: &str) -> WatchStream;
}
