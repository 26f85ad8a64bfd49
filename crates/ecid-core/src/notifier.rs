//! Replay-latest identifier notifications
//!
//! A deliberately small broadcast primitive: it holds the single latest
//! published identifier (including an explicit "no identifier" `None`) and a
//! list of single-shot subscribers. It is not a general pub/sub bus; the
//! single-slot, single-shot semantics are what the request-decoration path
//! relies on to wait for a stable identifier without polling.

use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::debug;

/// Latest-value broadcast with single-shot subscriptions
#[derive(Debug, Default)]
pub struct IdentifierNotifier {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// `None` = nothing ever published (or cleared); `Some(None)` = an
    /// explicit "no identifier" was published
    latest: Option<Option<String>>,
    waiters: Vec<oneshot::Sender<Option<String>>>,
}

impl IdentifierNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` as the latest published identifier. When it differs
    /// from the previously stored value, every queued subscriber is notified
    /// once and the subscriber list is emptied; subscribers arriving after
    /// this publish wait for the next one.
    pub fn publish(&self, value: Option<String>) {
        let waiters = {
            let mut inner = self.lock();
            let changed = inner.latest.as_ref() != Some(&value);
            inner.latest = Some(value.clone());
            if changed {
                std::mem::take(&mut inner.waiters)
            } else {
                Vec::new()
            }
        };
        if !waiters.is_empty() {
            debug!(subscribers = waiters.len(), "notifying identifier waiters");
        }
        for waiter in waiters {
            // A dropped receiver just means the subscriber went away.
            let _ = waiter.send(value.clone());
        }
    }

    /// Subscribe for exactly one notification. When a latest value already
    /// exists it is replayed asynchronously from a spawned task (never
    /// inline, so caller ordering is preserved and reentrancy is impossible);
    /// otherwise the subscription resolves on the next publish.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe_once(&self) -> oneshot::Receiver<Option<String>> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        match inner.latest.clone() {
            Some(latest) => {
                drop(inner);
                tokio::spawn(async move {
                    let _ = tx.send(latest);
                });
            }
            None => inner.waiters.push(tx),
        }
        rx
    }

    /// Discard the stored latest value without notifying anyone. Subsequent
    /// subscriptions wait for the next publish instead of replaying a stale
    /// value.
    pub fn clear(&self) {
        self.lock().latest = None;
    }

    /// The latest published value, if any publish has happened since the
    /// last `clear`
    pub fn last(&self) -> Option<Option<String>> {
        self.lock().latest.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // The lock is only ever held for field access, never across an await.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
