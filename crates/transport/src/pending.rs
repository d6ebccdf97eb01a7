use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Pending-completion registry keyed by `session_id`, shared by all three
/// transport clients (§4.1). Single-response clients (STT, MT) dispatch once
/// and remove; the streaming TTS client dispatches repeatedly and removes
/// only on the final chunk, which drops the sender and ends the receiver
/// stream.
pub(crate) struct PendingRegistry<T> {
    inner: Mutex<HashMap<String, mpsc::UnboundedSender<T>>>,
}

impl<T> PendingRegistry<T> {
    pub fn new() -> Self {
        PendingRegistry { inner: Mutex::new(HashMap::new()) }
    }

    /// Register a new in-flight request, returning the receiver half.
    pub fn register(&self, session_id: String) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self.inner.lock().insert(session_id.clone(), tx);
        debug_assert!(previous.is_none(), "session id {session_id} reused while in flight");
        rx
    }

    /// Deliver a value to the matching in-flight request. Returns `false`
    /// (and drops `value`) if `session_id` has no registered entry — the
    /// caller logs a `tracing::warn!` for that case, never falls back to an
    /// arbitrary pending request (§9).
    pub fn dispatch(&self, session_id: &str, value: T) -> bool {
        let guard = self.inner.lock();
        match guard.get(session_id) {
            Some(tx) => {
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    /// Remove an entry, dropping its sender and closing the receiver stream.
    pub fn remove(&self, session_id: &str) {
        self.inner.lock().remove(session_id);
    }

    /// Fail and remove every in-flight request, e.g. on connection loss.
    pub fn fail_all(&self, mut make_error: impl FnMut() -> T) {
        let mut guard = self.inner.lock();
        for (_, tx) in guard.drain() {
            let _ = tx.send(make_error());
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_delivers_to_matching_session() {
        let registry: PendingRegistry<i32> = PendingRegistry::new();
        let mut rx = registry.register("a".into());
        assert!(registry.dispatch("a", 42));
        assert_eq!(rx.recv().await, Some(42));
    }

    #[tokio::test]
    async fn dispatch_to_unknown_session_returns_false() {
        let registry: PendingRegistry<i32> = PendingRegistry::new();
        assert!(!registry.dispatch("missing", 1));
    }

    #[tokio::test]
    async fn remove_closes_the_receiver_stream() {
        let registry: PendingRegistry<i32> = PendingRegistry::new();
        let mut rx = registry.register("a".into());
        registry.remove("a");
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn fail_all_reaches_every_in_flight_request() {
        let registry: PendingRegistry<i32> = PendingRegistry::new();
        let mut rx_a = registry.register("a".into());
        let mut rx_b = registry.register("b".into());
        registry.fail_all(|| -1);
        assert_eq!(rx_a.recv().await, Some(-1));
        assert_eq!(rx_b.recv().await, Some(-1));
        assert_eq!(registry.len(), 0);
    }
}
