//! Request/response correlation for "ask the peer, answer later" exchanges.
//!
//! The first request for a key is the one that goes on the wire; later
//! requests for the same key piggy-back on it. A response resolves every
//! waiter for its key at once. The correlator lives inside the tick context,
//! so waiters always complete there.

use std::collections::HashMap;
use std::hash::Hash;
use tokio::sync::oneshot;

#[derive(Debug)]
pub struct PendingCorrelation<K, V> {
    pending: HashMap<K, Vec<oneshot::Sender<V>>>,
}

impl<K, V> Default for PendingCorrelation<K, V> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }
}

impl<K, V> PendingCorrelation<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `key`.
    ///
    /// The flag is true when this is the first waiter, meaning the caller
    /// must send the request packet.
    pub fn request(&mut self, key: K) -> (oneshot::Receiver<V>, bool) {
        let (tx, rx) = oneshot::channel();
        let waiters = self.pending.entry(key).or_default();
        let first = waiters.is_empty();
        waiters.push(tx);
        (rx, first)
    }

    /// Hand an existing waiter to the correlator under `key`.
    pub fn attach(&mut self, key: K, waiter: oneshot::Sender<V>) -> bool {
        let waiters = self.pending.entry(key).or_default();
        let first = waiters.is_empty();
        waiters.push(waiter);
        first
    }

    /// Resolve every waiter for `key`. Unknown keys are ignored.
    ///
    /// Returns the number of waiters that received the value.
    pub fn on_response(&mut self, key: &K, value: V) -> usize {
        let Some(waiters) = self.pending.remove(key) else {
            return 0;
        };
        waiters
            .into_iter()
            .map(|waiter| waiter.send(value.clone()))
            .filter(Result::is_ok)
            .count()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every waiter; their receivers observe cancellation.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.pending.values().map(Vec::len).sum();
        self.pending.clear();
        cancelled
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_requests_share_one_response() {
        let mut correlation: PendingCorrelation<&str, Option<u8>> = PendingCorrelation::new();
        let (first, send_first) = correlation.request("session");
        let (second, send_second) = correlation.request("session");
        assert!(send_first);
        assert!(!send_second);

        assert_eq!(correlation.on_response(&"session", Some(7)), 2);
        assert_eq!(first.await.unwrap(), Some(7));
        assert_eq!(second.await.unwrap(), Some(7));
        assert!(correlation.is_empty());
    }

    #[test]
    fn test_unregistered_key_is_a_no_op() {
        let mut correlation: PendingCorrelation<&str, u8> = PendingCorrelation::new();
        let (_rx, _) = correlation.request("a");
        assert_eq!(correlation.on_response(&"b", 1), 0);
        assert!(correlation.is_pending(&"a"));
    }

    #[test]
    fn test_key_is_cleared_after_response() {
        let mut correlation: PendingCorrelation<&str, u8> = PendingCorrelation::new();
        let (_rx, _) = correlation.request("a");
        correlation.on_response(&"a", 1);
        assert_eq!(correlation.on_response(&"a", 2), 0);

        let (_rx, first) = correlation.request("a");
        assert!(first);
    }

    #[tokio::test]
    async fn test_cancel_all_closes_receivers() {
        let mut correlation: PendingCorrelation<u32, u8> = PendingCorrelation::new();
        let (a, _) = correlation.request(1);
        let (b, _) = correlation.request(2);
        assert_eq!(correlation.cancel_all(), 2);
        assert!(a.await.is_err());
        assert!(b.await.is_err());
    }

    #[test]
    fn test_dropped_waiter_is_not_counted() {
        let mut correlation: PendingCorrelation<u32, u8> = PendingCorrelation::new();
        let (a, _) = correlation.request(1);
        let (_b, _) = correlation.request(1);
        drop(a);
        assert_eq!(correlation.on_response(&1, 9), 1);
    }
}
