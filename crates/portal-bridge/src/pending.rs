//! Pending call table for the request correlator.
//!
//! Each outbound request that expects a response owns exactly one entry,
//! keyed by its [`RequestId`]. The entry is removed when the matching
//! response arrives, when the caller gives up (timeout or dropped future),
//! or when the bridge closes.

use std::collections::BTreeMap;

use portal_core::{BridgeError, RequestId};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// Outcome delivered to a waiting caller.
pub type CallResult = Result<Value, BridgeError>;

/// A call waiting for its response.
#[derive(Debug)]
pub struct PendingCall {
    method: String,
    seq: u64,
    created_at: Instant,
    tx: oneshot::Sender<CallResult>,
}

impl PendingCall {
    /// Method name, for logging.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// When the call was registered.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    fn settle(self, result: CallResult) {
        // receiver gone means the caller stopped waiting
        let _ = self.tx.send(result);
    }
}

/// The set of in-flight calls.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: BTreeMap<RequestId, PendingCall>,
    next_seq: u64,
}

impl PendingCalls {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call. Returns `None` if `id` is already pending.
    pub fn register(
        &mut self,
        id: RequestId,
        method: &str,
    ) -> Option<oneshot::Receiver<CallResult>> {
        if self.calls.contains_key(&id) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq;
        self.next_seq += 1;
        let _ = self.calls.insert(
            id,
            PendingCall {
                method: method.to_owned(),
                seq,
                created_at: Instant::now(),
                tx,
            },
        );
        Some(rx)
    }

    /// Settle and remove the call for `id`. Returns `false` for unknown ids.
    pub fn complete(&mut self, id: RequestId, result: CallResult) -> bool {
        match self.calls.remove(&id) {
            Some(call) => {
                let elapsed_ms =
                    u64::try_from(call.created_at.elapsed().as_millis()).unwrap_or(u64::MAX);
                debug!(
                    %id,
                    method = %call.method,
                    elapsed_ms,
                    ok = result.is_ok(),
                    "settled pending call"
                );
                call.settle(result);
                true
            }
            None => false,
        }
    }

    /// Remove the call for `id` without settling it.
    pub fn abandon(&mut self, id: RequestId) -> Option<PendingCall> {
        self.calls.remove(&id)
    }

    /// Reject every pending call with [`BridgeError::ConnectionClosed`], in
    /// registration order. Returns how many were rejected.
    pub fn close_all(&mut self) -> usize {
        let mut calls: Vec<PendingCall> = std::mem::take(&mut self.calls).into_values().collect();
        calls.sort_by_key(|c| c.seq);
        let count = calls.len();
        for call in calls {
            call.settle(Err(BridgeError::ConnectionClosed));
        }
        count
    }

    /// Whether `id` is in flight.
    pub fn contains(&self, id: RequestId) -> bool {
        self.calls.contains_key(&id)
    }

    /// Number of in-flight calls.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use portal_core::JsonRpcError;
    use serde_json::json;

    fn id(n: u64) -> RequestId {
        RequestId::from_raw(n)
    }

    #[tokio::test]
    async fn complete_resolves_receiver() {
        let mut table = PendingCalls::new();
        let rx = table.register(id(1), "accounts").unwrap();

        assert!(table.complete(id(1), Ok(json!(["0xabc"]))));
        assert_eq!(rx.await.unwrap().unwrap(), json!(["0xabc"]));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn complete_with_error_rejects_receiver() {
        let mut table = PendingCalls::new();
        let rx = table.register(id(1), "signMessage").unwrap();

        assert!(table.complete(id(1), Err(JsonRpcError::new(-32000, "User rejected").into())));
        assert_matches!(
            rx.await.unwrap(),
            Err(BridgeError::Remote(e)) if e.message == "User rejected"
        );
    }

    #[test]
    fn duplicate_registration_is_refused() {
        let mut table = PendingCalls::new();
        let _rx = table.register(id(1), "a").unwrap();
        assert!(table.register(id(1), "b").is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn second_completion_is_dropped() {
        let mut table = PendingCalls::new();
        let _rx = table.register(id(1), "a").unwrap();
        assert!(table.complete(id(1), Ok(json!(1))));
        assert!(!table.complete(id(1), Ok(json!(2))));
    }

    #[test]
    fn unknown_id_is_dropped() {
        let mut table = PendingCalls::new();
        assert!(!table.complete(id(99), Ok(json!(null))));
    }

    #[test]
    fn abandon_removes_without_settling() {
        let mut table = PendingCalls::new();
        let mut rx = table.register(id(1), "network").unwrap();
        let call = table.abandon(id(1)).unwrap();
        assert_eq!(call.method(), "network");
        assert!(!table.contains(id(1)));
        // sender still alive inside `call`
        assert!(rx.try_recv().is_err());
        drop(call);
        assert_matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Closed));
    }

    #[test]
    fn completion_after_caller_dropped_is_harmless() {
        let mut table = PendingCalls::new();
        let rx = table.register(id(1), "a").unwrap();
        drop(rx);
        assert!(table.complete(id(1), Ok(json!(1))));
    }

    #[tokio::test]
    async fn close_all_rejects_in_registration_order() {
        let mut table = PendingCalls::new();
        // ids deliberately out of numeric order
        let order = [5_u64, 2, 9];
        let receivers: Vec<_> = order
            .iter()
            .map(|n| table.register(id(*n), "m").unwrap())
            .collect();

        assert_eq!(table.close_all(), 3);
        assert!(table.is_empty());
        for rx in receivers {
            assert_matches!(rx.await.unwrap(), Err(BridgeError::ConnectionClosed));
        }
    }

    #[test]
    fn close_all_ordering_uses_seq() {
        let mut table = PendingCalls::new();
        let _a = table.register(id(5), "first").unwrap();
        let _b = table.register(id(2), "second").unwrap();
        let mut calls: Vec<&PendingCall> = table.calls.values().collect();
        calls.sort_by_key(|c| c.seq);
        let methods: Vec<&str> = calls.iter().map(|c| c.method()).collect();
        assert_eq!(methods, ["first", "second"]);
    }

    proptest::proptest! {
        #[test]
        fn len_tracks_unsettled_calls(
            ids in proptest::collection::btree_set(1_u64..1_000, 1..32),
            settle_mask in proptest::collection::vec(proptest::bool::ANY, 32),
        ) {
            let mut table = PendingCalls::new();
            let mut receivers = Vec::new();
            for n in &ids {
                receivers.push(table.register(id(*n), "m").unwrap());
            }
            let mut open = ids.len();
            for (n, settle) in ids.iter().zip(&settle_mask) {
                if *settle {
                    proptest::prop_assert!(table.complete(id(*n), Ok(json!(n))));
                    open -= 1;
                }
            }
            proptest::prop_assert_eq!(table.len(), open);
            proptest::prop_assert_eq!(table.close_all(), open);
            proptest::prop_assert!(table.is_empty());
        }
    }
}
