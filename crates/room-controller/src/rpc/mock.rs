//! Mock RPC client for tests.
//!
//! Records every call and resolves its callbacks according to the mode:
//!
//! - [`MockRpcClient::auto_ack`] acknowledges (and signals ready) immediately.
//! - [`MockRpcClient::manual`] holds callbacks until the test resolves them
//!   with [`MockRpcClient::resolve_next`].
//!
//! Either mode can be told to fail a method with [`MockRpcClient::with_failure`].

use super::address::EndpointRef;
use super::client::{RpcCallbacks, RpcClient, RpcMethod, RpcReply};
use crate::errors::RpcError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// A call as observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub target: EndpointRef,
    pub method: RpcMethod,
    pub args: Vec<Value>,
    pub has_completion: bool,
    pub has_ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockMode {
    AutoAck,
    Manual,
}

struct HeldCall {
    method: RpcMethod,
    callbacks: RpcCallbacks,
}

/// Recording RPC client.
pub struct MockRpcClient {
    mode: MockMode,
    failures: HashMap<RpcMethod, RpcError>,
    calls: Mutex<Vec<RecordedCall>>,
    held: Mutex<Vec<HeldCall>>,
    released: Mutex<Vec<EndpointRef>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockRpcClient {
    /// Mock that acknowledges every call immediately.
    #[must_use]
    pub fn auto_ack() -> Self {
        Self::with_mode(MockMode::AutoAck)
    }

    /// Mock that holds callbacks until resolved by the test.
    #[must_use]
    pub fn manual() -> Self {
        Self::with_mode(MockMode::Manual)
    }

    fn with_mode(mode: MockMode) -> Self {
        Self {
            mode,
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        }
    }

    /// Fail every call of `method` with `error`.
    #[must_use]
    pub fn with_failure(mut self, method: RpcMethod, error: RpcError) -> Self {
        self.failures.insert(method, error);
        self
    }

    /// All calls so far, in dispatch order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        locked(&self.calls).clone()
    }

    /// Calls of one method, in dispatch order.
    #[must_use]
    pub fn calls_to(&self, method: RpcMethod) -> Vec<RecordedCall> {
        locked(&self.calls)
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        locked(&self.calls).len()
    }

    /// Targets released so far.
    #[must_use]
    pub fn released(&self) -> Vec<EndpointRef> {
        locked(&self.released).clone()
    }

    /// Calls whose callbacks are still held (manual mode).
    #[must_use]
    pub fn held_count(&self) -> usize {
        locked(&self.held).len()
    }

    /// Resolve the oldest held call of `method`, sending `reply` to its
    /// completion and ready markers. Returns false if none is held.
    pub fn resolve_next(&self, method: RpcMethod, reply: RpcReply) -> bool {
        let held = {
            let mut held = locked(&self.held);
            match held.iter().position(|h| h.method == method) {
                Some(index) => held.remove(index),
                None => return false,
            }
        };

        let mut callbacks = held.callbacks;
        match reply {
            Ok(value) => {
                callbacks.complete(Ok(value.clone()));
                callbacks.ready(Ok(value));
            }
            Err(e) => callbacks.fail(e),
        }
        true
    }
}

impl RpcClient for MockRpcClient {
    fn call(
        &self,
        target: &EndpointRef,
        method: RpcMethod,
        args: Vec<Value>,
        mut callbacks: RpcCallbacks,
    ) {
        debug!(target: "rc.rpc.mock", endpoint = %target, method = %method, "Recorded RPC call");

        locked(&self.calls).push(RecordedCall {
            target: target.clone(),
            method,
            args,
            has_completion: callbacks.has_completion(),
            has_ready: callbacks.has_ready(),
        });

        if let Some(error) = self.failures.get(&method) {
            callbacks.fail(error.clone());
            return;
        }

        match self.mode {
            MockMode::AutoAck => {
                callbacks.complete(Ok(Value::Null));
                callbacks.ready(Ok(Value::Null));
            }
            MockMode::Manual => locked(&self.held).push(HeldCall { method, callbacks }),
        }
    }

    fn release(&self, target: &EndpointRef) {
        locked(&self.released).push(target.clone());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::rpc::client::completion_channel;
    use crate::rpc::agent_address;
    use serde_json::json;

    #[tokio::test]
    async fn test_auto_ack_records_and_completes() {
        let mock = MockRpcClient::auto_ack();
        let (completion, rx) = completion_channel();
        mock.call(
            &agent_address(),
            RpcMethod::CreateWorker,
            vec![json!("pub1")],
            RpcCallbacks::completion_only(Some(completion)),
        );

        assert_eq!(rx.await.unwrap(), Ok(Value::Null));
        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target, agent_address());
        assert_eq!(calls[0].args, vec![json!("pub1")]);
        assert!(calls[0].has_completion);
        assert!(!calls[0].has_ready);
    }

    #[tokio::test]
    async fn test_manual_holds_until_resolved() {
        let mock = MockRpcClient::manual();
        let (completion, mut rx) = completion_channel();
        mock.call(
            &agent_address(),
            RpcMethod::CreateWorker,
            vec![json!("pub1")],
            RpcCallbacks::completion_only(Some(completion)),
        );

        assert_eq!(mock.held_count(), 1);
        assert!(rx.try_recv().is_err());

        assert!(mock.resolve_next(RpcMethod::CreateWorker, Ok(json!("ok"))));
        assert_eq!(rx.await.unwrap(), Ok(json!("ok")));
        assert!(!mock.resolve_next(RpcMethod::CreateWorker, Ok(Value::Null)));
    }

    #[tokio::test]
    async fn test_configured_failure() {
        let mock = MockRpcClient::auto_ack().with_failure(RpcMethod::CreateWorker, RpcError::Timeout);
        let (completion, rx) = completion_channel();
        mock.call(
            &agent_address(),
            RpcMethod::CreateWorker,
            vec![json!("pub1")],
            RpcCallbacks::completion_only(Some(completion)),
        );

        assert_eq!(rx.await.unwrap(), Err(RpcError::Timeout));
    }
}
