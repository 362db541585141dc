//! The RPC collaborator seam.
//!
//! The room actor talks to workers only through [`RpcClient::call`], which
//! must return without waiting on the remote side. Outcomes come back through
//! the [`RpcCallbacks`] attached to the call: a one-shot completion and, for
//! calls that negotiate a media connection, a second ready signal fired when
//! the remote side reaches a stable state.

use super::address::EndpointRef;
use crate::errors::RpcError;
use serde_json::Value;
use std::fmt;
use tokio::sync::oneshot;

/// Outcome of one RPC call as seen by a completion.
pub type RpcReply = Result<Value, RpcError>;

/// One-shot completion marker handed to the RPC collaborator.
pub type Completion = oneshot::Sender<RpcReply>;

/// Create a completion marker and the receiver its outcome arrives on.
#[must_use]
pub fn completion_channel() -> (Completion, oneshot::Receiver<RpcReply>) {
    oneshot::channel()
}

/// Methods understood by the worker agent and the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    /// Agent: spawn a worker for a publisher.
    CreateWorker,
    AddExternalInput,
    AddExternalOutput,
    RemoveExternalOutput,
    AddPublisher,
    AddSubscriber,
    RemovePublisher,
    RemoveSubscriber,
}

impl RpcMethod {
    /// Method name on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::CreateWorker => "createErizoJS",
            RpcMethod::AddExternalInput => "addExternalInput",
            RpcMethod::AddExternalOutput => "addExternalOutput",
            RpcMethod::RemoveExternalOutput => "removeExternalOutput",
            RpcMethod::AddPublisher => "addPublisher",
            RpcMethod::AddSubscriber => "addSubscriber",
            RpcMethod::RemovePublisher => "removePublisher",
            RpcMethod::RemoveSubscriber => "removeSubscriber",
        }
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion and ready markers travelling with a call.
///
/// Fire-and-forget calls carry neither. The two markers are distinct: the
/// completion reports the initial acknowledgement, the ready marker reports
/// that the stream is fully established.
#[derive(Debug, Default)]
pub struct RpcCallbacks {
    completion: Option<Completion>,
    on_ready: Option<Completion>,
}

impl RpcCallbacks {
    /// Fire-and-forget.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Completion marker only.
    #[must_use]
    pub fn completion_only(completion: Option<Completion>) -> Self {
        Self {
            completion,
            on_ready: None,
        }
    }

    /// Completion and ready markers.
    #[must_use]
    pub fn with_ready(completion: Option<Completion>, on_ready: Option<Completion>) -> Self {
        Self {
            completion,
            on_ready,
        }
    }

    #[must_use]
    pub fn has_completion(&self) -> bool {
        self.completion.is_some()
    }

    #[must_use]
    pub fn has_ready(&self) -> bool {
        self.on_ready.is_some()
    }

    /// Deliver the acknowledgement. Later calls are ignored.
    pub fn complete(&mut self, reply: RpcReply) {
        if let Some(completion) = self.completion.take() {
            // Receiver may have been dropped by a caller that stopped waiting.
            let _ = completion.send(reply);
        }
    }

    /// Deliver the ready signal. Later calls are ignored.
    pub fn ready(&mut self, reply: RpcReply) {
        if let Some(on_ready) = self.on_ready.take() {
            let _ = on_ready.send(reply);
        }
    }

    /// Deliver a failure to every marker still pending.
    pub fn fail(mut self, error: RpcError) {
        self.complete(Err(error.clone()));
        self.ready(Err(error));
    }
}

/// Asynchronous RPC client shared by every room on this instance.
///
/// Implementations own delivery, retries and timeouts. `call` must not block:
/// it hands the call off and returns. Calls issued for the same target must
/// be dispatched in the order `call` was invoked.
pub trait RpcClient: Send + Sync {
    /// Issue `method(args)` against `target`.
    fn call(
        &self,
        target: &EndpointRef,
        method: RpcMethod,
        args: Vec<Value>,
        callbacks: RpcCallbacks,
    );

    /// Hint that no further calls will be issued for `target`.
    fn release(&self, _target: &EndpointRef) {}
}
