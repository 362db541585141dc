//! Message types for actor communication.
//!
//! Request-reply uses `tokio::sync::oneshot`. Completion and ready markers
//! supplied by the caller travel inside the message untouched until the room
//! hands them to the RPC collaborator (or drops them on rejection).

use super::membership::ExternalOutput;
use super::room::RoomActorHandle;
use crate::errors::RcError;
use crate::rpc::{Completion, RpcCallbacks, RpcReply};
use common::types::{PublisherId, RoomId, SubscriberId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Opaque session description forwarded to workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionDescription(String);

impl SessionDescription {
    #[must_use]
    pub fn new(sdp: impl Into<String>) -> Self {
        Self(sdp.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the description carries an offer. Case-sensitive substring
    /// match on `OFFER`; anything else is treated as not an offer.
    #[must_use]
    pub fn is_offer(&self) -> bool {
        self.0.contains("OFFER")
    }
}

impl From<&str> for SessionDescription {
    fn from(sdp: &str) -> Self {
        Self::new(sdp)
    }
}

/// Parameters of an `addSubscriber` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub subscriber_id: SubscriberId,
    pub publisher_id: PublisherId,
    pub audio: bool,
    pub video: bool,
    pub sdp: SessionDescription,
}

/// When local membership is updated relative to the remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationMode {
    /// Membership changes only after the worker-creation ack arrives.
    GatedOnAck,
    /// Membership changes in the same step the call is issued.
    Eager,
}

/// Room lifecycle operations, used for dispatch tagging and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomOperation {
    AddExternalInput,
    AddExternalOutput,
    RemoveExternalOutput,
    AddPublisher,
    AddSubscriber,
    RemovePublisher,
    RemoveSubscriber,
    RemoveSubscriptions,
}

impl RoomOperation {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RoomOperation::AddExternalInput => "add_external_input",
            RoomOperation::AddExternalOutput => "add_external_output",
            RoomOperation::RemoveExternalOutput => "remove_external_output",
            RoomOperation::AddPublisher => "add_publisher",
            RoomOperation::AddSubscriber => "add_subscriber",
            RoomOperation::RemovePublisher => "remove_publisher",
            RoomOperation::RemoveSubscriber => "remove_subscriber",
            RoomOperation::RemoveSubscriptions => "remove_subscriptions",
        }
    }

    /// Only `addPublisher` waits for worker creation before admitting.
    #[must_use]
    pub const fn mutation_mode(&self) -> MutationMode {
        match self {
            RoomOperation::AddPublisher => MutationMode::GatedOnAck,
            RoomOperation::AddExternalInput
            | RoomOperation::AddExternalOutput
            | RoomOperation::RemoveExternalOutput
            | RoomOperation::AddSubscriber
            | RoomOperation::RemovePublisher
            | RoomOperation::RemoveSubscriber
            | RoomOperation::RemoveSubscriptions => MutationMode::Eager,
        }
    }
}

/// Messages sent to `RoomManagerActor`.
#[derive(Debug)]
pub enum ManagerMessage {
    /// Spawn a room actor for the given room ID.
    CreateRoom {
        room_id: RoomId,
        respond_to: oneshot::Sender<Result<RoomActorHandle, RcError>>,
    },

    /// Get a handle to an existing room actor.
    GetRoom {
        room_id: RoomId,
        respond_to: oneshot::Sender<Result<RoomActorHandle, RcError>>,
    },

    /// Close a room: its publishers are removed from their workers.
    RemoveRoom {
        room_id: RoomId,
        respond_to: oneshot::Sender<Result<(), RcError>>,
    },

    GetStatus {
        respond_to: oneshot::Sender<ManagerStatus>,
    },

    /// Initiate graceful shutdown (SIGTERM received).
    Shutdown {
        /// Per-room budget for draining.
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), RcError>>,
    },
}

/// Messages sent to `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    AddExternalInput {
        publisher_id: PublisherId,
        url: String,
        completion: Option<Completion>,
        respond_to: oneshot::Sender<Result<(), RcError>>,
    },

    AddExternalOutput {
        publisher_id: PublisherId,
        url: String,
        respond_to: oneshot::Sender<Result<ExternalOutput, RcError>>,
    },

    RemoveExternalOutput {
        publisher_id: PublisherId,
        url: String,
        respond_to: oneshot::Sender<Result<(), RcError>>,
    },

    /// Request a worker, then publish once it is acknowledged.
    AddPublisher {
        publisher_id: PublisherId,
        sdp: SessionDescription,
        completion: Option<Completion>,
        on_ready: Option<Completion>,
        respond_to: oneshot::Sender<Result<(), RcError>>,
    },

    AddSubscriber {
        request: SubscribeRequest,
        completion: Option<Completion>,
        on_ready: Option<Completion>,
        respond_to: oneshot::Sender<Result<(), RcError>>,
    },

    RemovePublisher {
        publisher_id: PublisherId,
        respond_to: oneshot::Sender<Result<(), RcError>>,
    },

    RemoveSubscriber {
        subscriber_id: SubscriberId,
        publisher_id: PublisherId,
        respond_to: oneshot::Sender<Result<(), RcError>>,
    },

    /// Detach a subscriber from every publisher it is attached to.
    RemoveSubscriptions {
        subscriber_id: SubscriberId,
        /// Publishers the subscriber was detached from.
        respond_to: oneshot::Sender<Vec<PublisherId>>,
    },

    /// Worker-creation acknowledgement for a pending publisher (internal).
    WorkerCreated {
        publisher_id: PublisherId,
        sdp: SessionDescription,
        reply: RpcReply,
        /// The caller's markers, forwarded to `addPublisher`.
        callbacks: RpcCallbacks,
        requested_at: Instant,
    },

    GetState {
        respond_to: oneshot::Sender<RoomSnapshot>,
    },

    /// Remove every publisher from its worker and stop the actor.
    Close {
        respond_to: oneshot::Sender<()>,
    },
}

/// Point-in-time view of a room's membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    /// Present publishers and their subscribers in attach order.
    pub publishers: BTreeMap<PublisherId, Vec<SubscriberId>>,
    /// Publishers awaiting worker creation.
    pub pending: BTreeSet<PublisherId>,
    pub outputs: Vec<ExternalOutput>,
    pub mailbox_depth: usize,
}

impl RoomSnapshot {
    #[must_use]
    pub fn is_present(&self, publisher_id: &PublisherId) -> bool {
        self.publishers.contains_key(publisher_id)
    }

    #[must_use]
    pub fn subscribers_of(&self, publisher_id: &PublisherId) -> Option<&[SubscriberId]> {
        self.publishers.get(publisher_id).map(Vec::as_slice)
    }
}

/// Manager status (for health checks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerStatus {
    pub room_count: usize,
    pub publisher_count: usize,
    pub subscriber_count: usize,
    pub is_draining: bool,
    pub mailbox_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_detection_is_case_sensitive_substring() {
        assert!(SessionDescription::from("{\"type\":\"OFFER\",\"sdp\":\"v=0\"}").is_offer());
        assert!(SessionDescription::from("OFFER").is_offer());
        assert!(!SessionDescription::from("{\"type\":\"offer\"}").is_offer());
        assert!(!SessionDescription::from("ANSWER").is_offer());
        assert!(!SessionDescription::from("").is_offer());
    }

    #[test]
    fn test_only_add_publisher_is_gated() {
        assert_eq!(
            RoomOperation::AddPublisher.mutation_mode(),
            MutationMode::GatedOnAck
        );
        for op in [
            RoomOperation::AddExternalInput,
            RoomOperation::AddExternalOutput,
            RoomOperation::RemoveExternalOutput,
            RoomOperation::AddSubscriber,
            RoomOperation::RemovePublisher,
            RoomOperation::RemoveSubscriber,
            RoomOperation::RemoveSubscriptions,
        ] {
            assert_eq!(op.mutation_mode(), MutationMode::Eager, "{}", op.as_str());
        }
    }

    #[test]
    fn test_operation_labels() {
        assert_eq!(RoomOperation::AddSubscriber.as_str(), "add_subscriber");
        assert_eq!(
            RoomOperation::RemoveSubscriptions.as_str(),
            "remove_subscriptions"
        );
    }
}
