//! Room Controller error types.
//!
//! Two families live here:
//!
//! - [`RcError`] is returned to the direct caller of a room or manager handle.
//!   Guard failures (a publisher already present, a subscriber not attached,
//!   ...) are typed rejections: no RPC was issued and no state changed.
//! - [`RpcError`] describes a failure of the RPC collaborator. It never comes
//!   back from a handle method; it is delivered only through the completion
//!   the caller supplied with the operation.

use thiserror::Error;

/// Room Controller error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RcError {
    /// Publisher is already present in the room.
    #[error("Publisher already present: {0}")]
    PublisherExists(String),

    /// Worker creation for this publisher is still in flight.
    #[error("Publisher pending worker creation: {0}")]
    PublisherPending(String),

    /// Publisher is not present in the room.
    #[error("Publisher not found: {0}")]
    PublisherNotFound(String),

    /// Subscriber is already attached to the publisher.
    #[error("Subscriber {subscriber_id} already attached to {publisher_id}")]
    SubscriberExists {
        subscriber_id: String,
        publisher_id: String,
    },

    /// Subscriber is not attached to the publisher.
    #[error("Subscriber {subscriber_id} not attached to {publisher_id}")]
    SubscriberNotFound {
        subscriber_id: String,
        publisher_id: String,
    },

    /// Session description is not an offer.
    #[error("Session description is not an offer")]
    NotAnOffer,

    /// External output already registered for this url.
    #[error("External output already registered: {0}")]
    OutputExists(String),

    /// No external output registered for this url.
    #[error("External output not found: {0}")]
    OutputNotFound(String),

    /// Room already hosted by the manager.
    #[error("Room already exists: {0}")]
    RoomExists(String),

    /// Room not hosted by the manager.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Manager is at its room limit.
    #[error("Room capacity exceeded")]
    RoomCapacityExceeded,

    /// Manager is draining (graceful shutdown).
    #[error("Room controller is draining")]
    Draining,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (actor channel failures).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RcError {
    /// Whether this error is a guard rejection over room state.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        self.rejection_reason().is_some()
    }

    /// Bounded metric label for guard rejections.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<&'static str> {
        match self {
            RcError::PublisherExists(_) => Some("publisher_exists"),
            RcError::PublisherPending(_) => Some("publisher_pending"),
            RcError::PublisherNotFound(_) => Some("publisher_not_found"),
            RcError::SubscriberExists { .. } => Some("subscriber_exists"),
            RcError::SubscriberNotFound { .. } => Some("subscriber_not_found"),
            RcError::NotAnOffer => Some("not_an_offer"),
            RcError::OutputExists(_) => Some("output_exists"),
            RcError::OutputNotFound(_) => Some("output_not_found"),
            RcError::RoomExists(_)
            | RcError::RoomNotFound(_)
            | RcError::RoomCapacityExceeded
            | RcError::Draining
            | RcError::Config(_)
            | RcError::Internal(_) => None,
        }
    }
}

/// Failure reported by the RPC collaborator for a single call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The call could not be delivered.
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// The remote side handled the call and reported an error.
    #[error("Remote error: {0}")]
    Remote(String),

    /// The collaborator gave up waiting for a reply.
    #[error("RPC call timed out")]
    Timeout,

    /// The collaborator is shut down and no longer dispatches calls.
    #[error("RPC client unavailable")]
    Unavailable,
}
