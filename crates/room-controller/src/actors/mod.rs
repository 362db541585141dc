//! Actor model implementation for the Room Controller.
//!
//! ```text
//! RoomManagerActor (singleton per instance)
//! └── supervises N RoomActors
//!     └── RoomActor (one per room)
//!         ├── owns publisher registry, subscriber lists, external outputs
//!         └── issues RPCs through the shared RpcClient
//! ```
//!
//! # Modules
//!
//! - [`manager`] - `RoomManagerActor` singleton that supervises rooms
//! - [`room`] - `RoomActor` per room, serializes every membership mutation
//! - [`membership`] - Room state with guards and mutators
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod manager;
pub mod membership;
pub mod messages;
pub mod metrics;
pub mod room;

pub use manager::{ManagerLimits, RoomManagerActor, RoomManagerActorHandle};
pub use membership::{ExternalOutput, PublisherSource, RoomMembership};
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxMonitor};
pub use room::{RoomActor, RoomActorHandle, ROOM_CHANNEL_BUFFER};
