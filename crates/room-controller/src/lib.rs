//! Room Controller Service Library
//!
//! The Room Controller owns the authoritative membership of media rooms
//! (publishers, the subscribers attached to each publisher, and external
//! outputs) and turns session intents into addressed RPC calls against the
//! worker process serving each publisher.
//!
//! # Architecture
//!
//! ```text
//! RoomManagerActor (singleton per instance)
//! └── RoomActor (one per room)
//!         │  call(target, method, args, callbacks)
//!         ▼
//!     RpcClient (shared) ──► ErizoAgent        createErizoJS
//!                       └──► ErizoJS_<pub id>  addPublisher, addSubscriber, ...
//! ```
//!
//! # Modules
//!
//! - [`actors`] - Room and manager actors, membership state
//! - [`rpc`] - Endpoint addressing, the `RpcClient` seam, HTTP and mock clients
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types
//! - [`observability`] - Health endpoints and Prometheus metrics

pub mod actors;
pub mod config;
pub mod errors;
pub mod observability;
pub mod rpc;
