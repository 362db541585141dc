//! RPC plumbing between rooms and the worker fleet.
//!
//! - [`address`] - agent and per-worker endpoint names
//! - [`client`] - the `RpcClient` seam, methods, completion and ready markers
//! - [`http`] - `HttpRpcClient`, the production collaborator
//! - [`mock`] - `MockRpcClient`, a recording client for tests

pub mod address;
pub mod client;
pub mod http;
pub mod mock;

pub use address::{agent_address, worker_address, EndpointRef, AGENT_ENDPOINT};
pub use client::{
    completion_channel, Completion, RpcCallbacks, RpcClient, RpcMethod, RpcReply,
};
pub use http::HttpRpcClient;
pub use mock::{MockRpcClient, RecordedCall};
