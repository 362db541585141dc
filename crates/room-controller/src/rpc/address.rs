//! RPC addressing for the worker agent and per-worker endpoints.
//!
//! Endpoint names are part of the wire contract with the worker fleet and
//! must stay byte-for-byte stable: the agent is a single well-known name and
//! each worker is addressed as `ErizoJS_<publisher id>`.

use common::types::PublisherId;
use serde::Serialize;
use std::fmt;

/// Well-known endpoint that spawns workers.
pub const AGENT_ENDPOINT: &str = "ErizoAgent";

/// Prefix of every per-worker endpoint name.
pub const WORKER_ENDPOINT_PREFIX: &str = "ErizoJS_";

/// Name of an RPC target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EndpointRef(String);

impl EndpointRef {
    /// Borrow the endpoint name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The worker agent endpoint.
#[must_use]
pub fn agent_address() -> EndpointRef {
    EndpointRef(AGENT_ENDPOINT.to_string())
}

/// The endpoint of the worker owning `publisher_id` and all of its subscribers.
///
/// Total and injective over publisher identities; the identity is not
/// validated here.
#[must_use]
pub fn worker_address(publisher_id: &PublisherId) -> EndpointRef {
    EndpointRef(format!("{WORKER_ENDPOINT_PREFIX}{publisher_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_address_is_prefixed_identity() {
        let address = worker_address(&PublisherId::from("pub1"));
        assert_eq!(address.as_str(), "ErizoJS_pub1");
        assert_eq!(address.to_string(), "ErizoJS_pub1");
    }

    #[test]
    fn test_distinct_publishers_get_distinct_workers() {
        let a = worker_address(&PublisherId::from("12345"));
        let b = worker_address(&PublisherId::from("1234"));
        assert_ne!(a, b);
        assert_ne!(a, agent_address());
    }

    #[test]
    fn test_agent_address() {
        assert_eq!(agent_address().as_str(), "ErizoAgent");
    }
}
