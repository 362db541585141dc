//! Identity types for rooms and their members.
//!
//! Identities are opaque tokens supplied by callers. They are compared for
//! equality only; no format validation happens here.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a caller-supplied identity.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identity.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

opaque_id!(
    /// Identifier of a room (one controller instance per room).
    RoomId
);

opaque_id!(
    /// Identifier of an inbound media stream source.
    PublisherId
);

opaque_id!(
    /// Identifier of a consumer attached to a publisher.
    SubscriberId
);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_raw_identity() {
        assert_eq!(PublisherId::from("pub1").to_string(), "pub1");
        assert_eq!(SubscriberId::new("subA").as_str(), "subA");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_value(PublisherId::from("pub1")).unwrap();
        assert_eq!(json, serde_json::json!("pub1"));

        let back: RoomId = serde_json::from_str("\"room-9\"").unwrap();
        assert_eq!(back, RoomId::from("room-9"));
    }
}
