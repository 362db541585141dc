//! # RC Test Utilities
//!
//! Shared test utilities for the Room Controller.
//!
//! - `fixtures` - identities and session descriptions
//! - `room_harness` - `TestRoom`, a room actor wired to a `MockRpcClient`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let room = TestRoom::auto_ack();
//!     room.publish("pub1").await;
//!     room.subscribe("sub1", "pub1").await.unwrap();
//!
//!     let state = room.state().await;
//!     assert_eq!(state.subscribers_of(&publisher("pub1")).unwrap().len(), 1);
//! }
//! ```

pub mod fixtures;
pub mod room_harness;

pub use fixtures::*;
pub use room_harness::TestRoom;
