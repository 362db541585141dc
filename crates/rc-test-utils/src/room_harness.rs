//! Room harness for integration tests.
//!
//! `TestRoom` spawns a real `RoomActor` backed by a `MockRpcClient`, so tests
//! drive the public handle and assert on the calls the mock recorded.

use crate::fixtures::{publisher, sdp_offer, subscriber, TestSubscription};
use room_controller::actors::{ActorMetrics, RoomActor, RoomActorHandle, RoomSnapshot, ROOM_CHANNEL_BUFFER};
use room_controller::errors::RcError;
use room_controller::rpc::{MockRpcClient, RpcClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Polling budget for asynchronous state changes.
const WAIT_ATTEMPTS: usize = 100;
const WAIT_INTERVAL: Duration = Duration::from_millis(5);

/// A room actor wired to a recording RPC client.
pub struct TestRoom {
    pub handle: RoomActorHandle,
    pub rpc: Arc<MockRpcClient>,
    pub metrics: Arc<ActorMetrics>,
    task: Option<JoinHandle<()>>,
}

impl TestRoom {
    /// Room whose RPC calls are acknowledged immediately.
    #[must_use]
    pub fn auto_ack() -> Self {
        Self::with_mock(MockRpcClient::auto_ack())
    }

    /// Room whose RPC callbacks are held until resolved through `rpc`.
    #[must_use]
    pub fn manual() -> Self {
        Self::with_mock(MockRpcClient::manual())
    }

    #[must_use]
    pub fn with_mock(mock: MockRpcClient) -> Self {
        let rpc = Arc::new(mock);
        let metrics = ActorMetrics::new();
        let shared: Arc<dyn RpcClient> = Arc::clone(&rpc) as Arc<dyn RpcClient>;
        let (handle, task) = RoomActor::spawn(
            crate::fixtures::random_room_id(),
            ROOM_CHANNEL_BUFFER,
            CancellationToken::new(),
            shared,
            Arc::clone(&metrics),
        );

        Self {
            handle,
            rpc,
            metrics,
            task: Some(task),
        }
    }

    pub async fn state(&self) -> RoomSnapshot {
        self.handle.get_state().await.expect("room actor should answer")
    }

    /// Poll until `ready` holds; panics after the budget is spent.
    pub async fn wait_for(&self, what: &str, ready: impl Fn(&RoomSnapshot) -> bool) -> RoomSnapshot {
        for _ in 0..WAIT_ATTEMPTS {
            let state = self.state().await;
            if ready(&state) {
                return state;
            }
            tokio::time::sleep(WAIT_INTERVAL).await;
        }
        panic!("timed out waiting for {what}");
    }

    /// `addPublisher` and wait until the publisher is present. Requires an
    /// auto-acknowledging mock.
    pub async fn publish(&self, publisher_id: &str) {
        self.handle
            .add_publisher(publisher(publisher_id), sdp_offer(), None, None)
            .await
            .expect("addPublisher should be accepted");
        let id = publisher(publisher_id);
        self.wait_for("publisher to be admitted", |s| s.is_present(&id))
            .await;
    }

    pub async fn subscribe(&self, subscriber_id: &str, publisher_id: &str) -> Result<(), RcError> {
        self.handle
            .add_subscriber(TestSubscription::new(subscriber_id, publisher_id).build(), None, None)
            .await
    }

    pub async fn unsubscribe(&self, subscriber_id: &str, publisher_id: &str) -> Result<(), RcError> {
        self.handle
            .remove_subscriber(subscriber(subscriber_id), publisher(publisher_id))
            .await
    }

    /// Close the room and wait for the actor task to finish.
    pub async fn close(mut self) {
        self.handle.close().await.expect("close should be acknowledged");
        if let Some(task) = self.task.take() {
            tokio::time::timeout(Duration::from_secs(1), task)
                .await
                .expect("room actor should stop after close")
                .expect("room actor should not panic");
        }
    }
}

impl Drop for TestRoom {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
