//! `RoomManagerActor` - singleton supervisor for room actors.
//!
//! - Singleton per Room Controller instance
//! - Supervises N `RoomActor` instances sharing one injected RPC client
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors child actor health (panic detection via `JoinHandle`)
//!
//! # Graceful Shutdown
//!
//! On SIGTERM, the manager:
//! 1. Sets `accepting_new = false`
//! 2. Cancels the root `CancellationToken` (propagates to all rooms)
//! 3. Waits for each room to remove its publishers and stop, bounded by the deadline

use crate::config::Config;
use crate::errors::RcError;
use crate::rpc::RpcClient;

use super::messages::{ManagerMessage, ManagerStatus};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::room::{RoomActor, RoomActorHandle, ROOM_CHANNEL_BUFFER};

use common::types::RoomId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the manager mailbox.
const MANAGER_CHANNEL_BUFFER: usize = 1000;

/// Time allowed for a removed room to close before it is reaped.
const ROOM_REMOVAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-room budget when draining without an explicit deadline.
const DEFAULT_DRAIN_DEADLINE: Duration = Duration::from_secs(30);

/// Limits applied by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerLimits {
    pub max_rooms: usize,
    pub room_mailbox_size: usize,
}

impl Default for ManagerLimits {
    fn default() -> Self {
        Self {
            max_rooms: 1000,
            room_mailbox_size: ROOM_CHANNEL_BUFFER,
        }
    }
}

impl From<&Config> for ManagerLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_rooms: config.max_rooms,
            room_mailbox_size: config.room_mailbox_size,
        }
    }
}

/// Handle to the `RoomManagerActor`.
#[derive(Clone)]
pub struct RoomManagerActorHandle {
    sender: mpsc::Sender<ManagerMessage>,
    cancel_token: CancellationToken,
}

impl RoomManagerActorHandle {
    /// Spawn the manager and return a handle to it.
    ///
    /// # Arguments
    ///
    /// * `rc_id` - Instance ID
    /// * `rpc` - RPC client shared by every room
    /// * `metrics` - Shared actor metrics
    /// * `limits` - Room count and mailbox limits
    #[must_use]
    pub fn new(
        rc_id: String,
        rpc: Arc<dyn RpcClient>,
        metrics: Arc<ActorMetrics>,
        limits: ManagerLimits,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(MANAGER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = RoomManagerActor::new(rc_id, receiver, cancel_token.clone(), rpc, metrics, limits);

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(tokio::sync::oneshot::Sender<T>) -> ManagerMessage,
    ) -> Result<T, RcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))
    }

    /// Create a room and return a handle to its actor.
    pub async fn create_room(&self, room_id: RoomId) -> Result<RoomActorHandle, RcError> {
        self.request(|respond_to| ManagerMessage::CreateRoom {
            room_id,
            respond_to,
        })
        .await?
    }

    pub async fn get_room(&self, room_id: RoomId) -> Result<RoomActorHandle, RcError> {
        self.request(|respond_to| ManagerMessage::GetRoom {
            room_id,
            respond_to,
        })
        .await?
    }

    /// Remove a room. Its publishers are removed from their workers in the
    /// background; this returns once the room is no longer hosted.
    pub async fn remove_room(&self, room_id: RoomId) -> Result<(), RcError> {
        self.request(|respond_to| ManagerMessage::RemoveRoom {
            room_id,
            respond_to,
        })
        .await?
    }

    pub async fn get_status(&self) -> Result<ManagerStatus, RcError> {
        self.request(|respond_to| ManagerMessage::GetStatus { respond_to })
            .await
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), RcError> {
        self.request(|respond_to| ManagerMessage::Shutdown {
            deadline,
            respond_to,
        })
        .await?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for tasks that should stop with the manager.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

struct ManagedRoom {
    handle: RoomActorHandle,
    task_handle: JoinHandle<()>,
}

/// The `RoomManagerActor` implementation.
pub struct RoomManagerActor {
    rc_id: String,
    receiver: mpsc::Receiver<ManagerMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    rpc: Arc<dyn RpcClient>,
    rooms: HashMap<RoomId, ManagedRoom>,
    accepting_new: bool,
    limits: ManagerLimits,
    drain_deadline: Duration,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomManagerActor {
    fn new(
        rc_id: String,
        receiver: mpsc::Receiver<ManagerMessage>,
        cancel_token: CancellationToken,
        rpc: Arc<dyn RpcClient>,
        metrics: Arc<ActorMetrics>,
        limits: ManagerLimits,
    ) -> Self {
        let mailbox = MailboxMonitor::new(ActorType::Manager, &rc_id);

        Self {
            rc_id,
            receiver,
            cancel_token,
            rpc,
            rooms: HashMap::new(),
            accepting_new: true,
            limits,
            drain_deadline: DEFAULT_DRAIN_DEADLINE,
            metrics,
            mailbox,
        }
    }

    #[instrument(skip_all, name = "rc.actor.manager", fields(rc_id = %self.rc_id))]
    async fn run(mut self) {
        info!(
            target: "rc.actor.manager",
            rc_id = %self.rc_id,
            max_rooms = self.limits.max_rooms,
            "RoomManagerActor started"
        );

        loop {
            self.check_room_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "rc.actor.manager",
                        rc_id = %self.rc_id,
                        "RoomManagerActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_received(self.receiver.len());
                            self.handle_message(message);
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "rc.actor.manager",
                                rc_id = %self.rc_id,
                                "RoomManagerActor channel closed, exiting"
                            );
                            self.graceful_shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "rc.actor.manager",
            rc_id = %self.rc_id,
            messages_processed = self.mailbox.messages_processed(),
            "RoomManagerActor stopped"
        );
    }

    fn handle_message(&mut self, message: ManagerMessage) {
        match message {
            ManagerMessage::CreateRoom {
                room_id,
                respond_to,
            } => {
                let result = self.create_room(room_id);
                let _ = respond_to.send(result);
            }

            ManagerMessage::GetRoom {
                room_id,
                respond_to,
            } => {
                let result = self
                    .rooms
                    .get(&room_id)
                    .map(|managed| managed.handle.clone())
                    .ok_or_else(|| RcError::RoomNotFound(room_id.to_string()));
                let _ = respond_to.send(result);
            }

            ManagerMessage::RemoveRoom {
                room_id,
                respond_to,
            } => {
                let result = self.remove_room(&room_id);
                let _ = respond_to.send(result);
            }

            ManagerMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            ManagerMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                self.initiate_shutdown(deadline);
                let _ = respond_to.send(Ok(()));
            }
        }
    }

    fn create_room(&mut self, room_id: RoomId) -> Result<RoomActorHandle, RcError> {
        if !self.accepting_new {
            return Err(RcError::Draining);
        }
        if self.rooms.contains_key(&room_id) {
            return Err(RcError::RoomExists(room_id.to_string()));
        }
        if self.rooms.len() >= self.limits.max_rooms {
            warn!(
                target: "rc.actor.manager",
                rc_id = %self.rc_id,
                max_rooms = self.limits.max_rooms,
                "Room capacity reached"
            );
            return Err(RcError::RoomCapacityExceeded);
        }

        let (handle, task_handle) = RoomActor::spawn(
            room_id.clone(),
            self.limits.room_mailbox_size,
            self.cancel_token.child_token(),
            Arc::clone(&self.rpc),
            Arc::clone(&self.metrics),
        );

        self.rooms.insert(
            room_id.clone(),
            ManagedRoom {
                handle: handle.clone(),
                task_handle,
            },
        );
        self.metrics.room_created();

        info!(
            target: "rc.actor.manager",
            rc_id = %self.rc_id,
            room_id = %room_id,
            total_rooms = self.rooms.len(),
            "Room actor created"
        );

        Ok(handle)
    }

    /// Stop hosting a room. Closing and reaping happen in a background task
    /// so the message loop is never blocked on a room.
    fn remove_room(&mut self, room_id: &RoomId) -> Result<(), RcError> {
        let managed = self
            .rooms
            .remove(room_id)
            .ok_or_else(|| RcError::RoomNotFound(room_id.to_string()))?;

        self.metrics.room_removed();

        let rc_id = self.rc_id.clone();
        let room_id_owned = room_id.clone();
        tokio::spawn(async move {
            let ManagedRoom {
                handle,
                task_handle,
            } = managed;

            if let Err(e) = handle.close().await {
                debug!(
                    target: "rc.actor.manager",
                    rc_id = %rc_id,
                    room_id = %room_id_owned,
                    error = %e,
                    "Room already stopped before close"
                );
            }

            match tokio::time::timeout(ROOM_REMOVAL_TIMEOUT, task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "rc.actor.manager",
                        rc_id = %rc_id,
                        room_id = %room_id_owned,
                        "Room actor task completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "rc.actor.manager",
                        rc_id = %rc_id,
                        room_id = %room_id_owned,
                        error = ?e,
                        "Room actor task panicked during removal"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "rc.actor.manager",
                        rc_id = %rc_id,
                        room_id = %room_id_owned,
                        "Room actor task cleanup timed out"
                    );
                    handle.cancel();
                }
            }
        });

        info!(
            target: "rc.actor.manager",
            rc_id = %self.rc_id,
            room_id = %room_id,
            total_rooms = self.rooms.len(),
            "Room actor removed"
        );

        Ok(())
    }

    fn get_status(&self) -> ManagerStatus {
        ManagerStatus {
            room_count: self.rooms.len(),
            publisher_count: self.metrics.publisher_count(),
            subscriber_count: self.metrics.subscriber_count(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.receiver.len(),
        }
    }

    fn initiate_shutdown(&mut self, deadline: Duration) {
        info!(
            target: "rc.actor.manager",
            rc_id = %self.rc_id,
            room_count = self.rooms.len(),
            deadline_secs = deadline.as_secs(),
            "Initiating graceful shutdown"
        );

        self.accepting_new = false;
        self.drain_deadline = deadline;

        // Propagates to every room through its child token
        self.cancel_token.cancel();
    }

    async fn graceful_shutdown(&mut self) {
        self.accepting_new = false;

        for managed in self.rooms.values() {
            managed.handle.cancel();
        }

        for (room_id, managed) in self.rooms.drain() {
            match tokio::time::timeout(self.drain_deadline, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "rc.actor.manager",
                        rc_id = %self.rc_id,
                        room_id = %room_id,
                        "Room actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "rc.actor.manager",
                        rc_id = %self.rc_id,
                        room_id = %room_id,
                        error = ?e,
                        "Room actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "rc.actor.manager",
                        rc_id = %self.rc_id,
                        room_id = %room_id,
                        "Room actor shutdown timed out"
                    );
                }
            }
            self.metrics.room_removed();
        }

        info!(
            target: "rc.actor.manager",
            rc_id = %self.rc_id,
            "Graceful shutdown complete"
        );
    }

    /// Reap room tasks that finished without being removed.
    async fn check_room_health(&mut self) {
        let finished: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(room_id, _)| room_id.clone())
            .collect();

        for room_id in finished {
            let Some(managed) = self.rooms.remove(&room_id) else {
                continue;
            };

            match managed.task_handle.await {
                Ok(()) => {
                    info!(
                        target: "rc.actor.manager",
                        rc_id = %self.rc_id,
                        room_id = %room_id,
                        "Room actor exited on its own"
                    );
                }
                Err(join_error) if join_error.is_panic() => {
                    error!(
                        target: "rc.actor.manager",
                        rc_id = %self.rc_id,
                        room_id = %room_id,
                        error = ?join_error,
                        "Room actor panicked"
                    );
                    self.metrics.record_panic(ActorType::Room);
                }
                Err(join_error) => {
                    warn!(
                        target: "rc.actor.manager",
                        rc_id = %self.rc_id,
                        room_id = %room_id,
                        error = ?join_error,
                        "Room actor task cancelled"
                    );
                }
            }

            self.metrics.room_removed();
        }
    }
}
