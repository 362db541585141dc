//! `RoomActor` - per-room actor that owns membership state.
//!
//! Each `RoomActor`:
//! - Owns the publisher registry, subscriber lists and external outputs of one room
//! - Validates every lifecycle operation against that state before issuing RPCs
//! - Shares the instance-wide RPC client with every other room
//!
//! # Worker creation
//!
//! `addPublisher` is the only operation gated on an acknowledgement. The
//! publisher is marked pending and `createErizoJS` is sent to the agent; a
//! watcher task waits for the ack and posts `WorkerCreated` back to the
//! mailbox, where the actor issues `addPublisher` to the new worker and
//! admits the publisher. Other messages keep flowing while the ack is
//! outstanding.
//!
//! # Rejections
//!
//! A failed guard returns a typed `RcError` to the handle caller, issues no
//! RPC and changes nothing. The caller's completion and ready markers are
//! dropped unsent.

use crate::errors::{RcError, RpcError};
use crate::observability::metrics as prom;
use crate::rpc::{
    agent_address, completion_channel, worker_address, Completion, EndpointRef, RpcCallbacks,
    RpcClient, RpcMethod, RpcReply,
};

use super::membership::{ExternalOutput, PublisherSource, RoomMembership};
use super::messages::{
    MutationMode, RoomMessage, RoomOperation, RoomSnapshot, SessionDescription, SubscribeRequest,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::types::{PublisherId, RoomId, SubscriberId};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the room mailbox.
pub const ROOM_CHANNEL_BUFFER: usize = 500;

/// Handle to a `RoomActor`.
#[derive(Debug, Clone)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: RoomId,
}

impl RoomActorHandle {
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomMessage,
    ) -> Result<T, RcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))
    }

    /// Admit an external input as a publisher.
    ///
    /// The publisher is present as soon as this returns `Ok`; `completion`
    /// receives the worker's reply to `addExternalInput`.
    pub async fn add_external_input(
        &self,
        publisher_id: PublisherId,
        url: impl Into<String>,
        completion: Option<Completion>,
    ) -> Result<(), RcError> {
        let url = url.into();
        self.request(|respond_to| RoomMessage::AddExternalInput {
            publisher_id,
            url,
            completion,
            respond_to,
        })
        .await?
    }

    /// Start an external output of a present publisher (fire-and-forget).
    pub async fn add_external_output(
        &self,
        publisher_id: PublisherId,
        url: impl Into<String>,
    ) -> Result<ExternalOutput, RcError> {
        let url = url.into();
        self.request(|respond_to| RoomMessage::AddExternalOutput {
            publisher_id,
            url,
            respond_to,
        })
        .await?
    }

    /// Stop an external output (fire-and-forget).
    pub async fn remove_external_output(
        &self,
        publisher_id: PublisherId,
        url: impl Into<String>,
    ) -> Result<(), RcError> {
        let url = url.into();
        self.request(|respond_to| RoomMessage::RemoveExternalOutput {
            publisher_id,
            url,
            respond_to,
        })
        .await?
    }

    /// Request a worker for `publisher_id` and publish on it once created.
    ///
    /// `Ok` means worker creation was requested and the publisher is pending.
    /// `completion` and `on_ready` are forwarded to `addPublisher`; if worker
    /// creation fails, both receive that error instead.
    pub async fn add_publisher(
        &self,
        publisher_id: PublisherId,
        sdp: SessionDescription,
        completion: Option<Completion>,
        on_ready: Option<Completion>,
    ) -> Result<(), RcError> {
        self.request(|respond_to| RoomMessage::AddPublisher {
            publisher_id,
            sdp,
            completion,
            on_ready,
            respond_to,
        })
        .await?
    }

    /// Attach a subscriber to a present publisher.
    pub async fn add_subscriber(
        &self,
        request: SubscribeRequest,
        completion: Option<Completion>,
        on_ready: Option<Completion>,
    ) -> Result<(), RcError> {
        self.request(|respond_to| RoomMessage::AddSubscriber {
            request,
            completion,
            on_ready,
            respond_to,
        })
        .await?
    }

    /// Remove a publisher together with its subscriber list.
    pub async fn remove_publisher(&self, publisher_id: PublisherId) -> Result<(), RcError> {
        self.request(|respond_to| RoomMessage::RemovePublisher {
            publisher_id,
            respond_to,
        })
        .await?
    }

    pub async fn remove_subscriber(
        &self,
        subscriber_id: SubscriberId,
        publisher_id: PublisherId,
    ) -> Result<(), RcError> {
        self.request(|respond_to| RoomMessage::RemoveSubscriber {
            subscriber_id,
            publisher_id,
            respond_to,
        })
        .await?
    }

    /// Detach `subscriber_id` from every publisher, one `removeSubscriber`
    /// per publisher. Returns the publishers it was detached from.
    pub async fn remove_subscriptions(
        &self,
        subscriber_id: SubscriberId,
    ) -> Result<Vec<PublisherId>, RcError> {
        self.request(|respond_to| RoomMessage::RemoveSubscriptions {
            subscriber_id,
            respond_to,
        })
        .await
    }

    pub async fn get_state(&self) -> Result<RoomSnapshot, RcError> {
        self.request(|respond_to| RoomMessage::GetState { respond_to })
            .await
    }

    /// Remove every publisher from its worker and stop the actor.
    pub async fn close(&self) -> Result<(), RcError> {
        self.request(|respond_to| RoomMessage::Close { respond_to })
            .await
    }

    /// Cancel the actor. Present publishers are removed from their workers
    /// on the way out.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    room_id: RoomId,
    receiver: mpsc::Receiver<RoomMessage>,
    /// Lets ack watchers post back without keeping the mailbox open.
    self_sender: mpsc::WeakSender<RoomMessage>,
    cancel_token: CancellationToken,
    rpc: Arc<dyn RpcClient>,
    membership: RoomMembership,
    /// Counts last reported to the shared metrics.
    reported: (usize, usize),
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomActor {
    /// Spawn a room actor and return its handle and task handle.
    pub fn spawn(
        room_id: RoomId,
        mailbox_size: usize,
        cancel_token: CancellationToken,
        rpc: Arc<dyn RpcClient>,
        metrics: Arc<ActorMetrics>,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(mailbox_size.max(1));

        let actor = Self {
            room_id: room_id.clone(),
            receiver,
            self_sender: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            rpc,
            membership: RoomMembership::new(),
            reported: (0, 0),
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Room, room_id.as_str()),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "rc.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            "RoomActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "rc.actor.room",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
                    self.teardown();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(RoomMessage::Close { respond_to }) => {
                            self.mailbox.record_received(self.receiver.len());
                            self.teardown();
                            let _ = respond_to.send(());
                            break;
                        }
                        Some(message) => {
                            self.mailbox.record_received(self.receiver.len());
                            self.handle_message(message);
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "rc.actor.room",
                                room_id = %self.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            self.teardown();
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            messages_processed = self.mailbox.messages_processed(),
            "RoomActor stopped"
        );
    }

    fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::AddExternalInput {
                publisher_id,
                url,
                completion,
                respond_to,
            } => {
                let result = self.add_external_input(publisher_id, url, completion);
                self.reply(RoomOperation::AddExternalInput, respond_to, result);
            }

            RoomMessage::AddExternalOutput {
                publisher_id,
                url,
                respond_to,
            } => {
                let result = self.add_external_output(publisher_id, url);
                self.reply(RoomOperation::AddExternalOutput, respond_to, result);
            }

            RoomMessage::RemoveExternalOutput {
                publisher_id,
                url,
                respond_to,
            } => {
                let result = self.remove_external_output(&publisher_id, &url);
                self.reply(RoomOperation::RemoveExternalOutput, respond_to, result);
            }

            RoomMessage::AddPublisher {
                publisher_id,
                sdp,
                completion,
                on_ready,
                respond_to,
            } => {
                let callbacks = RpcCallbacks::with_ready(completion, on_ready);
                let result = self.add_publisher(publisher_id, sdp, callbacks);
                self.reply(RoomOperation::AddPublisher, respond_to, result);
            }

            RoomMessage::AddSubscriber {
                request,
                completion,
                on_ready,
                respond_to,
            } => {
                let callbacks = RpcCallbacks::with_ready(completion, on_ready);
                let result = self.add_subscriber(request, callbacks);
                self.reply(RoomOperation::AddSubscriber, respond_to, result);
            }

            RoomMessage::RemovePublisher {
                publisher_id,
                respond_to,
            } => {
                let result = self.remove_publisher(&publisher_id);
                self.reply(RoomOperation::RemovePublisher, respond_to, result);
            }

            RoomMessage::RemoveSubscriber {
                subscriber_id,
                publisher_id,
                respond_to,
            } => {
                let result = self.remove_subscriber(subscriber_id, publisher_id);
                self.reply(RoomOperation::RemoveSubscriber, respond_to, result);
            }

            RoomMessage::RemoveSubscriptions {
                subscriber_id,
                respond_to,
            } => {
                let detached = self.remove_subscriptions(&subscriber_id);
                let _ = respond_to.send(detached);
            }

            RoomMessage::WorkerCreated {
                publisher_id,
                sdp,
                reply,
                callbacks,
                requested_at,
            } => {
                self.on_worker_created(publisher_id, sdp, reply, callbacks, requested_at);
            }

            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }

            // Handled in the run loop; it ends the actor.
            RoomMessage::Close { respond_to } => {
                let _ = respond_to.send(());
            }
        }

        self.report_membership();
    }

    fn reply<T>(
        &self,
        operation: RoomOperation,
        respond_to: oneshot::Sender<Result<T, RcError>>,
        result: Result<T, RcError>,
    ) {
        match &result {
            Ok(_) => {
                let state = match operation.mutation_mode() {
                    MutationMode::GatedOnAck => "awaiting_ack",
                    MutationMode::Eager => "applied",
                };
                debug!(
                    target: "rc.actor.room",
                    room_id = %self.room_id,
                    operation = operation.as_str(),
                    state,
                    "Room operation accepted"
                );
            }
            Err(e) => {
                let reason = e.rejection_reason().unwrap_or("internal");
                prom::record_command_rejected(operation.as_str(), reason);
                info!(
                    target: "rc.actor.room",
                    room_id = %self.room_id,
                    operation = operation.as_str(),
                    reason,
                    error = %e,
                    "Room operation rejected"
                );
            }
        }
        let _ = respond_to.send(result);
    }

    /// Hand one call to the RPC collaborator.
    fn dispatch(
        &self,
        target: &EndpointRef,
        method: RpcMethod,
        args: Vec<Value>,
        callbacks: RpcCallbacks,
    ) {
        prom::record_rpc_call(method.as_str());
        debug!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            endpoint = %target,
            method = %method,
            has_completion = callbacks.has_completion(),
            has_ready = callbacks.has_ready(),
            "Dispatching RPC"
        );
        self.rpc.call(target, method, args, callbacks);
    }

    fn add_external_input(
        &mut self,
        publisher_id: PublisherId,
        url: String,
        completion: Option<Completion>,
    ) -> Result<(), RcError> {
        self.membership.check_absent(&publisher_id)?;

        self.dispatch(
            &worker_address(&publisher_id),
            RpcMethod::AddExternalInput,
            vec![json!(publisher_id), json!(url)],
            RpcCallbacks::completion_only(completion),
        );

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            publisher_id = %publisher_id,
            "External input admitted"
        );
        self.membership
            .admit(publisher_id, PublisherSource::ExternalInput { url });
        Ok(())
    }

    fn add_external_output(
        &mut self,
        publisher_id: PublisherId,
        url: String,
    ) -> Result<ExternalOutput, RcError> {
        self.membership.check_output_absent(&publisher_id, &url)?;

        self.dispatch(
            &worker_address(&publisher_id),
            RpcMethod::AddExternalOutput,
            vec![json!(publisher_id), json!(url)],
            RpcCallbacks::none(),
        );

        let output = self.membership.register_output(publisher_id, url);
        debug!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            publisher_id = %output.publisher_id,
            output_id = %output.output_id,
            "External output registered"
        );
        Ok(output)
    }

    fn remove_external_output(
        &mut self,
        publisher_id: &PublisherId,
        url: &str,
    ) -> Result<(), RcError> {
        self.membership.check_output(publisher_id, url)?;

        self.dispatch(
            &worker_address(publisher_id),
            RpcMethod::RemoveExternalOutput,
            vec![json!(publisher_id), json!(url)],
            RpcCallbacks::none(),
        );

        self.membership.remove_output(url);
        Ok(())
    }

    fn add_publisher(
        &mut self,
        publisher_id: PublisherId,
        sdp: SessionDescription,
        callbacks: RpcCallbacks,
    ) -> Result<(), RcError> {
        self.membership.check_absent(&publisher_id)?;

        self.membership.mark_pending(publisher_id.clone());

        let (ack, ack_rx) = completion_channel();
        self.dispatch(
            &agent_address(),
            RpcMethod::CreateWorker,
            vec![json!(publisher_id)],
            RpcCallbacks::completion_only(Some(ack)),
        );

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            publisher_id = %publisher_id,
            "Worker creation requested"
        );

        tokio::spawn(watch_worker_creation(
            self.self_sender.clone(),
            self.cancel_token.clone(),
            publisher_id,
            sdp,
            ack_rx,
            callbacks,
        ));

        Ok(())
    }

    fn on_worker_created(
        &mut self,
        publisher_id: PublisherId,
        sdp: SessionDescription,
        reply: RpcReply,
        callbacks: RpcCallbacks,
        requested_at: Instant,
    ) {
        if !self.membership.clear_pending(&publisher_id) {
            warn!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                publisher_id = %publisher_id,
                "Worker created for a publisher that is no longer pending"
            );
            callbacks.fail(RpcError::Unavailable);
            return;
        }

        match reply {
            Ok(_) => {
                prom::record_worker_creation(requested_at.elapsed());

                self.dispatch(
                    &worker_address(&publisher_id),
                    RpcMethod::AddPublisher,
                    vec![json!(publisher_id), json!(sdp)],
                    callbacks,
                );

                info!(
                    target: "rc.actor.room",
                    room_id = %self.room_id,
                    publisher_id = %publisher_id,
                    "Publisher admitted"
                );
                self.membership.admit(publisher_id, PublisherSource::WebRtc);
            }
            Err(e) => {
                prom::record_worker_creation_failure();
                warn!(
                    target: "rc.actor.room",
                    room_id = %self.room_id,
                    publisher_id = %publisher_id,
                    error = %e,
                    "Worker creation failed"
                );
                callbacks.fail(e);
            }
        }
    }

    fn add_subscriber(
        &mut self,
        request: SubscribeRequest,
        callbacks: RpcCallbacks,
    ) -> Result<(), RcError> {
        self.membership.check_can_subscribe(&request)?;

        let SubscribeRequest {
            subscriber_id,
            publisher_id,
            audio,
            video,
            sdp,
        } = request;

        self.dispatch(
            &worker_address(&publisher_id),
            RpcMethod::AddSubscriber,
            vec![
                json!(subscriber_id),
                json!(publisher_id),
                json!(audio),
                json!(video),
                json!(sdp),
            ],
            callbacks,
        );

        debug!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            publisher_id = %publisher_id,
            subscriber_id = %subscriber_id,
            "Subscriber attached"
        );
        self.membership.attach_subscriber(subscriber_id, &publisher_id);
        Ok(())
    }

    fn remove_publisher(&mut self, publisher_id: &PublisherId) -> Result<(), RcError> {
        self.membership.check_present(publisher_id)?;

        let target = worker_address(publisher_id);
        self.dispatch(
            &target,
            RpcMethod::RemovePublisher,
            vec![json!(publisher_id)],
            RpcCallbacks::none(),
        );
        self.rpc.release(&target);

        if let Some((entry, outputs)) = self.membership.remove_publisher(publisher_id) {
            info!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                publisher_id = %publisher_id,
                subscribers_dropped = entry.subscribers.len(),
                outputs_dropped = outputs.len(),
                "Publisher removed"
            );
        }
        Ok(())
    }

    fn remove_subscriber(
        &mut self,
        subscriber_id: SubscriberId,
        publisher_id: PublisherId,
    ) -> Result<(), RcError> {
        self.membership
            .check_subscribed(&subscriber_id, &publisher_id)?;

        self.dispatch(
            &worker_address(&publisher_id),
            RpcMethod::RemoveSubscriber,
            vec![json!(subscriber_id), json!(publisher_id)],
            RpcCallbacks::none(),
        );

        self.membership
            .detach_subscriber(&subscriber_id, &publisher_id);
        Ok(())
    }

    fn remove_subscriptions(&mut self, subscriber_id: &SubscriberId) -> Vec<PublisherId> {
        let publishers = self.membership.publishers_with_subscriber(subscriber_id);

        for publisher_id in &publishers {
            self.dispatch(
                &worker_address(publisher_id),
                RpcMethod::RemoveSubscriber,
                vec![json!(subscriber_id), json!(publisher_id)],
                RpcCallbacks::none(),
            );
            self.membership.detach_subscriber(subscriber_id, publisher_id);
        }

        debug!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            subscriber_id = %subscriber_id,
            publishers = publishers.len(),
            "Subscriptions removed"
        );
        publishers
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id.clone(),
            publishers: self.membership.publishers_view(),
            pending: self.membership.pending_view(),
            outputs: self.membership.outputs_view(),
            mailbox_depth: self.receiver.len(),
        }
    }

    /// Remove every present publisher from its worker and empty the room.
    fn teardown(&mut self) {
        let publishers = self.membership.clear();
        for publisher_id in &publishers {
            let target = worker_address(publisher_id);
            self.dispatch(
                &target,
                RpcMethod::RemovePublisher,
                vec![json!(publisher_id)],
                RpcCallbacks::none(),
            );
            self.rpc.release(&target);
        }

        if !publishers.is_empty() {
            info!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                publishers_removed = publishers.len(),
                "Room torn down"
            );
        }
        self.report_membership();
    }

    /// Push membership changes since the last report to the shared metrics.
    fn report_membership(&mut self) {
        let current = (
            self.membership.publisher_count(),
            self.membership.subscriber_count(),
        );
        if current == self.reported {
            return;
        }

        let delta = |now: usize, before: usize| -> isize {
            let now = isize::try_from(now).unwrap_or(isize::MAX);
            let before = isize::try_from(before).unwrap_or(isize::MAX);
            now - before
        };
        self.metrics.adjust_membership(
            delta(current.0, self.reported.0),
            delta(current.1, self.reported.1),
        );
        self.reported = current;
    }
}

/// Wait for the worker-creation ack and hand it back to the room.
///
/// If the room is cancelled or gone first, the caller's markers receive
/// `RpcError::Unavailable`.
async fn watch_worker_creation(
    room: mpsc::WeakSender<RoomMessage>,
    cancel_token: CancellationToken,
    publisher_id: PublisherId,
    sdp: SessionDescription,
    ack: oneshot::Receiver<RpcReply>,
    callbacks: RpcCallbacks,
) {
    let requested_at = Instant::now();

    let reply = tokio::select! {
        () = cancel_token.cancelled() => {
            callbacks.fail(RpcError::Unavailable);
            return;
        }
        reply = ack => reply.unwrap_or(Err(RpcError::Unavailable)),
    };

    let Some(sender) = room.upgrade() else {
        callbacks.fail(RpcError::Unavailable);
        return;
    };

    let message = RoomMessage::WorkerCreated {
        publisher_id,
        sdp,
        reply,
        callbacks,
        requested_at,
    };
    if let Err(mpsc::error::SendError(RoomMessage::WorkerCreated { callbacks, .. })) =
        sender.send(message).await
    {
        callbacks.fail(RpcError::Unavailable);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::rpc::{MockRpcClient, RecordedCall};
    use std::time::Duration;

    const OFFER: &str = "{\"type\":\"OFFER\",\"sdp\":\"v=0\"}";

    fn spawn_room(mock: &Arc<MockRpcClient>) -> (RoomActorHandle, JoinHandle<()>) {
        let rpc: Arc<dyn RpcClient> = Arc::clone(mock) as Arc<dyn RpcClient>;
        RoomActor::spawn(
            RoomId::from("room-1"),
            ROOM_CHANNEL_BUFFER,
            CancellationToken::new(),
            rpc,
            ActorMetrics::new(),
        )
    }

    fn pid(id: &str) -> PublisherId {
        PublisherId::from(id)
    }

    fn sid(id: &str) -> SubscriberId {
        SubscriberId::from(id)
    }

    fn subscribe(subscriber: &str, publisher: &str) -> SubscribeRequest {
        SubscribeRequest {
            subscriber_id: sid(subscriber),
            publisher_id: pid(publisher),
            audio: true,
            video: false,
            sdp: SessionDescription::from(OFFER),
        }
    }

    /// Poll room state until `ready` holds, letting ack watchers run.
    async fn state_when(
        handle: &RoomActorHandle,
        ready: impl Fn(&RoomSnapshot) -> bool,
    ) -> RoomSnapshot {
        for _ in 0..50 {
            let state = handle.get_state().await.unwrap();
            if ready(&state) {
                return state;
            }
            tokio::task::yield_now().await;
        }
        handle.get_state().await.unwrap()
    }

    #[tokio::test]
    async fn test_add_publisher_gated_on_worker_ack() {
        let mock = Arc::new(MockRpcClient::manual());
        let (handle, _task) = spawn_room(&mock);

        let (completion, completion_rx) = completion_channel();
        let (ready, ready_rx) = completion_channel();
        handle
            .add_publisher(pid("p1"), SessionDescription::from(OFFER), Some(completion), Some(ready))
            .await
            .unwrap();

        let state = handle.get_state().await.unwrap();
        assert!(state.pending.contains(&pid("p1")));
        assert!(!state.is_present(&pid("p1")));
        assert_eq!(mock.calls_to(RpcMethod::CreateWorker).len(), 1);
        assert!(mock.calls_to(RpcMethod::AddPublisher).is_empty());

        assert!(mock.resolve_next(RpcMethod::CreateWorker, Ok(Value::Null)));
        let state = state_when(&handle, |s| s.is_present(&pid("p1"))).await;
        assert!(state.is_present(&pid("p1")));
        assert!(state.pending.is_empty());

        let add = mock.calls_to(RpcMethod::AddPublisher);
        assert_eq!(
            add,
            vec![RecordedCall {
                target: worker_address(&pid("p1")),
                method: RpcMethod::AddPublisher,
                args: vec![json!("p1"), json!(OFFER)],
                has_completion: true,
                has_ready: true,
            }]
        );

        assert!(mock.resolve_next(RpcMethod::AddPublisher, Ok(json!("answer"))));
        assert_eq!(completion_rx.await.unwrap(), Ok(json!("answer")));
        assert_eq!(ready_rx.await.unwrap(), Ok(json!("answer")));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_add_publisher_while_pending_is_rejected() {
        let mock = Arc::new(MockRpcClient::manual());
        let (handle, _task) = spawn_room(&mock);

        handle
            .add_publisher(pid("p1"), SessionDescription::from(OFFER), None, None)
            .await
            .unwrap();
        let result = handle
            .add_publisher(pid("p1"), SessionDescription::from(OFFER), None, None)
            .await;
        assert_eq!(result, Err(RcError::PublisherPending("p1".to_string())));

        let result = handle.add_external_input(pid("p1"), "rtsp://cam", None).await;
        assert_eq!(result, Err(RcError::PublisherPending("p1".to_string())));
        assert_eq!(mock.call_count(), 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_worker_creation_failure_reaches_caller() {
        let mock = Arc::new(
            MockRpcClient::auto_ack()
                .with_failure(RpcMethod::CreateWorker, RpcError::Remote("no capacity".to_string())),
        );
        let (handle, _task) = spawn_room(&mock);

        let (completion, completion_rx) = completion_channel();
        handle
            .add_publisher(pid("p1"), SessionDescription::from(OFFER), Some(completion), None)
            .await
            .unwrap();

        assert_eq!(
            completion_rx.await.unwrap(),
            Err(RpcError::Remote("no capacity".to_string()))
        );
        let state = handle.get_state().await.unwrap();
        assert!(!state.is_present(&pid("p1")));
        assert!(state.pending.is_empty());
        assert!(mock.calls_to(RpcMethod::AddPublisher).is_empty());

        // The id is free again.
        let retry = handle
            .add_publisher(pid("p1"), SessionDescription::from(OFFER), None, None)
            .await;
        assert!(retry.is_ok());

        handle.cancel();
    }

    #[tokio::test]
    async fn test_cancel_while_pending_fails_markers() {
        let mock = Arc::new(MockRpcClient::manual());
        let (handle, task) = spawn_room(&mock);

        let (completion, completion_rx) = completion_channel();
        handle
            .add_publisher(pid("p1"), SessionDescription::from(OFFER), Some(completion), None)
            .await
            .unwrap();

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completion_rx.await.unwrap(), Err(RpcError::Unavailable));
    }

    #[tokio::test]
    async fn test_rejected_subscriber_drops_markers_unsent() {
        let mock = Arc::new(MockRpcClient::auto_ack());
        let (handle, _task) = spawn_room(&mock);

        let (completion, completion_rx) = completion_channel();
        let result = handle
            .add_subscriber(subscribe("s1", "missing"), Some(completion), None)
            .await;

        assert_eq!(result, Err(RcError::PublisherNotFound("missing".to_string())));
        assert!(completion_rx.await.is_err(), "completion must never fire");
        assert_eq!(mock.call_count(), 0);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_add_subscriber_requires_offer() {
        let mock = Arc::new(MockRpcClient::auto_ack());
        let (handle, _task) = spawn_room(&mock);
        handle.add_external_input(pid("p1"), "rtsp://cam", None).await.unwrap();

        let mut request = subscribe("s1", "p1");
        request.sdp = SessionDescription::from("{\"type\":\"offer\"}");
        let result = handle.add_subscriber(request, None, None).await;

        assert_eq!(result, Err(RcError::NotAnOffer));
        assert!(mock.calls_to(RpcMethod::AddSubscriber).is_empty());
        let state = handle.get_state().await.unwrap();
        assert_eq!(state.subscribers_of(&pid("p1")), Some(&[][..]));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_add_subscriber_args_and_markers() {
        let mock = Arc::new(MockRpcClient::auto_ack());
        let (handle, _task) = spawn_room(&mock);
        handle.add_external_input(pid("p1"), "rtsp://cam", None).await.unwrap();

        let (completion, _completion_rx) = completion_channel();
        let (ready, _ready_rx) = completion_channel();
        handle
            .add_subscriber(subscribe("s1", "p1"), Some(completion), Some(ready))
            .await
            .unwrap();

        let calls = mock.calls_to(RpcMethod::AddSubscriber);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target.as_str(), "ErizoJS_p1");
        assert_eq!(
            calls[0].args,
            vec![json!("s1"), json!("p1"), json!(true), json!(false), json!(OFFER)]
        );
        assert!(calls[0].has_completion);
        assert!(calls[0].has_ready);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_external_input_carries_completion_only() {
        let mock = Arc::new(MockRpcClient::auto_ack());
        let (handle, _task) = spawn_room(&mock);

        let (completion, completion_rx) = completion_channel();
        handle
            .add_external_input(pid("p1"), "rtsp://cam", Some(completion))
            .await
            .unwrap();

        assert_eq!(completion_rx.await.unwrap(), Ok(Value::Null));
        let calls = mock.calls();
        assert_eq!(calls.len(), 1, "no worker creation for external inputs");
        assert_eq!(calls[0].method, RpcMethod::AddExternalInput);
        assert_eq!(calls[0].args, vec![json!("p1"), json!("rtsp://cam")]);
        assert!(!calls[0].has_ready);

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.subscribers_of(&pid("p1")), Some(&[][..]));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_remove_publisher_releases_worker_and_outputs() {
        let mock = Arc::new(MockRpcClient::auto_ack());
        let (handle, _task) = spawn_room(&mock);
        handle.add_external_input(pid("p1"), "rtsp://cam", None).await.unwrap();
        handle.add_subscriber(subscribe("s1", "p1"), None, None).await.unwrap();
        handle.add_external_output(pid("p1"), "rtmp://out").await.unwrap();

        handle.remove_publisher(pid("p1")).await.unwrap();

        let state = handle.get_state().await.unwrap();
        assert!(state.publishers.is_empty());
        assert!(state.outputs.is_empty());
        assert_eq!(mock.calls_to(RpcMethod::RemovePublisher).len(), 1);
        assert!(mock.calls_to(RpcMethod::RemoveSubscriber).is_empty());
        assert_eq!(mock.released(), vec![worker_address(&pid("p1"))]);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_close_removes_every_publisher_and_stops() {
        let mock = Arc::new(MockRpcClient::auto_ack());
        let (handle, task) = spawn_room(&mock);
        handle.add_external_input(pid("p1"), "rtsp://a", None).await.unwrap();
        handle.add_external_input(pid("p2"), "rtsp://b", None).await.unwrap();

        handle.close().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        let removed: Vec<_> = mock
            .calls_to(RpcMethod::RemovePublisher)
            .into_iter()
            .map(|c| c.args)
            .collect();
        assert_eq!(removed, vec![vec![json!("p1")], vec![json!("p2")]]);
        assert!(handle.get_state().await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_reports_queued_backlog() {
        let mock = Arc::new(MockRpcClient::auto_ack());
        let (handle, _task) = spawn_room(&mock);

        // Queue three requests before the actor gets a chance to run.
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = oneshot::channel();
            handle
                .sender
                .try_send(RoomMessage::GetState { respond_to: tx })
                .unwrap();
            receivers.push(rx);
        }

        let mut depths = Vec::new();
        for rx in receivers {
            depths.push(rx.await.unwrap().mailbox_depth);
        }
        assert_eq!(depths, vec![2, 1, 0]);
    }
}
