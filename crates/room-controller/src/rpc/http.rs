//! HTTP RPC gateway client.
//!
//! Posts each call as JSON to `{gateway}/rpc/{target}`:
//!
//! ```text
//! POST /rpc/ErizoJS_pub1
//! {"method": "addPublisher", "args": ["pub1", "v=0..."], "expects_ready": true}
//!
//! 200 {"result": ..., "ready": ...}      -> completion Ok(result), ready Ok(ready)
//! 200 {"error": "..."}                   -> RpcError::Remote
//! non-2xx / connect failure              -> RpcError::Transport
//! request timeout                        -> RpcError::Timeout
//! ```
//!
//! # Ordering
//!
//! Every target gets its own lane: a task draining an unbounded channel one
//! call at a time. Calls for one worker therefore reach the gateway in the
//! order they were issued while different workers proceed concurrently.
//! `release` queues a retire marker behind the pending calls. When the lane
//! reaches it with nothing queued after it, the lane unregisters itself and
//! exits; calls issued after `release` keep the lane open, so a reused target
//! never has two lanes posting at once.

use super::address::EndpointRef;
use super::client::{RpcCallbacks, RpcClient, RpcMethod};
use crate::config::Config;
use crate::errors::{RcError, RpcError};
use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Connect timeout for the gateway.
const GATEWAY_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

struct OutboundCall {
    method: RpcMethod,
    args: Vec<Value>,
    callbacks: RpcCallbacks,
}

enum LaneItem {
    Call(OutboundCall),
    Retire,
}

type Lanes = HashMap<EndpointRef, mpsc::UnboundedSender<LaneItem>>;
type LaneMap = Mutex<Lanes>;

fn locked(lanes: &LaneMap) -> MutexGuard<'_, Lanes> {
    lanes.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Serialize)]
struct RpcRequestBody<'a> {
    method: &'static str,
    args: &'a [Value],
    expects_ready: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RpcResponseBody {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ready: Option<Value>,
}

/// Everything a lane needs to reach the gateway.
#[derive(Clone)]
struct GatewayTarget {
    http: reqwest::Client,
    url: String,
    token: Option<SecretString>,
}

/// RPC client backed by an HTTP gateway.
pub struct HttpRpcClient {
    http: reqwest::Client,
    gateway_url: String,
    token: Option<SecretString>,
    lanes: Arc<LaneMap>,
}

impl HttpRpcClient {
    /// Create a client for `gateway_url`.
    ///
    /// # Errors
    ///
    /// Returns `RcError::Config` if the HTTP client cannot be built.
    pub fn new(
        gateway_url: impl Into<String>,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, RcError> {
        let http = reqwest::Client::builder()
            .connect_timeout(GATEWAY_CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                error!(target: "rc.rpc.http", error = %e, "Failed to build RPC gateway client");
                RcError::Config(format!("Failed to build RPC gateway client: {e}"))
            })?;

        Ok(Self {
            http,
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
            token,
            lanes: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Create a client from service configuration.
    ///
    /// # Errors
    ///
    /// Returns `RcError::Config` if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, RcError> {
        Self::new(
            config.rpc_gateway_url.clone(),
            config.rpc_gateway_token.clone(),
            config.rpc_timeout,
        )
    }

    /// Number of targets with an open lane, including released lanes that
    /// are still draining.
    #[must_use]
    pub fn active_lanes(&self) -> usize {
        locked(&self.lanes).len()
    }

    /// Queue a call on the lane for `target`, opening the lane if needed.
    ///
    /// Hands the call back if no runtime is available to drive a lane.
    fn enqueue(&self, target: &EndpointRef, call: OutboundCall) -> Result<(), OutboundCall> {
        let mut lanes = locked(&self.lanes);

        let call = match lanes.get(target) {
            Some(lane) => match lane.send(LaneItem::Call(call)) {
                Ok(()) => return Ok(()),
                // Lane task is gone; reopen below.
                Err(mpsc::error::SendError(LaneItem::Call(call))) => call,
                Err(mpsc::error::SendError(LaneItem::Retire)) => return Ok(()),
            },
            None => call,
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return Err(call);
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        let gateway = GatewayTarget {
            http: self.http.clone(),
            url: format!("{}/rpc/{}", self.gateway_url, target),
            token: self.token.clone(),
        };
        runtime.spawn(run_lane(
            target.clone(),
            gateway,
            receiver,
            Arc::downgrade(&self.lanes),
        ));

        let queued = sender
            .send(LaneItem::Call(call))
            .map_err(|mpsc::error::SendError(item)| item);
        lanes.insert(target.clone(), sender);
        match queued {
            Ok(()) => Ok(()),
            Err(LaneItem::Call(call)) => Err(call),
            Err(LaneItem::Retire) => Ok(()),
        }
    }
}

impl RpcClient for HttpRpcClient {
    fn call(
        &self,
        target: &EndpointRef,
        method: RpcMethod,
        args: Vec<Value>,
        callbacks: RpcCallbacks,
    ) {
        let call = OutboundCall {
            method,
            args,
            callbacks,
        };
        if let Err(call) = self.enqueue(target, call) {
            warn!(
                target: "rc.rpc.http",
                endpoint = %target,
                method = %call.method,
                "No runtime available to dispatch RPC call"
            );
            call.callbacks.fail(RpcError::Unavailable);
        }
    }

    fn release(&self, target: &EndpointRef) {
        let mut lanes = locked(&self.lanes);
        if let Some(lane) = lanes.get(target) {
            if lane.send(LaneItem::Retire).is_err() {
                lanes.remove(target);
            }
            debug!(target: "rc.rpc.http", endpoint = %target, "Released RPC lane");
        }
    }
}

/// Drain one target's calls in order.
async fn run_lane(
    target: EndpointRef,
    gateway: GatewayTarget,
    mut receiver: mpsc::UnboundedReceiver<LaneItem>,
    lanes: Weak<LaneMap>,
) {
    while let Some(item) = receiver.recv().await {
        let call = match item {
            LaneItem::Call(call) => call,
            LaneItem::Retire => {
                // Client dropped: every sender is gone with the map.
                let Some(lanes) = lanes.upgrade() else {
                    continue;
                };
                // Senders only send while holding the map lock, so an empty
                // channel here stays empty once the entry is removed.
                let mut map = locked(&lanes);
                if receiver.is_empty() {
                    map.remove(&target);
                    break;
                }
                continue;
            }
        };
        let OutboundCall {
            method,
            args,
            mut callbacks,
        } = call;

        match post_call(&gateway, method, &args, callbacks.has_ready()).await {
            Ok(body) => {
                if let Some(remote_error) = body.error {
                    debug!(
                        target: "rc.rpc.http",
                        endpoint = %target,
                        method = %method,
                        error = %remote_error,
                        "Remote side rejected RPC call"
                    );
                    callbacks.fail(RpcError::Remote(remote_error));
                    continue;
                }
                callbacks.complete(Ok(body.result.unwrap_or(Value::Null)));
                if let Some(ready) = body.ready {
                    callbacks.ready(Ok(ready));
                }
            }
            Err(e) => {
                warn!(
                    target: "rc.rpc.http",
                    endpoint = %target,
                    method = %method,
                    error = %e,
                    "RPC call failed"
                );
                callbacks.fail(e);
            }
        }
    }

    debug!(target: "rc.rpc.http", endpoint = %target, "RPC lane closed");
}

async fn post_call(
    gateway: &GatewayTarget,
    method: RpcMethod,
    args: &[Value],
    expects_ready: bool,
) -> Result<RpcResponseBody, RpcError> {
    let mut request = gateway.http.post(&gateway.url).json(&RpcRequestBody {
        method: method.as_str(),
        args,
        expects_ready,
    });
    if let Some(token) = &gateway.token {
        request = request.bearer_auth(token.expose_secret());
    }

    let response = request.send().await.map_err(classify)?;

    let status = response.status();
    if !status.is_success() {
        return Err(RpcError::Transport(format!("gateway returned {status}")));
    }

    let body = response.bytes().await.map_err(classify)?;
    if body.is_empty() {
        return Ok(RpcResponseBody::default());
    }
    serde_json::from_slice(&body)
        .map_err(|e| RpcError::Transport(format!("invalid gateway response: {e}")))
}

fn classify(e: reqwest::Error) -> RpcError {
    if e.is_timeout() {
        RpcError::Timeout
    } else {
        RpcError::Transport(e.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::rpc::client::completion_channel;
    use crate::rpc::{agent_address, worker_address};
    use common::types::PublisherId;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, token: Option<&str>) -> HttpRpcClient {
        HttpRpcClient::new(
            server.uri(),
            token.map(|t| SecretString::from(t.to_string())),
            Duration::from_millis(500),
        )
        .expect("client should build")
    }

    #[tokio::test]
    async fn test_call_posts_method_and_args_to_target() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/ErizoAgent"))
            .and(body_json(json!({
                "method": "createErizoJS",
                "args": ["pub1"],
                "expects_ready": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "erizo-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let rpc = client(&server, None);
        let (completion, rx) = completion_channel();
        rpc.call(
            &agent_address(),
            RpcMethod::CreateWorker,
            vec![json!("pub1")],
            RpcCallbacks::completion_only(Some(completion)),
        );

        assert_eq!(rx.await.unwrap(), Ok(json!("erizo-1")));
        assert_eq!(rpc.active_lanes(), 1);
    }

    #[tokio::test]
    async fn test_ready_signal_is_delivered_separately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/ErizoJS_pub1"))
            .and(header("authorization", "Bearer gw-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": "answer-sdp", "ready": "stream-ready"})),
            )
            .mount(&server)
            .await;

        let rpc = client(&server, Some("gw-token"));
        let (completion, completion_rx) = completion_channel();
        let (ready, ready_rx) = completion_channel();
        rpc.call(
            &worker_address(&PublisherId::from("pub1")),
            RpcMethod::AddPublisher,
            vec![json!("pub1"), json!("OFFER")],
            RpcCallbacks::with_ready(Some(completion), Some(ready)),
        );

        assert_eq!(completion_rx.await.unwrap(), Ok(json!("answer-sdp")));
        assert_eq!(ready_rx.await.unwrap(), Ok(json!("stream-ready")));
    }

    #[tokio::test]
    async fn test_remote_error_reaches_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "no worker"})))
            .mount(&server)
            .await;

        let rpc = client(&server, None);
        let (completion, rx) = completion_channel();
        rpc.call(
            &worker_address(&PublisherId::from("pub1")),
            RpcMethod::AddExternalInput,
            vec![json!("pub1"), json!("rtsp://cam")],
            RpcCallbacks::completion_only(Some(completion)),
        );

        assert_eq!(
            rx.await.unwrap(),
            Err(RpcError::Remote("no worker".to_string()))
        );
    }

    #[tokio::test]
    async fn test_gateway_status_error_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let rpc = client(&server, None);
        let (completion, rx) = completion_channel();
        rpc.call(
            &agent_address(),
            RpcMethod::CreateWorker,
            vec![json!("pub1")],
            RpcCallbacks::completion_only(Some(completion)),
        );

        assert!(matches!(rx.await.unwrap(), Err(RpcError::Transport(_))));
    }

    #[tokio::test]
    async fn test_slow_gateway_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": null}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let rpc = client(&server, None);
        let (completion, rx) = completion_channel();
        rpc.call(
            &agent_address(),
            RpcMethod::CreateWorker,
            vec![json!("pub1")],
            RpcCallbacks::completion_only(Some(completion)),
        );

        assert_eq!(rx.await.unwrap(), Err(RpcError::Timeout));
    }

    #[tokio::test]
    async fn test_calls_to_one_target_keep_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/ErizoJS_pub1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": null})))
            .mount(&server)
            .await;

        let rpc = client(&server, None);
        let target = worker_address(&PublisherId::from("pub1"));
        let mut receivers = Vec::new();
        for subscriber in ["subA", "subB", "subC"] {
            let (completion, rx) = completion_channel();
            rpc.call(
                &target,
                RpcMethod::RemoveSubscriber,
                vec![json!(subscriber), json!("pub1")],
                RpcCallbacks::completion_only(Some(completion)),
            );
            receivers.push(rx);
        }
        for rx in receivers {
            assert!(rx.await.unwrap().is_ok());
        }

        let requests = server.received_requests().await.unwrap();
        let order: Vec<Value> = requests
            .iter()
            .map(|r| {
                let body: Value = serde_json::from_slice(&r.body).unwrap();
                body.get("args").and_then(|a| a.get(0)).cloned().unwrap()
            })
            .collect();
        assert_eq!(order, vec![json!("subA"), json!("subB"), json!("subC")]);
    }

    async fn wait_for_lanes(rpc: &HttpRpcClient, expected: usize) {
        for _ in 0..100 {
            if rpc.active_lanes() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {expected} open lanes, found {}", rpc.active_lanes());
    }

    fn received_calls(requests: &[wiremock::Request]) -> Vec<String> {
        requests
            .iter()
            .map(|r| {
                let body: Value = serde_json::from_slice(&r.body).unwrap();
                format!("{} {}", body["method"].as_str().unwrap(), body["args"])
            })
            .collect()
    }

    #[tokio::test]
    async fn test_release_closes_lane_after_draining() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let rpc = client(&server, None);
        let target = worker_address(&PublisherId::from("pub1"));
        let (completion, rx) = completion_channel();
        rpc.call(
            &target,
            RpcMethod::RemovePublisher,
            vec![json!("pub1")],
            RpcCallbacks::completion_only(Some(completion)),
        );
        rpc.release(&target);

        // Calls queued before release still go out.
        assert_eq!(rx.await.unwrap(), Ok(Value::Null));
        wait_for_lanes(&rpc, 0).await;
    }

    #[tokio::test]
    async fn test_reused_target_waits_for_released_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/ErizoJS_pub1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": null}))
                    .set_delay(Duration::from_millis(150)),
            )
            .mount(&server)
            .await;

        let rpc = client(&server, None);
        let target = worker_address(&PublisherId::from("pub1"));
        rpc.call(
            &target,
            RpcMethod::AddExternalInput,
            vec![json!("pub1"), json!("rtsp://a")],
            RpcCallbacks::none(),
        );
        rpc.call(
            &target,
            RpcMethod::RemovePublisher,
            vec![json!("pub1")],
            RpcCallbacks::none(),
        );
        rpc.release(&target);

        let (completion, rx) = completion_channel();
        rpc.call(
            &target,
            RpcMethod::AddExternalInput,
            vec![json!("pub1"), json!("rtsp://b")],
            RpcCallbacks::completion_only(Some(completion)),
        );
        assert_eq!(rx.await.unwrap(), Ok(Value::Null));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(
            received_calls(&requests),
            vec![
                r#"addExternalInput ["pub1","rtsp://a"]"#,
                r#"removePublisher ["pub1"]"#,
                r#"addExternalInput ["pub1","rtsp://b"]"#,
            ]
        );
        // The lane stays open for the re-admitted publisher.
        assert_eq!(rpc.active_lanes(), 1);
    }

    #[tokio::test]
    async fn test_release_of_unknown_target_is_noop() {
        let server = MockServer::start().await;
        let rpc = client(&server, None);

        rpc.release(&worker_address(&PublisherId::from("ghost")));
        assert_eq!(rpc.active_lanes(), 0);
    }
}
