//! Observability for the Room Controller.
//!
//! All instrumentation uses `#[instrument(skip_all)]` with explicit fields.
//! Metric labels are bounded (see [`metrics`]).
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `rc_rooms_active` | Gauge | none | Rooms hosted on this instance |
//! | `rc_publishers_active` | Gauge | none | Present publishers across rooms |
//! | `rc_subscribers_active` | Gauge | none | Subscriber attachments across rooms |
//! | `rc_rpc_calls_total` | Counter | `method` | RPC calls handed to the collaborator |
//! | `rc_commands_rejected_total` | Counter | `operation`, `reason` | Guard rejections |
//! | `rc_worker_creation_seconds` | Histogram | none | `createErizoJS` acknowledgement latency |
//! | `rc_worker_creation_failures_total` | Counter | none | Failed worker creations |
//! | `rc_actor_mailbox_depth` | Gauge | `actor_type` | Backpressure indicator |
//! | `rc_actor_panics_total` | Counter | `actor_type` | Actor task panics |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
