//! Room Controller configuration.
//!
//! Configuration is loaded from environment variables. The RPC gateway token
//! is redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8090";

/// Default per-call timeout applied by the HTTP RPC collaborator.
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 10_000;

/// Default room actor mailbox capacity.
pub const DEFAULT_ROOM_MAILBOX_SIZE: usize = 500;

/// Default number of rooms one instance will host.
pub const DEFAULT_MAX_ROOMS: usize = 1000;

/// Default instance ID prefix.
pub const DEFAULT_RC_ID_PREFIX: &str = "rc";

/// Room Controller configuration.
#[derive(Clone)]
pub struct Config {
    /// Base URL of the RPC gateway fronting the worker agent and workers.
    pub rpc_gateway_url: String,

    /// Optional bearer token for the RPC gateway.
    pub rpc_gateway_token: Option<SecretString>,

    /// Per-call timeout enforced by the RPC collaborator.
    pub rpc_timeout: Duration,

    /// Health endpoint bind address (default: "0.0.0.0:8090").
    pub health_bind_address: String,

    /// Room actor mailbox capacity.
    pub room_mailbox_size: usize,

    /// Maximum rooms hosted by this instance.
    pub max_rooms: usize,

    /// Unique identifier for this instance.
    pub rc_id: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("rpc_gateway_url", &self.rpc_gateway_url)
            .field(
                "rpc_gateway_token",
                &self.rpc_gateway_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("rpc_timeout", &self.rpc_timeout)
            .field("health_bind_address", &self.health_bind_address)
            .field("room_mailbox_size", &self.room_mailbox_size)
            .field("max_rooms", &self.max_rooms)
            .field("rc_id", &self.rc_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Parse an optional positive integer variable.
fn parse_positive<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + From<u8>,
{
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => {
            let value: T = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}")))?;
            if value == T::from(0) {
                return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
            }
            Ok(value)
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let rpc_gateway_url = vars
            .get("RC_RPC_GATEWAY_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("RC_RPC_GATEWAY_URL".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let rpc_gateway_token = vars
            .get("RC_RPC_GATEWAY_TOKEN")
            .filter(|t| !t.is_empty())
            .map(|t| SecretString::from(t.clone()));

        let rpc_timeout = Duration::from_millis(parse_positive(
            vars,
            "RC_RPC_TIMEOUT_MS",
            DEFAULT_RPC_TIMEOUT_MS,
        )?);

        let health_bind_address = vars
            .get("RC_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let room_mailbox_size =
            parse_positive(vars, "RC_ROOM_MAILBOX_SIZE", DEFAULT_ROOM_MAILBOX_SIZE)?;

        let max_rooms = parse_positive(vars, "RC_MAX_ROOMS", DEFAULT_MAX_ROOMS)?;

        let rc_id = vars.get("RC_ID").cloned().unwrap_or_else(|| {
            let hostname = env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_RC_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            rpc_gateway_url,
            rpc_gateway_token,
            rpc_timeout,
            health_bind_address,
            room_mailbox_size,
            max_rooms,
            rc_id,
        })
    }
}
