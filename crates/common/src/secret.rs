//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types. Use `SecretString` for credentials such as
//! the RPC gateway bearer token so that `Debug` output and tracing fields only
//! ever show a redacted placeholder.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct GatewayCredentials {
//!     gateway_url: String,
//!     token: SecretString,
//! }
//!
//! let creds = GatewayCredentials {
//!     gateway_url: "http://rpc-gateway:7000".to_string(),
//!     token: SecretString::from("s3cr3t"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("s3cr3t"));
//! assert_eq!(creds.token.expose_secret(), "s3cr3t");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
