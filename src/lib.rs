//! # RPC Scaffold
//!
//! Error handling and observability core for unary RPC backends built on
//! Axum and Tower.
//!
//! ## Architecture
//!
//! - **Codes** ([`codes`]) - The sixteen RPC status codes and their client/server classification
//! - **Application errors** ([`apperr`]) - Typed errors with cause flattening, attributes and stack capture
//! - **Logging** ([`logging`]) - Structured, trace-aware JSON/text logger
//! - **Interceptors** ([`interceptor`]) - Tower layers for error conversion, access logs and panic recovery
//! - **Transport** ([`transport`]) - The error shape sent to clients
//! - **Server** ([`server`]) - Procedure router, health check and server lifecycle
//!
//! ## Error flow
//!
//! Lower layers return [`ApplicationError`]s and re-wrap them with
//! [`ResultExt::wrap_err`] as they propagate. The error interceptor logs
//! server-caused failures once, with the first stack trace, and hands the
//! client a [`transport::RpcError`] whose metadata carries the error's
//! attributes. Client-caused failures are returned without a log entry.
//!
//! ```
//! use rpc_scaffold::prelude::*;
//!
//! fn find_user(id: u64) -> Result<String, ApplicationError> {
//!     Err(ApplicationError::new(
//!         StatusCode::NotFound,
//!         "user not found",
//!         vec![Attr::uint("user_id", id)],
//!     ))
//! }
//!
//! let err = find_user(7)
//!     .wrap_err(StatusCode::Internal, "failed to load profile", vec![])
//!     .unwrap_err();
//!
//! assert_eq!(err.code(), StatusCode::Internal);
//! assert_eq!(
//!     err.message(),
//!     "failed to load profile (internal): user not found (not_found)"
//! );
//! assert!(err.is(&ApplicationError::sentinel(StatusCode::Internal)));
//! ```
//!
//! ## Configuration
//!
//! The binary reads its settings from environment variables via
//! [`config::Config`]. See the [`config`] module for available options.

pub mod apperr;
pub mod codes;
pub mod config;
pub mod interceptor;
pub mod logging;
pub mod server;
pub mod transport;

pub use apperr::{ApplicationError, ResultExt};
pub use codes::StatusCode;

/// Commonly used types for external consumers.
///
/// Re-exports frequently used types to simplify imports for library users
/// and integration tests.
pub mod prelude {
    pub use crate::apperr::{ApplicationError, ResultExt};
    pub use crate::codes::{Classification, StatusCode, classify};
    pub use crate::interceptor::{RpcRequest, interceptors};
    pub use crate::logging::{Attr, Format, Logger};
    pub use crate::server::RpcRouter;
    pub use crate::transport::RpcError;
}
