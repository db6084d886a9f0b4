//! Tower middleware wrapped around every RPC handler.
//!
//! - [`ErrorLayer`] turns handler errors into [`RpcError`](crate::transport::RpcError)s
//!   and logs the server-caused ones.
//! - [`AccessLogLayer`] writes one access line per request.
//! - [`RecoverLayer`] converts handler panics into `internal` errors.
//!
//! [`interceptors`] stacks them in the order used by the server.

mod access_log;
mod error;
mod recover;
mod request;

use tower::ServiceBuilder;
use tower::layer::util::{Identity, Stack};

use crate::logging::Logger;

pub use access_log::{AccessLogLayer, AccessLogService};
pub use error::{ErrorLayer, ErrorService, handle_error};
pub use recover::{PANIC_MESSAGE, PanicError, RecoverLayer, RecoverService};
pub use request::RpcRequest;

/// The production middleware stack, outermost first.
pub type Interceptors =
    ServiceBuilder<Stack<ErrorLayer, Stack<RecoverLayer, Stack<AccessLogLayer, Identity>>>>;

/// A handler wrapped by [`Interceptors`].
pub type Intercepted<S> = AccessLogService<RecoverService<ErrorService<S>>>;

/// Access log, then panic recovery, then error conversion, then the handler.
///
/// Recovery sits inside the access log so a panicking request still gets
/// its access line, with status `internal`.
pub fn interceptors(logger: Logger) -> Interceptors {
    ServiceBuilder::new()
        .layer(AccessLogLayer::new(logger.clone()))
        .layer(RecoverLayer::new(logger.clone()))
        .layer(ErrorLayer::new(logger))
}
