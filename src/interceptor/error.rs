//! Converts handler errors into [`RpcError`]s and logs server-side failures.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use opentelemetry::Context;
use tower::{BoxError, Layer, Service};

use super::RpcRequest;
use crate::apperr::find_app_error;
use crate::codes::StatusCode;
use crate::logging::Logger;
use crate::transport::{Metadata, RpcError};

/// Applies [`handle_error`] to every failed call of the wrapped service.
#[derive(Debug, Clone)]
pub struct ErrorLayer {
    logger: Logger,
}

impl ErrorLayer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for ErrorLayer {
    type Service = ErrorService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorService<S> {
    inner: S,
    logger: Logger,
}

impl<S, T> Service<RpcRequest<T>> for ErrorService<S>
where
    S: Service<RpcRequest<T>>,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = RpcError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(|err| handle_error(&self.logger, &Context::current(), err.into()))
    }

    fn call(&mut self, req: RpcRequest<T>) -> Self::Future {
        let cx = req.context().clone();
        let logger = self.logger.clone();
        let fut = self.inner.call(req);

        Box::pin(async move {
            fut.await
                .map_err(|err| handle_error(&logger, &cx, err.into()))
        })
    }
}

/// Resolves the code of `err`, logs it when it is server-caused and builds
/// the error sent to the client.
///
/// Errors without an [`ApplicationError`](crate::apperr::ApplicationError)
/// in their chain are reported as [`StatusCode::Unknown`]. Client-caused
/// errors are never logged. The application error's attributes, minus the
/// stack trace, become the response metadata.
pub fn handle_error(logger: &Logger, cx: &Context, err: BoxError) -> RpcError {
    let Some(app) = find_app_error(&*err) else {
        logger.error(cx, "Unhandled error occurred", &*err, []);
        return RpcError::from_error(StatusCode::Unknown, err);
    };

    if app.code().is_server_error() {
        logger.error(cx, "Server error occurred", app, []);
    }

    let mut metadata = Metadata::new();
    for attr in app.public_attrs() {
        metadata.set(attr.key.as_str(), attr.value.to_string());
    }

    RpcError::new(app.code(), app.message())
        .with_metadata(metadata)
        .with_source(err)
}
