//! Turns panics in a handler into `internal` errors.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use futures::FutureExt;
use opentelemetry::Context;
use thiserror::Error;
use tower::{Layer, Service};

use super::RpcRequest;
use crate::codes::StatusCode;
use crate::logging::{Attr, Logger, keys};
use crate::transport::RpcError;

/// Message sent to clients in place of the panic payload.
pub const PANIC_MESSAGE: &str = "internal server error";

/// Error logged for a recovered panic; carries the payload text.
#[derive(Debug, Error)]
#[error("panic: {0}")]
pub struct PanicError(pub String);

impl PanicError {
    fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let text = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self(text)
    }
}

#[derive(Debug, Clone)]
pub struct RecoverLayer {
    logger: Logger,
}

impl RecoverLayer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for RecoverLayer {
    type Service = RecoverService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoverService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

/// Catches panics raised by the inner service, both while building its
/// future and while polling it.
#[derive(Debug, Clone)]
pub struct RecoverService<S> {
    inner: S,
    logger: Logger,
}

impl<S, T> Service<RpcRequest<T>> for RecoverService<S>
where
    S: Service<RpcRequest<T>>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: From<RpcError> + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: RpcRequest<T>) -> Self::Future {
        let procedure = req.procedure().to_string();
        let cx = req.context().clone();
        let logger = self.logger.clone();

        let fut = match panic::catch_unwind(AssertUnwindSafe(|| self.inner.call(req))) {
            Ok(fut) => fut,
            Err(payload) => {
                let err = recovered(&logger, &cx, &procedure, &*payload);
                return Box::pin(async move { Err::<S::Response, S::Error>(err.into()) });
            }
        };

        Box::pin(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(recovered(&logger, &cx, &procedure, &*payload).into()),
            }
        })
    }
}

fn recovered(
    logger: &Logger,
    cx: &Context,
    procedure: &str,
    payload: &(dyn Any + Send),
) -> RpcError {
    let panic = PanicError::from_payload(payload);
    logger.error(
        cx,
        "Panic recovered in RPC handler",
        &panic,
        [Attr::string(keys::PROCEDURE, procedure)],
    );
    RpcError::new(StatusCode::Internal, PANIC_MESSAGE).with_source(panic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Format, MemoryWriter};
    use std::future;
    use tower::ServiceExt;

    fn capture() -> (Logger, MemoryWriter) {
        let sink = MemoryWriter::new();
        let logger = Logger::builder()
            .format(Format::Json)
            .writer(sink.clone())
            .without_time()
            .build();
        (logger, sink)
    }

    #[derive(Clone)]
    struct PanicsInCall;

    impl Service<RpcRequest<()>> for PanicsInCall {
        type Response = ();
        type Error = RpcError;
        type Future = future::Ready<Result<(), RpcError>>;

        fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), RpcError>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: RpcRequest<()>) -> Self::Future {
            panic!("called with bad state");
        }
    }

    #[tokio::test]
    async fn test_panic_while_polling() {
        let (logger, sink) = capture();
        let handler = tower::service_fn(|req: RpcRequest<u32>| async move {
            if *req.message() == 0 {
                panic!("db password is hunter2");
            }
            Ok::<_, RpcError>(*req.message())
        });

        let err = RecoverLayer::new(logger)
            .layer(handler)
            .oneshot(RpcRequest::new("/test.v1.Test/Boom", 0))
            .await
            .unwrap_err();

        assert_eq!(err.code(), StatusCode::Internal);
        assert_eq!(err.message(), PANIC_MESSAGE);

        let lines = sink.json_lines().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["level"], "ERROR");
        assert_eq!(lines[0]["msg"], "Panic recovered in RPC handler");
        assert_eq!(lines[0]["error"], "panic: db password is hunter2");
        assert_eq!(lines[0]["procedure"], "/test.v1.Test/Boom");
    }

    #[tokio::test]
    async fn test_panic_in_call() {
        let (logger, sink) = capture();

        let err = RecoverLayer::new(logger)
            .layer(PanicsInCall)
            .oneshot(RpcRequest::new("/test.v1.Test/Call", ()))
            .await
            .unwrap_err();

        assert_eq!(err.code(), StatusCode::Internal);
        assert_eq!(
            sink.json_lines().unwrap()[0]["error"],
            "panic: called with bad state"
        );
    }

    #[tokio::test]
    async fn test_no_panic_passes_through() {
        let (logger, sink) = capture();
        let handler =
            tower::service_fn(|req: RpcRequest<u32>| async move { Ok::<_, RpcError>(*req.message()) });

        let res = RecoverLayer::new(logger)
            .layer(handler)
            .oneshot(RpcRequest::new("/test.v1.Test/Echo", 7))
            .await
            .unwrap();

        assert_eq!(res, 7);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_payload_text() {
        let formatted: Box<dyn Any + Send> = Box::new(format!("index {}", 3));
        let opaque: Box<dyn Any + Send> = Box::new(42_u8);

        assert_eq!(PanicError::from_payload(&*formatted).0, "index 3");
        assert_eq!(
            PanicError::from_payload(&*opaque).0,
            "non-string panic payload"
        );
    }
}
