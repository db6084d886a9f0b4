//! HTTP server hosting unary RPC procedures.
//!
//! Procedures are plain [`tower::Service`]s over [`RpcRequest`]. [`RpcRouter`]
//! mounts each one at `POST /<package>.<Service>/<Method>`, decodes the JSON
//! body, attaches the caller's trace context and runs the call through the
//! [`interceptors`] stack.

pub mod health;
mod propagation;

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    body::Bytes,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::post,
};
use opentelemetry::Context;
use serde::{Serialize, de::DeserializeOwned};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::{BoxError, Service, ServiceExt};

use crate::codes::StatusCode;
use crate::config::Config;
use crate::interceptor::{RpcRequest, interceptors};
use crate::logging::{Attr, Logger};
use crate::transport::RpcError;
use health::{AlwaysServing, HealthProbe, HealthService};

pub use propagation::extract_context;

/// Builds the axum [`Router`] for a set of RPC procedures.
pub struct RpcRouter {
    router: Router,
    logger: Logger,
}

impl RpcRouter {
    pub fn new(logger: Logger) -> Self {
        Self {
            router: Router::new().fallback(unknown_procedure),
            logger,
        }
    }

    /// Mounts `service` at `procedure`, e.g. `/user.v1.UserService/Create`.
    ///
    /// Bodies that do not decode as `Req` are rejected with
    /// `invalid_argument` before the handler runs.
    pub fn procedure<S, Req, Res>(mut self, procedure: &str, service: S) -> Self
    where
        S: Service<RpcRequest<Req>, Response = Res> + Clone + Send + Sync + 'static,
        S::Error: Into<BoxError>,
        S::Future: Send + 'static,
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
    {
        let svc = interceptors(self.logger.clone()).service(service);
        let name = procedure.to_string();

        let handler = move |headers: HeaderMap, body: Bytes| {
            let svc = svc.clone();
            let name = name.clone();
            async move {
                let message = match serde_json::from_slice::<Req>(&body) {
                    Ok(message) => message,
                    Err(err) => {
                        return RpcError::new(
                            StatusCode::InvalidArgument,
                            format!("invalid request body: {err}"),
                        )
                        .into_response();
                    }
                };
                let cx = extract_context(&headers);
                let req = RpcRequest::new(name, message)
                    .with_headers(headers)
                    .with_context(cx);

                match svc.oneshot(req).await {
                    Ok(res) => Json(res).into_response(),
                    Err(err) => err.into_response(),
                }
            }
        };

        self.router = self.router.route(procedure, post(handler));
        self
    }

    /// Mounts the `grpc.health.v1.Health/Check` procedure backed by `probe`.
    pub fn health<P>(self, probe: Arc<P>) -> Self
    where
        P: HealthProbe + 'static,
    {
        let service = HealthService::new(probe, self.logger.clone());
        self.procedure(health::CHECK_PROCEDURE, service)
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

async fn unknown_procedure() -> RpcError {
    RpcError::new(StatusCode::Unimplemented, "procedure not found")
}

/// Runs the server with only the health procedure mounted.
///
/// # Errors
///
/// Returns an error if binding fails or the server stops with an I/O error.
pub async fn run(config: Config, logger: Logger) -> Result<()> {
    let router = RpcRouter::new(logger.clone())
        .health(Arc::new(AlwaysServing))
        .into_router();
    serve(&config, &logger, router).await
}

/// Serves `router` until Ctrl-C or SIGTERM.
///
/// After the signal, in-flight requests get `config.shutdown_timeout()` to
/// finish before the server returns.
///
/// # Errors
///
/// Returns an error if binding fails or the server stops with an I/O error.
pub async fn serve(config: &Config, logger: &Logger, router: Router) -> Result<()> {
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    let cx = Context::new();
    logger.info(&cx, &format!("RPC server starting on {addr}"), []);

    let (signalled_tx, signalled_rx) = oneshot::channel();
    let signal = async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(());
    };

    let server = axum::serve(listener, router)
        .with_graceful_shutdown(signal)
        .into_future();
    let mut server = std::pin::pin!(server);

    tokio::select! {
        biased;
        result = &mut server => return result.map_err(Into::into),
        _ = signalled_rx => {}
    }

    let timeout = config.shutdown_timeout();
    logger.info(
        &cx,
        "Shutting down RPC server gracefully...",
        [Attr::duration("timeout", timeout)],
    );

    match tokio::time::timeout(timeout, server).await {
        Ok(result) => result?,
        Err(_) => logger.warn(
            &cx,
            "Shutdown timeout elapsed, dropping in-flight requests",
            [Attr::duration("timeout", timeout)],
        ),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
