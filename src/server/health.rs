//! `grpc.health.v1.Health/Check` procedure.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tower::Service;

use crate::apperr::ApplicationError;
use crate::interceptor::RpcRequest;
use crate::logging::{Attr, Logger};

pub const CHECK_PROCEDURE: &str = "/grpc.health.v1.Health/Check";

/// Dependency whose reachability decides whether the service is serving.
///
/// # Implementations
///
/// - [`AlwaysServing`] - no dependencies to check
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Checks the dependency, e.g. by pinging a database.
    ///
    /// # Errors
    ///
    /// Returns an [`ApplicationError`] describing why the dependency is unreachable.
    async fn ping(&self) -> Result<(), ApplicationError>;
}

/// Probe for services without external dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysServing;

#[async_trait]
impl HealthProbe for AlwaysServing {
    async fn ping(&self) -> Result<(), ApplicationError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckRequest {
    pub service: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Serving,
    NotServing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub status: ServingStatus,
}

/// Answers health checks by pinging a [`HealthProbe`].
///
/// A failing probe is logged and reported as `NOT_SERVING`; the procedure
/// itself never fails.
pub struct HealthService<P: HealthProbe> {
    probe: Arc<P>,
    logger: Logger,
}

impl<P: HealthProbe> HealthService<P> {
    pub fn new(probe: Arc<P>, logger: Logger) -> Self {
        Self { probe, logger }
    }
}

impl<P: HealthProbe> Clone for HealthService<P> {
    fn clone(&self) -> Self {
        Self {
            probe: Arc::clone(&self.probe),
            logger: self.logger.clone(),
        }
    }
}

impl<P: HealthProbe + 'static> Service<RpcRequest<CheckRequest>> for HealthService<P> {
    type Response = CheckResponse;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RpcRequest<CheckRequest>) -> Self::Future {
        let probe = Arc::clone(&self.probe);
        let logger = self.logger.clone();

        Box::pin(async move {
            let service = Attr::string("service", req.message().service.as_str());

            let status = match probe.ping().await {
                Ok(()) => {
                    logger.debug(req.context(), "Health check passed", [service]);
                    ServingStatus::Serving
                }
                Err(err) => {
                    logger.error(
                        req.context(),
                        "Health check failed: probe failed",
                        &err,
                        [service],
                    );
                    ServingStatus::NotServing
                }
            };

            Ok(CheckResponse { status })
        })
    }
}
