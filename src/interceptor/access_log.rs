//! One info-level line per request, whatever its outcome.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use std::time::Instant;

use axum::http::HeaderMap;
use tower::{BoxError, Layer, Service};

use super::RpcRequest;
use crate::logging::{Attr, Logger, keys};
use crate::transport::RpcError;

const HEADER_USER_AGENT: &str = "user-agent";
const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";
const HEADER_REAL_IP: &str = "x-real-ip";
const HEADER_HTTP_METHOD: &str = "x-http-method";

/// Unary RPCs always travel as POST unless a proxy says otherwise.
const DEFAULT_METHOD: &str = "POST";

#[derive(Debug, Clone)]
pub struct AccessLogLayer {
    logger: Logger,
}

impl AccessLogLayer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessLogService<S> {
    inner: S,
    logger: Logger,
}

impl<S, T> Service<RpcRequest<T>> for AccessLogService<S>
where
    S: Service<RpcRequest<T>>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: RpcRequest<T>) -> Self::Future {
        let start = Instant::now();
        let client = ClientInfo::from_headers(req.headers());
        let procedure = req.procedure().to_string();
        let cx = req.context().clone();
        let logger = self.logger.clone();
        let fut = self.inner.call(req);

        Box::pin(async move {
            let result = fut.await;
            let elapsed = start.elapsed();

            let status = match &result {
                Ok(_) => "ok",
                Err(err) => status_of(err),
            };

            logger.info(
                &cx,
                "Access log",
                [
                    Attr::string(keys::PROCEDURE, procedure),
                    Attr::string(keys::METHOD, client.method),
                    Attr::string(keys::STATUS, status),
                    Attr::int(
                        keys::DURATION_MS,
                        i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
                    ),
                    Attr::string(keys::USER_AGENT, client.user_agent),
                    Attr::string(keys::REMOTE_ADDR, client.remote_addr),
                ],
            );

            result
        })
    }
}

struct ClientInfo {
    user_agent: String,
    remote_addr: String,
    method: String,
}

impl ClientInfo {
    fn from_headers(headers: &HeaderMap) -> Self {
        let remote_addr = header(headers, HEADER_FORWARDED_FOR)
            .or_else(|| header(headers, HEADER_REAL_IP))
            .unwrap_or_default();

        Self {
            user_agent: header(headers, HEADER_USER_AGENT)
                .unwrap_or_default()
                .to_string(),
            remote_addr: remote_addr.to_string(),
            method: header(headers, HEADER_HTTP_METHOD)
                .unwrap_or(DEFAULT_METHOD)
                .to_string(),
        }
    }
}

/// First non-empty value of `name`.
fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// The transport code of `err`, or `"unknown"` when it is not an [`RpcError`].
fn status_of(err: &dyn Any) -> &'static str {
    if let Some(rpc) = err.downcast_ref::<RpcError>() {
        return rpc.code().as_str();
    }
    err.downcast_ref::<BoxError>()
        .and_then(|boxed| boxed.downcast_ref::<RpcError>())
        .map_or("unknown", |rpc| rpc.code().as_str())
}
