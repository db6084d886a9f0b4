//! Request envelope seen by interceptors and handlers.

use axum::http::HeaderMap;
use opentelemetry::Context;

/// A decoded unary RPC request.
#[derive(Debug, Clone)]
pub struct RpcRequest<T> {
    procedure: String,
    headers: HeaderMap,
    context: Context,
    message: T,
}

impl<T> RpcRequest<T> {
    /// Builds a request for `procedure` (e.g. `/user.v1.UserService/Create`)
    /// with empty headers and an empty trace context.
    pub fn new(procedure: impl Into<String>, message: T) -> Self {
        Self {
            procedure: procedure.into(),
            headers: HeaderMap::new(),
            context: Context::new(),
            message,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Trace context the request arrived with.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn message(&self) -> &T {
        &self.message
    }

    pub fn into_message(self) -> T {
        self.message
    }

    /// Replaces the message, keeping procedure, headers and context.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RpcRequest<U> {
        RpcRequest {
            procedure: self.procedure,
            headers: self.headers,
            context: self.context,
            message: f(self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_map_keeps_envelope() {
        let mut req = RpcRequest::new("/svc.v1.Svc/Do", "42");
        req.headers_mut()
            .insert("user-agent", HeaderValue::from_static("curl/8"));

        let mapped = req.map(|raw| raw.parse::<u32>().unwrap());

        assert_eq!(mapped.procedure(), "/svc.v1.Svc/Do");
        assert_eq!(mapped.headers()["user-agent"], "curl/8");
        assert_eq!(*mapped.message(), 42);
        assert_eq!(mapped.into_message(), 42);
    }
}
