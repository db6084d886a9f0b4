//! Transport-level error returned to RPC clients.
//!
//! [`RpcError`] is what leaves the interceptor chain: a status code, the
//! public message, and string metadata derived from the application error's
//! attributes. Rendering follows the Connect unary protocol: a JSON body
//! `{"code": ..., "message": ...}`, an HTTP status mapped from the code and
//! the metadata as response headers.

use std::error::Error;
use std::fmt;

use axum::{
    Json,
    http::{HeaderName, HeaderValue, StatusCode as HttpStatus, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tower::BoxError;

use crate::codes::StatusCode;

/// Headers owned by the HTTP layer; metadata never overrides them.
const RESERVED_HEADERS: [HeaderName; 9] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_ENCODING,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::UPGRADE,
    header::TE,
    header::TRAILER,
    header::DATE,
];

/// Ordered string metadata attached to an [`RpcError`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing an existing entry in place. Keys compare
    /// case-insensitively, as header names do.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Error in the shape the RPC framework sends to clients.
#[derive(Debug)]
pub struct RpcError {
    code: StatusCode,
    message: String,
    metadata: Metadata,
    source: Option<BoxError>,
}

impl RpcError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            metadata: Metadata::new(),
            source: None,
        }
    }

    /// Builds an error whose message is `err`'s text and whose source is `err`.
    pub fn from_error<E>(code: StatusCode, err: E) -> Self
    where
        E: Into<BoxError>,
    {
        let source = err.into();
        Self {
            code,
            message: source.to_string(),
            metadata: Metadata::new(),
            source: Some(source),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        self.source = Some(source.into());
        self
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl Error for RpcError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    message: &'a str,
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status =
            HttpStatus::from_u16(self.code.http_status()).unwrap_or(HttpStatus::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            code: self.code.as_str(),
            message: &self.message,
        };
        let mut response = (status, Json(body)).into_response();

        let headers = response.headers_mut();
        for (key, value) in self.metadata.iter() {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) else {
                continue;
            };
            if RESERVED_HEADERS.contains(&name) {
                continue;
            }
            headers.append(name, value);
        }

        response
    }
}
