//! Status codes shared by application errors and RPC responses.
//!
//! The set mirrors the Connect/gRPC code space. Every code is statically
//! classified as either client-caused or server-caused; the interceptor
//! uses that split to decide whether a failure deserves an error log.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of RPC status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

/// Who is responsible for a failure carrying a given code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// The request was invalid for the current inputs or state.
    Client,
    /// The system failed to do what a valid request asked.
    Server,
}

/// Returned when a wire string does not name any [`StatusCode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status code: {0:?}")]
pub struct UnknownCode(pub String);

impl StatusCode {
    /// Every code, in wire-number order.
    pub const ALL: [StatusCode; 16] = [
        StatusCode::Canceled,
        StatusCode::Unknown,
        StatusCode::InvalidArgument,
        StatusCode::DeadlineExceeded,
        StatusCode::NotFound,
        StatusCode::AlreadyExists,
        StatusCode::PermissionDenied,
        StatusCode::ResourceExhausted,
        StatusCode::FailedPrecondition,
        StatusCode::Aborted,
        StatusCode::OutOfRange,
        StatusCode::Unimplemented,
        StatusCode::Internal,
        StatusCode::Unavailable,
        StatusCode::DataLoss,
        StatusCode::Unauthenticated,
    ];

    /// Canonical snake_case form used on the wire and in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            StatusCode::Canceled => "canceled",
            StatusCode::Unknown => "unknown",
            StatusCode::InvalidArgument => "invalid_argument",
            StatusCode::DeadlineExceeded => "deadline_exceeded",
            StatusCode::NotFound => "not_found",
            StatusCode::AlreadyExists => "already_exists",
            StatusCode::PermissionDenied => "permission_denied",
            StatusCode::ResourceExhausted => "resource_exhausted",
            StatusCode::FailedPrecondition => "failed_precondition",
            StatusCode::Aborted => "aborted",
            StatusCode::OutOfRange => "out_of_range",
            StatusCode::Unimplemented => "unimplemented",
            StatusCode::Internal => "internal",
            StatusCode::Unavailable => "unavailable",
            StatusCode::DataLoss => "data_loss",
            StatusCode::Unauthenticated => "unauthenticated",
        }
    }

    /// HTTP status the Connect unary protocol assigns to this code.
    pub const fn http_status(self) -> u16 {
        match self {
            StatusCode::Canceled => 499,
            StatusCode::Unknown => 500,
            StatusCode::InvalidArgument => 400,
            StatusCode::DeadlineExceeded => 504,
            StatusCode::NotFound => 404,
            StatusCode::AlreadyExists => 409,
            StatusCode::PermissionDenied => 403,
            StatusCode::ResourceExhausted => 429,
            StatusCode::FailedPrecondition => 400,
            StatusCode::Aborted => 409,
            StatusCode::OutOfRange => 400,
            StatusCode::Unimplemented => 501,
            StatusCode::Internal => 500,
            StatusCode::Unavailable => 503,
            StatusCode::DataLoss => 500,
            StatusCode::Unauthenticated => 401,
        }
    }

    /// Shorthand for `classify(self) == Classification::Server`.
    pub const fn is_server_error(self) -> bool {
        matches!(classify(self), Classification::Server)
    }
}

/// Classifies a code as client- or server-caused.
///
/// The match is exhaustive so adding a variant forces a decision here.
pub const fn classify(code: StatusCode) -> Classification {
    match code {
        StatusCode::Internal
        | StatusCode::Unknown
        | StatusCode::DataLoss
        | StatusCode::Unavailable
        | StatusCode::Unimplemented => Classification::Server,
        StatusCode::InvalidArgument
        | StatusCode::NotFound
        | StatusCode::AlreadyExists
        | StatusCode::PermissionDenied
        | StatusCode::FailedPrecondition
        | StatusCode::OutOfRange
        | StatusCode::Unauthenticated
        | StatusCode::Canceled
        | StatusCode::DeadlineExceeded
        | StatusCode::Aborted
        | StatusCode::ResourceExhausted => Classification::Client,
    }
}

/// Classifies a code received as a string, e.g. from a peer.
///
/// Strings that do not name a known code are treated as server errors so
/// that they reach an operator instead of being dropped as client noise.
pub fn classify_wire(code: &str) -> Classification {
    code.parse::<StatusCode>()
        .map_or(Classification::Server, classify)
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusCode {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatusCode::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownCode(s.to_string()))
    }
}
