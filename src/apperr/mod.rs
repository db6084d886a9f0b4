//! Structured application errors with status-code semantics.
//!
//! [`ApplicationError`] is the error every fallible operation in a service
//! returns. It carries a [`StatusCode`], a human-readable message, an
//! optional cause, and ordered attributes for logging.
//!
//! # Construction
//!
//! ```
//! use rpc_scaffold::apperr::ApplicationError;
//! use rpc_scaffold::codes::StatusCode;
//! use rpc_scaffold::logging::Attr;
//!
//! let err = ApplicationError::new(
//!     StatusCode::InvalidArgument,
//!     "invalid email",
//!     vec![Attr::string("field", "email")],
//! );
//! assert_eq!(err.to_string(), "invalid email (invalid_argument)");
//! ```
//!
//! # Wrapping
//!
//! [`ApplicationError::wrap`] adds context to a lower-layer failure. When the
//! wrapped error already contains an `ApplicationError`, the chain is
//! flattened: the new error points at the original root cause, keeps the
//! first captured stack trace, and appends the new attributes.
//!
//! # Comparison
//!
//! Two application errors are equal when their codes are equal; messages
//! and attributes are ignored. Use [`ApplicationError::is`] or [`has_code`]
//! to branch on error kind, and [`ApplicationError::caused_by`] to look for
//! a specific driver error such as "no rows" in the cause chain.

mod chain;
mod stack;

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use tower::BoxError;

use crate::codes::StatusCode;
use crate::logging::{Attr, AttrValue, keys};

pub use chain::{caused_by, chain, find_app_error, has_code, is};
pub use stack::StackTrace;

/// Typed error carrying a status code, message, optional cause and attributes.
///
/// Values are immutable once built and cheap to share across tasks.
#[derive(Debug, Clone)]
pub struct ApplicationError {
    code: StatusCode,
    message: String,
    cause: Option<Arc<dyn Error + Send + Sync + 'static>>,
    attrs: Vec<Attr>,
}

impl ApplicationError {
    /// Creates an error with no cause.
    ///
    /// The message becomes `"<msg> (<code>)"` and the caller's stack is
    /// stored under the `stacktrace` attribute, after `attrs`.
    #[track_caller]
    pub fn new(code: StatusCode, msg: impl Into<String>, mut attrs: Vec<Attr>) -> Self {
        attrs.push(Attr::new(keys::STACKTRACE, StackTrace::capture()));

        Self {
            code,
            message: format!("{} ({code})", msg.into()),
            cause: None,
            attrs,
        }
    }

    /// Wraps `err` with a new code and message.
    ///
    /// For foreign errors the result's cause is `err` itself. When `err`'s
    /// chain contains an `ApplicationError`, its cause is reused (or the
    /// inner error becomes the cause if it has none), its attributes are
    /// kept in front of `attrs`, and its stack trace wins over the new one.
    /// A new trace is captured only when there is no inner one.
    #[track_caller]
    pub fn wrap<E>(err: E, code: StatusCode, msg: impl Into<String>, attrs: Vec<Attr>) -> Self
    where
        E: Into<BoxError>,
    {
        let msg = msg.into();
        let source: BoxError = err.into();

        let Some(inner) = find_app_error(&*source) else {
            let mut attrs = attrs;
            attrs.push(Attr::new(keys::STACKTRACE, StackTrace::capture()));
            return Self {
                code,
                message: format!("{msg}: {source} ({code})"),
                cause: Some(Arc::from(source)),
                attrs,
            };
        };

        let mut merged = inner.attrs.clone();
        merged.extend(attrs.into_iter().filter(|a| a.key != keys::STACKTRACE));
        if inner.stack().is_none() {
            merged.push(Attr::new(keys::STACKTRACE, StackTrace::capture()));
        }

        let cause = match &inner.cause {
            Some(root) => Arc::clone(root),
            None => Arc::new(inner.clone()),
        };

        Self {
            code,
            message: format!("{msg} ({code}): {}", inner.message),
            cause: Some(cause),
            attrs: merged,
        }
    }

    /// An attribute-less error used only for comparisons with [`Self::is`].
    pub const fn sentinel(code: StatusCode) -> Self {
        Self {
            code,
            message: String::new(),
            cause: None,
            attrs: Vec::new(),
        }
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The direct cause, if any.
    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// All attributes, including the stack trace.
    pub fn attrs(&self) -> &[Attr] {
        &self.attrs
    }

    /// Attributes that may be shown to callers; the stack trace is excluded.
    pub fn public_attrs(&self) -> impl Iterator<Item = &Attr> {
        self.attrs.iter().filter(|a| a.key != keys::STACKTRACE)
    }

    /// The stack captured where the error chain was first built.
    pub fn stack(&self) -> Option<&StackTrace> {
        self.attrs.iter().find_map(|a| match &a.value {
            AttrValue::Stack(stack) if a.key == keys::STACKTRACE => Some(stack),
            _ => None,
        })
    }

    /// [`Self::stack`] rendered as text. Symbols are resolved on first use.
    pub fn stacktrace(&self) -> Option<&str> {
        self.stack().map(StackTrace::as_str)
    }

    /// Returns `true` if `target` is an application error with the same
    /// code, or if the cause chain contains `target` itself.
    ///
    /// Causes are stored behind an `Arc`, so a foreign error the caller
    /// still holds never matches here. Compare those by value with
    /// [`Self::caused_by`].
    pub fn is(&self, target: &(dyn Error + 'static)) -> bool {
        if let Some(target) = target.downcast_ref::<ApplicationError>() {
            return self.code == target.code;
        }
        self.cause
            .as_deref()
            .is_some_and(|cause| chain::is(cause, target))
    }

    /// Returns `true` if the cause chain holds an `E` equal to `target`.
    ///
    /// ```
    /// use rpc_scaffold::apperr::ApplicationError;
    /// use rpc_scaffold::codes::StatusCode;
    ///
    /// #[derive(Debug, PartialEq, thiserror::Error)]
    /// #[error("sql: no rows in result set")]
    /// struct NoRows;
    ///
    /// let err = ApplicationError::wrap(NoRows, StatusCode::NotFound, "user not found", vec![]);
    /// let err = ApplicationError::wrap(err, StatusCode::Internal, "failed to fetch", vec![]);
    /// assert!(err.caused_by(&NoRows));
    /// ```
    pub fn caused_by<E>(&self, target: &E) -> bool
    where
        E: Error + PartialEq + 'static,
    {
        self.cause
            .as_deref()
            .is_some_and(|cause| chain::caused_by(cause, target))
    }

    /// Structured representation for log sinks.
    ///
    /// Yields `message`, `code`, an optional `cause`, an optional `attrs`
    /// group without the stack trace, and the `stacktrace` itself.
    pub fn log_value(&self) -> AttrValue {
        let mut fields = vec![
            Attr::string("message", &self.message),
            Attr::string("code", self.code.as_str()),
        ];
        if let Some(cause) = &self.cause {
            fields.push(Attr::string("cause", cause.to_string()));
        }

        let attrs: Vec<Attr> = self.public_attrs().cloned().collect();
        if !attrs.is_empty() {
            fields.push(Attr::group("attrs", attrs));
        }
        if let Some(stack) = self.stack() {
            fields.push(Attr::new(keys::STACKTRACE, stack.clone()));
        }

        AttrValue::Group(fields)
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for ApplicationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

impl PartialEq for ApplicationError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for ApplicationError {}

/// Re-wraps the error side of a `Result` as an [`ApplicationError`].
pub trait ResultExt<T> {
    /// Equivalent to `map_err(|e| ApplicationError::wrap(e, code, msg, attrs))`,
    /// with the stack captured at the call site.
    fn wrap_err(
        self,
        code: StatusCode,
        msg: impl Into<String>,
        attrs: Vec<Attr>,
    ) -> Result<T, ApplicationError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<BoxError>,
{
    #[track_caller]
    fn wrap_err(
        self,
        code: StatusCode,
        msg: impl Into<String>,
        attrs: Vec<Attr>,
    ) -> Result<T, ApplicationError> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(ApplicationError::wrap(err, code, msg, attrs)),
        }
    }
}
