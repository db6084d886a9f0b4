//! Structured, trace-aware logging.
//!
//! [`Logger`] writes one record per call in JSON or `key=value` text form to
//! a configurable sink. Every record picks up `trace_id` and `span_id` from
//! the request's [`opentelemetry::Context`] when a valid span is attached.
//!
//! ```
//! use opentelemetry::Context;
//! use rpc_scaffold::logging::{Attr, Format, Logger, MemoryWriter};
//! use tracing::level_filters::LevelFilter;
//!
//! let sink = MemoryWriter::new();
//! let logger = Logger::builder()
//!     .level(LevelFilter::DEBUG)
//!     .format(Format::Json)
//!     .writer(sink.clone())
//!     .without_time()
//!     .build();
//!
//! logger.info(&Context::new(), "user created", [Attr::string("user_id", "42")]);
//! assert_eq!(
//!     sink.contents(),
//!     "{\"level\":\"INFO\",\"msg\":\"user created\",\"user_id\":\"42\"}\n"
//! );
//! ```

mod attr;
mod format;
mod writer;

use std::error::Error;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use chrono::{Local, SecondsFormat};
use opentelemetry::Context;
use opentelemetry::trace::TraceContextExt;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub use attr::{Attr, AttrValue, keys};
pub use format::{Format, ParseFormatError, ReplaceAttr};
pub use writer::MemoryWriter;

/// Minimum level used when none is configured.
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::INFO;

/// Leveled structured logger.
///
/// Cloning is cheap; clones share the sink and configuration. Writes are
/// synchronous and the sink serializes concurrent writers.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
    attrs: Arc<[Attr]>,
}

struct Shared {
    level: LevelFilter,
    format: Format,
    with_time: bool,
    writer: BoxMakeWriter,
    replace_attr: Option<ReplaceAttr>,
}

/// Configures a [`Logger`].
pub struct LoggerBuilder {
    level: LevelFilter,
    format: Format,
    with_time: bool,
    writer: BoxMakeWriter,
    replace_attr: Option<ReplaceAttr>,
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            format: Format::default(),
            with_time: true,
            writer: BoxMakeWriter::new(std::io::stdout),
            replace_attr: None,
        }
    }
}

impl LoggerBuilder {
    pub fn level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Sets the sink. Anything implementing `MakeWriter` works, including
    /// `std::io::stderr` and [`MemoryWriter`].
    pub fn writer<W>(mut self, writer: W) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        self.writer = BoxMakeWriter::new(writer);
        self
    }

    /// Installs a hook that may rewrite or drop attributes before output.
    pub fn replace_attr<F>(mut self, replace: F) -> Self
    where
        F: Fn(&[&str], Attr) -> Option<Attr> + Send + Sync + 'static,
    {
        self.replace_attr = Some(Arc::new(replace));
        self
    }

    /// Omits the `time` key from every record.
    pub fn without_time(mut self) -> Self {
        self.with_time = false;
        self
    }

    pub fn build(self) -> Logger {
        Logger {
            shared: Arc::new(Shared {
                level: self.level,
                format: self.format,
                with_time: self.with_time,
                writer: self.writer,
                replace_attr: self.replace_attr,
            }),
            attrs: Arc::from(Vec::new()),
        }
    }
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    pub fn debug(&self, cx: &Context, msg: &str, attrs: impl IntoIterator<Item = Attr>) {
        self.log(cx, Level::DEBUG, msg, attrs.into_iter().collect());
    }

    pub fn info(&self, cx: &Context, msg: &str, attrs: impl IntoIterator<Item = Attr>) {
        self.log(cx, Level::INFO, msg, attrs.into_iter().collect());
    }

    pub fn warn(&self, cx: &Context, msg: &str, attrs: impl IntoIterator<Item = Attr>) {
        self.log(cx, Level::WARN, msg, attrs.into_iter().collect());
    }

    /// Logs at error level. The error is required and is recorded under the
    /// `error` key ahead of `attrs`.
    pub fn error(
        &self,
        cx: &Context,
        msg: &str,
        err: &(dyn Error + 'static),
        attrs: impl IntoIterator<Item = Attr>,
    ) {
        let mut all = vec![Attr::error(err)];
        all.extend(attrs);
        self.log(cx, Level::ERROR, msg, all);
    }

    /// Returns a logger that adds `attrs` to every record.
    pub fn with(&self, attrs: impl IntoIterator<Item = Attr>) -> Logger {
        let merged: Vec<Attr> = self.attrs.iter().cloned().chain(attrs).collect();
        Logger {
            shared: Arc::clone(&self.shared),
            attrs: Arc::from(merged),
        }
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.shared.level
    }

    fn log(&self, cx: &Context, level: Level, msg: &str, attrs: Vec<Attr>) {
        if !self.enabled(level) {
            return;
        }

        let mut record = Vec::with_capacity(5 + self.attrs.len() + attrs.len());
        if self.shared.with_time {
            let now = Local::now().to_rfc3339_opts(SecondsFormat::Millis, false);
            record.push(Attr::string(keys::TIME, now));
        }
        record.push(Attr::string(keys::LEVEL, level.as_str()));
        record.push(Attr::string(keys::MESSAGE, msg));
        record.extend(self.attrs.iter().cloned());
        record.extend(trace_attrs(cx).into_iter().flatten());
        record.extend(attrs);

        let record = format::prepare(record, self.shared.replace_attr.as_ref());
        let Ok(line) = format::render(self.shared.format, &record) else {
            return;
        };

        let mut writer = self.shared.writer.make_writer();
        let _ = writer.write_all(&line);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.shared.level)
            .field("format", &self.shared.format)
            .field("attrs", &self.attrs)
            .finish_non_exhaustive()
    }
}

/// `trace_id` and `span_id` of the span attached to `cx`, if it is valid.
fn trace_attrs(cx: &Context) -> Option<[Attr; 2]> {
    let span = cx.span();
    let span_context = span.span_context();
    if !span_context.is_valid() {
        return None;
    }

    Some([
        Attr::string(keys::TRACE_ID, span_context.trace_id().to_string()),
        Attr::string(keys::SPAN_ID, span_context.span_id().to_string()),
    ])
}
