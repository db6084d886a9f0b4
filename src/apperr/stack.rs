//! Call-stack capture for application errors.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt::{self, Write};
use std::panic::Location;
use std::sync::{Arc, OnceLock};

const MAX_FRAMES: usize = 32;

/// Symbol printed for frames whose name could not be resolved.
const UNRESOLVED: &str = "<unknown>";

/// Frames produced by the capture machinery itself; skipped when they lead the trace.
const INTERNAL_FRAMES: [&str; 7] = [
    "std::backtrace",
    "<std::backtrace",
    "apperr::stack::StackTrace::capture",
    "apperr::stack::capture",
    "apperr::ApplicationError::new",
    "apperr::ApplicationError::wrap",
    "apperr::ResultExt",
];

/// Call stack recorded where an error chain was first built.
///
/// Capturing only walks the stack. Symbols are resolved and the text is
/// rendered the first time it is read, so errors that are never logged
/// never pay for symbolization. Clones share the rendered text.
#[derive(Clone)]
pub struct StackTrace(Arc<Captured>);

struct Captured {
    caller: &'static Location<'static>,
    backtrace: Backtrace,
    rendered: OnceLock<String>,
}

impl StackTrace {
    /// Records the stack of the caller of `new`/`wrap`.
    #[track_caller]
    pub(crate) fn capture() -> Self {
        Self(Arc::new(Captured {
            caller: Location::caller(),
            backtrace: Backtrace::force_capture(),
            rendered: OnceLock::new(),
        }))
    }

    /// Location of the `new`/`wrap` call that captured this trace.
    pub fn caller(&self) -> &'static Location<'static> {
        self.0.caller
    }

    /// The trace as text: a `called at` line followed by the native frames,
    /// when the platform can capture them.
    pub fn as_str(&self) -> &str {
        self.0.rendered.get_or_init(|| {
            let caller = self.0.caller;
            let mut out = format!(
                "called at {}:{}:{}\n",
                caller.file(),
                caller.line(),
                caller.column()
            );
            if self.0.backtrace.status() == BacktraceStatus::Captured {
                render_frames(&self.0.backtrace.to_string(), &mut out);
            }
            out
        })
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackTrace")
            .field("caller", &self.0.caller)
            .finish_non_exhaustive()
    }
}

impl PartialEq for StackTrace {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.as_str() == other.as_str()
    }
}

struct Frame<'a> {
    symbol: &'a str,
    location: Option<&'a str>,
}

fn parse_frames(rendered: &str) -> Vec<Frame<'_>> {
    let mut frames: Vec<Frame<'_>> = Vec::new();
    for line in rendered.lines() {
        let trimmed = line.trim();
        if let Some(location) = trimmed.strip_prefix("at ") {
            if let Some(last) = frames.last_mut()
                && last.location.is_none()
            {
                last.location = Some(location);
            }
            continue;
        }
        if let Some((index, symbol)) = trimmed.split_once(": ")
            && index.chars().all(|c| c.is_ascii_digit())
        {
            frames.push(Frame {
                symbol,
                location: None,
            });
        }
    }
    frames
}

fn is_internal(symbol: &str) -> bool {
    INTERNAL_FRAMES.iter().any(|marker| symbol.contains(marker))
}

fn render_frames(rendered: &str, out: &mut String) {
    let frames = parse_frames(rendered);
    let user_frames = frames
        .iter()
        .filter(|frame| frame.symbol != UNRESOLVED)
        .skip_while(|frame| is_internal(frame.symbol))
        .take(MAX_FRAMES);

    for frame in user_frames {
        let _ = writeln!(out, "{}", frame.symbol);
        if let Some(location) = frame.location {
            let _ = writeln!(out, "\tat {location}");
        }
    }
}
