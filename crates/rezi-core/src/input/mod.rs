//! Terminal input decoding.
//!
//! [`InputParser`] is a streaming decoder: bytes arrive in arbitrary chunks
//! and escape sequences may be split across reads. A sequence that completes
//! across reads decodes normally; a sequence that never completes is flushed
//! as `Escape` followed by the buffered text, in that order, either when the
//! pending buffer exceeds its bound or when the caller flushes on a quiet
//! poll. [`parse_event_batch`] is the strict one-shot entry used for replay.

mod parser;

pub use parser::{InputParser, parse_event_batch};

/// Machine-readable parse error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseErrorCode {
    /// The batch ended inside an escape sequence or UTF-8 sequence.
    Truncated,
    /// An escape sequence violates the grammar.
    Malformed,
    /// Invalid UTF-8 outside escape sequences.
    InvalidUtf8,
}

impl ParseErrorCode {
    /// Stable name for diagnostics.
    pub const fn as_str(self) -> &'static str {
        match self {
            ParseErrorCode::Truncated => "TRUNCATED",
            ParseErrorCode::Malformed => "MALFORMED",
            ParseErrorCode::InvalidUtf8 => "INVALID_UTF8",
        }
    }
}

/// Error from strict batch parsing.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("input parse error at byte {offset}: {} ({detail})", code.as_str())]
pub struct EventParseError {
    /// Error class.
    pub code: ParseErrorCode,
    /// Byte offset of the offending input.
    pub offset: usize,
    /// Human-readable detail.
    pub detail: String,
}

/// Bounds on parser buffering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputLimits {
    /// Maximum bracketed-paste payload; larger pastes are dropped whole.
    pub max_paste_bytes: usize,
    /// Maximum pending escape-sequence length before fallback.
    pub max_escape_bytes: usize,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_paste_bytes: 1024 * 1024,
            max_escape_bytes: 128,
        }
    }
}
