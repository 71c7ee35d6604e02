//! Error types for rezi-core.

use std::io;

/// Error type for rezi-core operations.
#[derive(Debug, thiserror::Error)]
pub enum ReziCoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An unsupported prop value was passed to a widget.
    #[error("invalid props: {0}")]
    InvalidProps(String),

    /// A sizing expression failed to parse.
    #[error(transparent)]
    Syntax(#[from] crate::expr::SyntaxError),

    /// Constraint graph construction or resolution failed.
    #[error(transparent)]
    Constraint(#[from] crate::constraint::ConstraintError),

    /// Drawlist construction failed.
    #[error(transparent)]
    Drawlist(#[from] crate::drawlist::DrawlistError),

    /// Terminal input bytes could not be decoded.
    #[error(transparent)]
    EventParse(#[from] crate::input::EventParseError),

    /// Repro bundle validation or serialization failed.
    #[error(transparent)]
    Repro(#[from] crate::repro::ReproError),

    /// Operation on a closed or disposed object.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The backend was stopped while an operation was pending.
    #[error("backend stopped")]
    Stopped,

    /// Terminal operation failed.
    #[error("terminal error: {0}")]
    Terminal(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for rezi-core operations.
pub type Result<T> = std::result::Result<T, ReziCoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ReziCoreError::Terminal("no tty".into());
        assert_eq!(err.to_string(), "terminal error: no tty");
    }

    #[test]
    fn io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: ReziCoreError = io_err.into();
        assert!(matches!(err, ReziCoreError::Io(_)));
    }

    #[test]
    fn invalid_props_display() {
        let err = ReziCoreError::InvalidProps("percentage strings are not supported".into());
        assert!(err.to_string().contains("invalid props"));
    }
}
