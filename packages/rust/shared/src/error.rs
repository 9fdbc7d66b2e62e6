//! Error types for citecheck.
//!
//! Library crates use [`CitecheckError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all citecheck operations.
#[derive(Debug, thiserror::Error)]
pub enum CitecheckError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching pages.
    #[error("network error: {0}")]
    Network(String),

    /// HTML or YAML parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Zotero Web API error.
    #[error("zotero error: {0}")]
    Zotero(String),

    /// GitHub REST API error.
    #[error("github error: {0}")]
    GitHub(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, inconsistent results, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Report serialization error.
    #[error("report error: {0}")]
    Report(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CitecheckError>;

impl CitecheckError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CitecheckError::config("missing ZOTERO_API_KEY");
        assert_eq!(err.to_string(), "config error: missing ZOTERO_API_KEY");

        let err = CitecheckError::Zotero("HTTP 403 Forbidden".into());
        assert!(err.to_string().starts_with("zotero error"));
    }

    #[test]
    fn io_error_carries_path() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = CitecheckError::io("config.yaml", source);
        assert!(err.to_string().contains("config.yaml"));
        assert!(err.to_string().contains("gone"));
    }
}
