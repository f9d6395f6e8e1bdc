//! Error types for xnatkit.
//!
//! Library crates use [`XnatKitError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Errors fall in two classes. [`XnatKitError::Xnat`] covers everything the
//! server side can cause (unexpected HTTP status, connectivity, unreachable
//! or already-existing entities); orchestration code downgrades those to
//! warnings around individual REST steps. Every other variant is a local
//! failure and aborts the run.

use std::path::PathBuf;

/// Top-level error type for all xnatkit operations.
#[derive(Debug, thiserror::Error)]
pub enum XnatKitError {
    /// XNAT-related failure: unexpected HTTP status or connectivity issue.
    #[error("XNAT error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Xnat {
        status: Option<u16>,
        message: String,
    },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Header, XML, CSV or JSON parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Bad input (unexpected files, missing companions, invalid arguments).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// PAR/REC to NIfTI conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Mosaic rendering or image encoding error.
    #[error("image error: {0}")]
    Image(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, XnatKitError>;

impl XnatKitError {
    /// Create an XNAT-class error without an HTTP status (connectivity, conflicts).
    pub fn xnat(msg: impl Into<String>) -> Self {
        Self::Xnat {
            status: None,
            message: msg.into(),
        }
    }

    /// Create an XNAT-class error carrying the HTTP status that caused it.
    pub fn xnat_status(status: u16, msg: impl Into<String>) -> Self {
        Self::Xnat {
            status: Some(status),
            message: msg.into(),
        }
    }

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

    /// Whether this error belongs to the XNAT-related class.
    pub fn is_xnat(&self) -> bool {
        matches!(self, Self::Xnat { .. })
    }

    /// HTTP status attached to an XNAT-class error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Xnat { status, .. } => *status,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = XnatKitError::config("missing host");
        assert_eq!(err.to_string(), "config error: missing host");

        let err = XnatKitError::xnat_status(404, "project P1 is unreachable");
        assert_eq!(err.to_string(), "XNAT error (HTTP 404): project P1 is unreachable");

        let err = XnatKitError::xnat("connection refused");
        assert_eq!(err.to_string(), "XNAT error: connection refused");
    }

    #[test]
    fn xnat_class_is_distinguished() {
        assert!(XnatKitError::xnat("down").is_xnat());
        assert_eq!(XnatKitError::xnat_status(409, "exists").status(), Some(409));
        assert!(!XnatKitError::validation("bad file").is_xnat());
        assert_eq!(XnatKitError::parse("bad header").status(), None);
    }
}
