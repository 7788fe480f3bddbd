//! Typed error handling for shakecc.
//!
//! Library consumers can match on the variants; the CLI wraps them in
//! `anyhow` with extra context.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for optimizer operations.
#[derive(Error, Debug)]
pub enum ShakeError {
    /// I/O error when reading the source or writing output
    #[error("I/O error at {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The front end reported at least one error-severity diagnostic
    #[error("Front end failed on {path}. The following compilation errors were detected:\n{}", .diagnostics.join("\n"))]
    FrontEnd {
        path: PathBuf,
        /// Every diagnostic reported, already formatted with its location
        diagnostics: Vec<String>,
    },

    /// Configuration file errors
    #[error("Config error at {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Invalid argument provided (flags, keep-lists)
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Broken internal invariant: conflicting edits, missing front-end
    /// service, inconsistent graph. Always a bug, never bad input.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ShakeError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a front-end failure carrying every diagnostic.
    pub fn front_end(path: impl Into<PathBuf>, diagnostics: Vec<String>) -> Self {
        Self::FrontEnd {
            path: path.into(),
            diagnostics,
        }
    }

    /// Create a config error.
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an internal-consistency error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error signals a bug in shakecc rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Get the path associated with this error, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } => Some(path),
            Self::FrontEnd { path, .. } => Some(path),
            Self::Config { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Convenience type alias for shakecc results.
pub type ShakeResult<T> = Result<T, ShakeError>;

/// Extension trait for converting std::io::Error with path context.
pub trait IoResultExt<T> {
    /// Add path context to an I/O error.
    fn with_path(self, path: impl Into<PathBuf>) -> ShakeResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> ShakeResult<T> {
        self.map_err(|e| ShakeError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error() {
        let err = ShakeError::io(
            PathBuf::from("/test/main.cpp"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        );
        assert!(matches!(err, ShakeError::Io { .. }));
        assert_eq!(err.path(), Some(&PathBuf::from("/test/main.cpp")));
        assert!(err.to_string().contains("/test/main.cpp"));
    }

    #[test]
    fn test_front_end_error_lists_all_diagnostics() {
        let err = ShakeError::front_end(
            "main.cpp",
            vec![
                "main.cpp:1:1: error: first".to_string(),
                "main.cpp:7:3: error: second".to_string(),
            ],
        );
        let text = err.to_string();
        assert!(text.contains("first"));
        assert!(text.contains("second"));
        assert!(!err.is_internal());
    }

    #[test]
    fn test_internal_error() {
        let err = ShakeError::internal("conflicting edits");
        assert!(err.is_internal());
        assert!(err.path().is_none());
    }

    #[test]
    fn test_io_result_ext() {
        let result: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        let shake_result = result.with_path("/missing/main.cpp");
        assert!(matches!(shake_result, Err(ShakeError::Io { .. })));
    }
}
