//! Error types for listing and writing.

use std::path::PathBuf;

use thiserror::Error;

/// Marker returned by cancellation checkpoints.
///
/// Cancellation is a control-flow outcome, not a failure, so it is kept
/// apart from [`ListError`] everywhere a caller has to tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation canceled")]
pub struct Cancelled;

const EPERM: i32 = 1;
const ENOENT: i32 = 2;
const EIO: i32 = 5;
const EACCES: i32 = 13;
const ENOTDIR: i32 = 20;
const ENOTSUP: i32 = 95;
const ECANCELED: i32 = 125;

/// Errors raised while enumerating or writing a backend.
#[derive(Debug, Error)]
pub enum ListError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Path exists but cannot be listed as a directory.
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive codec rejected the container.
    #[error("Archive error in {path}: {message}")]
    Archive { path: PathBuf, message: String },

    /// The lister cannot read from the supplied source.
    #[error("Unsupported source: {message}")]
    UnsupportedSource { message: String },

    /// The recovery strategy chose to abort.
    #[error("Operation aborted")]
    Aborted,

    /// The listing was cancelled before it finished.
    #[error("operation canceled")]
    Cancelled,
}

impl ListError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::NotADirectory => Self::NotADirectory { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create an archive codec error.
    pub fn archive(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// errno-style code for callers that only carry an integer.
    pub fn code(&self) -> i32 {
        match self {
            Self::PermissionDenied { .. } => EACCES,
            Self::NotFound { .. } => ENOENT,
            Self::NotADirectory { .. } => ENOTDIR,
            Self::Io { source, .. } => source.raw_os_error().unwrap_or(EIO),
            Self::Archive { .. } => EIO,
            Self::UnsupportedSource { .. } => ENOTSUP,
            Self::Aborted => EPERM,
            Self::Cancelled => ECANCELED,
        }
    }

    /// Check if this error only reports a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<Cancelled> for ListError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Errors raised while writing entries into a directory or archive.
#[derive(Debug, Error)]
pub enum WriteError {
    /// An entry name was rejected before anything was written.
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// An entry with the same name already exists on disk.
    #[error("Already exists: {path}")]
    AlreadyExists { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive codec failed while writing.
    #[error("Archive error in {path}: {message}")]
    Archive { path: PathBuf, message: String },

    /// The recovery strategy chose to abort.
    #[error("Operation aborted")]
    Aborted,

    /// The writer was already closed.
    #[error("Writer already closed")]
    Closed,
}

impl WriteError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create an archive codec error.
    pub fn archive(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_name(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_error_io() {
        let err = ListError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ListError::PermissionDenied { .. }));
        assert_eq!(err.code(), EACCES);
    }

    #[test]
    fn test_list_error_codes() {
        let err = ListError::io("/x", std::io::Error::from_raw_os_error(ENOENT));
        assert!(matches!(err, ListError::NotFound { .. }));
        assert_eq!(err.code(), ENOENT);
        assert_eq!(ListError::from(Cancelled).code(), ECANCELED);
        assert_eq!(Cancelled.to_string(), "operation canceled");
    }

    #[test]
    fn test_write_error_io() {
        let err = WriteError::io(
            "/out/a.txt",
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exists"),
        );
        assert!(matches!(err, WriteError::AlreadyExists { .. }));
        assert!(err.to_string().contains("/out/a.txt"));
    }
}
