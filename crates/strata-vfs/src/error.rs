//! Errors raised while setting up a VFS.

use thiserror::Error;

/// Result type for VFS construction.
pub type Result<T> = std::result::Result<T, VfsError>;

/// Errors that prevent a VFS from being built.
///
/// Failures of individual reads are reported through
/// [`Delegate::finish`](crate::Delegate::finish) as `ListError`s instead.
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("failed to start background workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
