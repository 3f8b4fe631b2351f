//! Virtual file system facade for strata.
//!
//! A [`Vfs`] owns the current directory tree of one location, which may be
//! a real directory or a path inside an archive. It reads locations on
//! background workers, streams entries to a [`Delegate`], navigates inside
//! archives, and keeps the tree current by applying live change bursts from
//! a directory monitor.
//!
//! Every callback that mutates state runs on the controlling thread: the
//! thread that drives the [`Dispatcher`] whose handle the VFS was built
//! with.

mod delegate;
mod dir_type;
mod error;
mod update;
mod vfs;

pub use delegate::{DeletedCallback, Delegate, DirChangedCallback};
pub use dir_type::{Backend, DefaultListers, DirType, ListerProvider};
pub use error::{Result, VfsError};
pub use vfs::Vfs;

pub use strata_core::{DirEntry, DirTree, ListError, VfsConfig};
pub use strata_task::{DispatchHandle, Dispatcher};
