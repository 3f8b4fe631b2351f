//! Core types for strata.
//!
//! This crate provides the data structures shared by the rest of the
//! workspace: directory entries, the flat and archive directory trees,
//! subpath helpers, errors, and configuration.

mod config;
mod entry;
mod error;
pub mod path;
mod tree;

pub use config::{DEFAULT_BLOCK_SIZE, DEFAULT_MONITOR_IDLE, VfsConfig, VfsConfigBuilder};
pub use entry::{Attributes, DirEntry, EntryId, EntryType};
pub use error::{Cancelled, ListError, WriteError};
pub use tree::{ArchiveTree, ChildMap, DirTree, FlatTree};
