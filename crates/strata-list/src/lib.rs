//! Listing and writing backends for strata.
//!
//! This crate provides:
//! - [`Lister`]: the synchronous enumeration boundary, with [`DirLister`]
//!   for plain directories and [`ArchiveLister`] for zip and tar archives
//! - [`ListHandle`]: asynchronous listing on the background pool
//! - [`EntryWriter`]: creating entries in a directory or a new archive
//! - [`extract_entry`]: streaming one archive member
//! - [`Recovery`]: the progress and error policy for byte streaming

mod archive;
mod dir;
mod extract;
mod handle;
mod lister;
mod recovery;
mod writer;

pub use archive::{ArchiveFormat, ArchiveLister};
pub use dir::DirLister;
pub use extract::extract_entry;
pub use handle::{ListEvent, ListHandle, list_flat};
pub use lister::{ListSource, ListedEntry, Lister};
pub use recovery::{AbortOnError, Action, Progress, Recovery, SkipOnError};
pub use writer::{
    DirWriter, EntryWriter, TarWriter, ZipWriter, copy_tree, create_writer, validate_name,
};
