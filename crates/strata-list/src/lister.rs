//! The backend enumeration boundary.

use std::fs::File;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use compact_str::CompactString;
use serde::Serialize;

use strata_core::{Attributes, DirEntry, EntryType, ListError};

/// What a lister reads from.
#[derive(Debug)]
pub enum ListSource {
    /// A path opened by the lister itself.
    Path(PathBuf),
    /// An already open file, read from its start.
    File(File),
}

impl ListSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Duplicate an open handle so the caller keeps its own.
    pub fn from_file(file: &File) -> std::io::Result<Self> {
        file.try_clone().map(Self::File)
    }

    /// Path to mention in errors; open handles have none.
    pub fn display_path(&self) -> &Path {
        match self {
            Self::Path(path) => path,
            Self::File(_) => Path::new("<open file>"),
        }
    }
}

/// One entry as reported by a backend, before it is placed in a tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListedEntry {
    /// Name for directories, member path for archives.
    pub name: CompactString,
    pub declared_type: EntryType,
    pub attributes: Option<Attributes>,
    /// Backend cookie, e.g. the member index inside an archive.
    pub context: Option<u64>,
}

impl ListedEntry {
    pub fn new(name: impl Into<CompactString>, declared_type: EntryType) -> Self {
        Self {
            name: name.into(),
            declared_type,
            attributes: None,
            context: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn with_context(mut self, context: u64) -> Self {
        self.context = Some(context);
        self
    }

    /// Convert into a tree entry.
    pub fn into_dir_entry(self) -> DirEntry {
        let mut entry = DirEntry::new(self.name.as_str(), self.declared_type);
        entry.attributes = self.attributes;
        entry.context = self.context;
        entry
    }
}

/// A backend that can enumerate one level (directories) or every member
/// (archives) of a source.
///
/// Listing is synchronous; callers run it on a background worker and stop
/// it by returning [`ControlFlow::Break`] from `visit`.
pub trait Lister: Send + Sync {
    fn list(
        &self,
        source: ListSource,
        visit: &mut dyn FnMut(ListedEntry) -> ControlFlow<()>,
    ) -> Result<(), ListError>;
}
