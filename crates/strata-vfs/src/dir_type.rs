//! Backend descriptors.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use strata_core::{DirTree, ListError, VfsConfig, path};
use strata_list::{ArchiveFormat, ArchiveLister, DirLister, Lister};

/// Which backend serves a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Backend {
    Directory,
    Archive(ArchiveFormat),
}

/// Where a listing comes from: the backend, the physical object on disk,
/// and the logical subpath inside it (always empty for directories).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirType {
    pub backend: Backend,
    pub physical: PathBuf,
    pub logical: String,
}

impl DirType {
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Directory,
            physical: path.into(),
            logical: String::new(),
        }
    }

    pub fn archive(path: impl Into<PathBuf>, format: ArchiveFormat, logical: &str) -> Self {
        Self {
            backend: Backend::Archive(format),
            physical: path.into(),
            logical: path::canonicalize(logical),
        }
    }

    /// Work out the backend for `path`.
    ///
    /// A directory is served directly. A path that runs through an archive
    /// file (`/data/a.zip/docs`) is served by the archive backend with the
    /// remainder as logical subpath.
    pub fn resolve(path: &Path) -> Result<Self, ListError> {
        let err = match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => return Ok(Self::directory(path)),
            Ok(_) => {
                return match ArchiveFormat::from_path(path) {
                    Some(format) => Ok(Self::archive(path, format, "")),
                    None => Err(ListError::NotADirectory {
                        path: path.to_path_buf(),
                    }),
                };
            }
            Err(err) => err,
        };

        for ancestor in path.ancestors().skip(1) {
            let Ok(metadata) = fs::metadata(ancestor) else {
                continue;
            };
            if metadata.is_file() {
                if let Some(format) = ArchiveFormat::from_path(ancestor) {
                    let logical = path
                        .strip_prefix(ancestor)
                        .map(|rest| {
                            rest.components()
                                .map(|c| c.as_os_str().to_string_lossy())
                                .collect::<Vec<_>>()
                                .join("/")
                        })
                        .unwrap_or_default();
                    return Ok(Self::archive(ancestor, format, &logical));
                }
            }
            break;
        }

        Err(ListError::io(path, err))
    }

    pub fn is_archive(&self) -> bool {
        matches!(self.backend, Backend::Archive(_))
    }

    /// The location as a single path.
    pub fn full_path(&self) -> PathBuf {
        if self.logical.is_empty() {
            self.physical.clone()
        } else {
            self.physical.join(&self.logical)
        }
    }

    /// An empty tree of the kind this backend builds.
    pub fn new_tree(&self) -> DirTree {
        match self.backend {
            Backend::Directory => DirTree::flat(),
            Backend::Archive(_) => DirTree::archive(),
        }
    }

    /// Same location with another logical subpath.
    pub fn with_logical(&self, logical: &str) -> Self {
        Self {
            logical: path::canonicalize(logical),
            ..self.clone()
        }
    }
}

/// Supplies the lister for a backend.
pub trait ListerProvider: Send + Sync {
    fn lister(&self, dir_type: &DirType) -> Arc<dyn Lister>;
}

/// Directory and archive listers configured from [`VfsConfig`].
#[derive(Debug, Clone, Default)]
pub struct DefaultListers {
    dir: DirLister,
}

impl DefaultListers {
    pub fn new(config: &VfsConfig) -> Self {
        Self {
            dir: DirLister::from_config(config),
        }
    }
}

impl ListerProvider for DefaultListers {
    fn lister(&self, dir_type: &DirType) -> Arc<dyn Lister> {
        match dir_type.backend {
            Backend::Directory => Arc::new(self.dir.clone()),
            Backend::Archive(format) => Arc::new(ArchiveLister::new(format)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_directory() {
        let temp = TempDir::new().unwrap();
        let dir_type = DirType::resolve(temp.path()).unwrap();
        assert_eq!(dir_type.backend, Backend::Directory);
        assert!(dir_type.logical.is_empty());
        assert!(!dir_type.new_tree().is_archive());
    }

    #[test]
    fn test_resolve_inside_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("a.tar.gz");
        fs::write(&archive, b"").unwrap();

        let dir_type = DirType::resolve(&archive.join("docs/./api")).unwrap();
        assert_eq!(dir_type.backend, Backend::Archive(ArchiveFormat::TarGz));
        assert_eq!(dir_type.physical, archive);
        assert_eq!(dir_type.logical, "docs/api");
        assert_eq!(dir_type.full_path(), archive.join("docs/api"));
    }

    #[test]
    fn test_resolve_errors() {
        let temp = TempDir::new().unwrap();
        let plain = temp.path().join("notes.txt");
        fs::write(&plain, b"x").unwrap();

        assert!(matches!(
            DirType::resolve(&plain),
            Err(ListError::NotADirectory { .. })
        ));
        assert!(matches!(
            DirType::resolve(&temp.path().join("missing/deeper")),
            Err(ListError::NotFound { .. })
        ));
    }
}
