//! Lister for plain directories.

use std::fs::{self, Metadata};
use std::ops::ControlFlow;
use std::path::Path;

use jwalk::{Parallelism, WalkDir};
use tracing::{debug, warn};

use strata_core::{Attributes, EntryType, ListError, VfsConfig};

use crate::lister::{ListSource, ListedEntry, Lister};

/// Lists the immediate children of a directory.
#[derive(Debug, Clone)]
pub struct DirLister {
    include_hidden: bool,
    follow_symlinks: bool,
}

impl Default for DirLister {
    fn default() -> Self {
        Self {
            include_hidden: true,
            follow_symlinks: true,
        }
    }
}

impl DirLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &VfsConfig) -> Self {
        Self {
            include_hidden: config.include_hidden,
            follow_symlinks: config.follow_symlinks,
        }
    }

    /// Stat an entry, falling back to the link itself for dangling links.
    fn stat(&self, path: &Path) -> Option<Metadata> {
        if self.follow_symlinks {
            fs::metadata(path).or_else(|_| fs::symlink_metadata(path)).ok()
        } else {
            fs::symlink_metadata(path).ok()
        }
    }
}

impl Lister for DirLister {
    fn list(
        &self,
        source: ListSource,
        visit: &mut dyn FnMut(ListedEntry) -> ControlFlow<()>,
    ) -> Result<(), ListError> {
        let root = match source {
            ListSource::Path(path) => path,
            ListSource::File(_) => {
                return Err(ListError::UnsupportedSource {
                    message: "directories can only be listed by path".to_string(),
                });
            }
        };

        let metadata = fs::metadata(&root).map_err(|e| ListError::io(&root, e))?;
        if !metadata.is_dir() {
            return Err(ListError::NotADirectory { path: root });
        }
        // Surface permission problems on the directory itself as errors.
        fs::read_dir(&root).map_err(|e| ListError::io(&root, e))?;

        let walker = WalkDir::new(&root)
            .parallelism(Parallelism::Serial)
            .skip_hidden(!self.include_hidden)
            .follow_links(false)
            .sort(true)
            .min_depth(1)
            .max_depth(1);

        let mut count = 0usize;
        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    if err.path() == Some(root.as_path()) {
                        let source = err
                            .into_io_error()
                            .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                        return Err(ListError::io(&root, source));
                    }
                    warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().to_string();
            let declared_type = EntryType::from_file_type(entry.file_type());
            // gone between the directory read and the stat
            let Some(metadata) = self.stat(&entry.path()) else {
                debug!(name = %name, "entry vanished, skipping");
                continue;
            };
            let listed = ListedEntry::new(name, declared_type).with_attributes(Attributes::from_metadata(&metadata));

            count += 1;
            if visit(listed).is_break() {
                debug!(path = %root.display(), count, "directory listing stopped early");
                return Ok(());
            }
        }

        debug!(path = %root.display(), count, "directory listed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir(root.join("subdir")).unwrap();
        File::create(root.join("file1.txt"))
            .unwrap()
            .write_all(b"Hello World")
            .unwrap();
        File::create(root.join(".hidden")).unwrap();
        File::create(root.join("subdir/nested.txt")).unwrap();

        temp
    }

    fn collect(lister: &DirLister, path: &Path) -> Result<Vec<ListedEntry>, ListError> {
        let mut entries = Vec::new();
        lister.list(ListSource::path(path), &mut |entry| {
            entries.push(entry);
            ControlFlow::Continue(())
        })?;
        Ok(entries)
    }

    #[test]
    fn test_lists_one_level() {
        let temp = create_test_dir();
        let entries = collect(&DirLister::new(), temp.path()).unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, [".hidden", "file1.txt", "subdir"]);

        let file = &entries[1];
        assert_eq!(file.declared_type, EntryType::Regular);
        assert_eq!(file.attributes.unwrap().size, 11);
        assert_eq!(entries[2].declared_type, EntryType::Directory);
    }

    #[test]
    fn test_skip_hidden() {
        let temp = create_test_dir();
        let config = VfsConfig {
            include_hidden: false,
            ..VfsConfig::default()
        };
        let entries = collect(&DirLister::from_config(&config), temp.path()).unwrap();
        assert!(entries.iter().all(|e| !e.name.starts_with('.')));
    }

    #[test]
    fn test_break_stops_listing() {
        let temp = create_test_dir();
        let mut seen = 0;
        DirLister::new()
            .list(ListSource::path(temp.path()), &mut |_| {
                seen += 1;
                ControlFlow::Break(())
            })
            .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_errors() {
        let temp = create_test_dir();
        let missing = collect(&DirLister::new(), &temp.path().join("missing"));
        assert!(matches!(missing, Err(ListError::NotFound { .. })));

        let file = collect(&DirLister::new(), &temp.path().join("file1.txt"));
        assert!(matches!(file, Err(ListError::NotADirectory { .. })));

        let handle = File::open(temp.path().join("file1.txt")).unwrap();
        let source = ListSource::from_file(&handle).unwrap();
        let result = DirLister::new().list(source, &mut |_| ControlFlow::Continue(()));
        assert!(matches!(result, Err(ListError::UnsupportedSource { .. })));
    }

    #[test]
    fn test_vanished_entries_are_skipped() {
        let temp = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            File::create(temp.path().join(name)).unwrap();
        }

        let mut names = Vec::new();
        DirLister::new()
            .list(ListSource::path(temp.path()), &mut |entry| {
                if entry.name.as_str() == "a" {
                    fs::remove_file(temp.path().join("b")).unwrap();
                    fs::remove_file(temp.path().join("c")).unwrap();
                }
                names.push(entry.name.to_string());
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(names, ["a"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_listed() {
        let temp = TempDir::new().unwrap();
        std::os::unix::fs::symlink(temp.path().join("missing"), temp.path().join("dangling")).unwrap();

        let entries = collect(&DirLister::new(), temp.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].declared_type, EntryType::Symlink);
        assert_eq!(entries[0].attributes.unwrap().kind(), EntryType::Symlink);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_keeps_declared_type() {
        let temp = create_test_dir();
        std::os::unix::fs::symlink(temp.path().join("subdir"), temp.path().join("link")).unwrap();

        let entries = collect(&DirLister::new(), temp.path()).unwrap();
        let link = entries.iter().find(|e| e.name.as_str() == "link").unwrap();
        assert_eq!(link.declared_type, EntryType::Symlink);
        assert_eq!(link.attributes.unwrap().kind(), EntryType::Directory);
    }
}
