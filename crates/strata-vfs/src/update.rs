//! Applying live per-file changes to a flat tree.

use std::fs;
use std::path::Path;

use tracing::trace;

use strata_core::{Attributes, DirEntry, EntryType, FlatTree};
use strata_monitor::MonitorEvent;

/// Stat `name` inside `dir` from scratch.
///
/// The declared type comes from `lstat`; attributes follow links when
/// `follow_symlinks` is set and the target exists.
pub(crate) fn stat_entry(dir: &Path, name: &str, follow_symlinks: bool) -> Option<DirEntry> {
    let path = dir.join(name);
    let link = fs::symlink_metadata(&path).ok()?;
    let declared_type = EntryType::from_file_type(link.file_type());
    let metadata = if follow_symlinks {
        fs::metadata(&path).ok()
    } else {
        None
    }
    .unwrap_or(link);

    Some(DirEntry::new(name, declared_type).with_attributes(Attributes::from_metadata(&metadata)))
}

/// Created or modified: take a fresh stat, replacing what the tree knew.
/// A failed stat means the entry is gone.
fn upsert(tree: &mut FlatTree, dir: &Path, name: &str, follow_symlinks: bool) {
    match stat_entry(dir, name, follow_symlinks) {
        Some(fresh) => match tree.find_mut(name) {
            Some(existing) => {
                existing.declared_type = fresh.declared_type;
                existing.attributes = fresh.attributes;
            }
            None => {
                tree.add_entry(fresh);
            }
        },
        None => {
            tree.remove(name);
        }
    }
}

/// Apply one monitor event to `tree`, the listing of `dir`.
pub(crate) fn apply_change(tree: &mut FlatTree, dir: &Path, change: &MonitorEvent, follow_symlinks: bool) {
    trace!(?change, "applying live change");
    match change {
        MonitorEvent::FileCreated(name) | MonitorEvent::FileModified(name) => {
            upsert(tree, dir, name, follow_symlinks);
        }
        MonitorEvent::FileDeleted(name) => {
            tree.remove(name);
        }
        MonitorEvent::FileRenamed { from, to } => {
            // a rename over an existing entry replaces it
            if from != to {
                tree.remove(to);
            }
            // unknown source: the target is treated as created
            tree.rename(from, to);
            upsert(tree, dir, to, follow_symlinks);
        }
        MonitorEvent::DirModified
        | MonitorEvent::DirDeleted
        | MonitorEvent::EventsBegin
        | MonitorEvent::EventsEnd => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree_of(dir: &Path, names: &[&str]) -> FlatTree {
        let mut tree = FlatTree::new();
        for name in names {
            tree.add_entry(stat_entry(dir, name, true).unwrap());
        }
        tree
    }

    #[test]
    fn test_create_modify_delete() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b"), "b").unwrap();
        let mut tree = tree_of(temp.path(), &["b"]);

        fs::write(temp.path().join("a"), "aaa").unwrap();
        fs::remove_file(temp.path().join("b")).unwrap();

        apply_change(&mut tree, temp.path(), &MonitorEvent::FileCreated("a".into()), true);
        apply_change(&mut tree, temp.path(), &MonitorEvent::FileModified("a".into()), true);
        apply_change(&mut tree, temp.path(), &MonitorEvent::FileDeleted("b".into()), true);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get_entries("a").len(), 1);
        assert_eq!(tree.get_entry("a").unwrap().size(), 3);
        assert!(tree.get_entry("b").is_none());
    }

    #[test]
    fn test_created_but_already_gone() {
        let temp = TempDir::new().unwrap();
        let mut tree = FlatTree::new();
        apply_change(&mut tree, temp.path(), &MonitorEvent::FileCreated("ghost".into()), true);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_rename_relocates_or_creates() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("old"), "1").unwrap();
        let mut tree = tree_of(temp.path(), &["old"]);
        let inode = tree.get_entry("old").unwrap().attributes.unwrap().inode;

        fs::rename(temp.path().join("old"), temp.path().join("new")).unwrap();
        let rename = MonitorEvent::FileRenamed {
            from: "old".into(),
            to: "new".into(),
        };
        apply_change(&mut tree, temp.path(), &rename, true);
        assert!(tree.get_entry("old").is_none());
        assert_eq!(tree.get_entry("new").unwrap().attributes.unwrap().inode, inode);

        // unknown source: treated as a creation of the target
        fs::write(temp.path().join("other"), "2").unwrap();
        let rename = MonitorEvent::FileRenamed {
            from: "missing".into(),
            to: "other".into(),
        };
        apply_change(&mut tree, temp.path(), &rename, true);
        assert_eq!(tree.len(), 2);
    }
}
