//! Directory trees.
//!
//! A [`DirTree`] is either a [`FlatTree`], the listing of one plain
//! directory, or an [`ArchiveTree`], which builds a navigable hierarchy out
//! of the flat and possibly duplicated member list of an archive.

use std::collections::{HashMap, HashSet};

use compact_str::CompactString;
use indexmap::IndexSet;

use crate::entry::{DirEntry, EntryId};
use crate::path;

/// Slot storage plus a multi-valued `subpath -> entries` index.
#[derive(Debug, Clone, Default, PartialEq)]
struct EntryIndex {
    slots: Vec<Option<DirEntry>>,
    by_path: HashMap<String, Vec<EntryId>>,
    live: usize,
}

impl EntryIndex {
    fn insert(&mut self, entry: DirEntry) -> EntryId {
        let id = EntryId(self.slots.len());
        self.by_path
            .entry(entry.canonical_subpath.clone())
            .or_default()
            .push(id);
        self.slots.push(Some(entry));
        self.live += 1;
        id
    }

    /// Overwrite the entry in `id`'s slot. Both entries must share a subpath.
    fn replace(&mut self, id: EntryId, entry: DirEntry) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            debug_assert!(
                slot.as_ref()
                    .is_some_and(|old| old.canonical_subpath == entry.canonical_subpath)
            );
            *slot = Some(entry);
        }
    }

    fn get(&self, id: EntryId) -> Option<&DirEntry> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: EntryId) -> Option<&mut DirEntry> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    fn ids(&self, subpath: &str) -> &[EntryId] {
        self.by_path.get(subpath).map(Vec::as_slice).unwrap_or(&[])
    }

    fn remove(&mut self, id: EntryId) -> Option<DirEntry> {
        let entry = self.slots.get_mut(id.0)?.take()?;
        self.unlink(&entry.canonical_subpath, id);
        self.live -= 1;
        Some(entry)
    }

    fn unlink(&mut self, subpath: &str, id: EntryId) {
        if let Some(ids) = self.by_path.get_mut(subpath) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_path.remove(subpath);
            }
        }
    }

    /// Re-key an entry after its subpath changed.
    fn relink(&mut self, id: EntryId, old_subpath: &str) {
        let Some(new_subpath) = self.get(id).map(|e| e.canonical_subpath.clone()) else {
            return;
        };
        self.unlink(old_subpath, id);
        self.by_path.entry(new_subpath).or_default().push(id);
    }

    fn iter(&self) -> impl Iterator<Item = (EntryId, &DirEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (EntryId(i), e)))
    }
}

/// Children of one directory level: `(name, entry)` pairs in discovery order.
///
/// Names may repeat (archives can hold duplicates); a given pair is stored
/// at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildMap {
    children: IndexSet<(CompactString, EntryId)>,
}

impl ChildMap {
    /// Number of registered `(name, entry)` pairs.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Iterate over `(name, entry)` pairs in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, EntryId)> {
        self.children.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// First entry registered under `name`.
    pub fn get(&self, name: &str) -> Option<EntryId> {
        self.iter().find(|(n, _)| *n == name).map(|(_, id)| id)
    }

    /// Every entry registered under `name`.
    pub fn get_all(&self, name: &str) -> Vec<EntryId> {
        self.iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, id)| id)
            .collect()
    }

    /// Check if the exact pair is registered.
    pub fn contains(&self, name: &str, id: EntryId) -> bool {
        self.children.contains(&(CompactString::new(name), id))
    }

    fn insert(&mut self, name: &str, id: EntryId) -> bool {
        self.children.insert((CompactString::new(name), id))
    }
}

/// Listing of a single directory, keyed by file name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatTree {
    index: EntryIndex,
}

impl FlatTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. Duplicates are kept side by side.
    pub fn add_entry(&mut self, entry: DirEntry) -> EntryId {
        self.index.insert(entry)
    }

    pub fn get_entry_id(&self, name: &str) -> Option<EntryId> {
        self.index.ids(&path::canonicalize(name)).first().copied()
    }

    pub fn get_entry(&self, name: &str) -> Option<&DirEntry> {
        self.get_entry_id(name).and_then(|id| self.index.get(id))
    }

    pub fn get_entries(&self, name: &str) -> Vec<&DirEntry> {
        self.index
            .ids(&path::canonicalize(name))
            .iter()
            .filter_map(|id| self.index.get(*id))
            .collect()
    }

    /// Mutable access to the first entry named `name`.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut DirEntry> {
        let id = self.get_entry_id(name)?;
        self.index.get_mut(id)
    }

    /// Remove every entry named `name`, returning how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let ids = self.index.ids(&path::canonicalize(name)).to_vec();
        ids.into_iter()
            .filter(|id| self.index.remove(*id).is_some())
            .count()
    }

    /// Move the first entry named `old` to `new`. Returns `false` if no
    /// entry exists under `old`.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        let Some(id) = self.get_entry_id(old) else {
            return false;
        };
        let old_subpath = match self.index.get_mut(id) {
            Some(entry) => {
                let old_subpath = entry.canonical_subpath.clone();
                entry.relocate(new);
                old_subpath
            }
            None => return false,
        };
        self.index.relink(id, &old_subpath);
        true
    }

    pub fn len(&self) -> usize {
        self.index.live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &DirEntry)> {
        self.index.iter()
    }
}

/// Hierarchy synthesized from archive member paths.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveTree {
    index: EntryIndex,
    dirs: HashMap<String, ChildMap>,
    placeholders: HashSet<EntryId>,
    current: String,
}

impl Default for ArchiveTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveTree {
    pub fn new() -> Self {
        let mut dirs = HashMap::new();
        dirs.insert(String::new(), ChildMap::default());
        Self {
            index: EntryIndex::default(),
            dirs,
            placeholders: HashSet::new(),
            current: String::new(),
        }
    }

    /// Insert an entry, synthesizing every missing ancestor directory.
    ///
    /// Returns the handle of the first newly registered child of the current
    /// subpath touched by this call, or `None` if the insertion is not
    /// visible from the cursor.
    pub fn add_entry(&mut self, entry: DirEntry) -> Option<EntryId> {
        let canonical = entry.canonical_subpath.clone();
        let parts: Vec<&str> = path::components(&canonical).collect();
        let last = parts.len().checked_sub(1)?;

        let mut entry = Some(entry);
        let mut direct_child = None;
        let mut parent = String::new();

        for (i, name) in parts.iter().enumerate() {
            let subpath = path::join_subpath(&parent, name);
            let id = if i == last {
                let entry = entry.take()?;
                if entry.is_dir() {
                    self.insert_directory(entry)
                } else {
                    self.index.insert(entry)
                }
            } else {
                self.ensure_directory(&subpath)
            };

            let registered = self.dirs.entry(parent.clone()).or_default().insert(name, id);
            if registered && direct_child.is_none() && parent == self.current {
                direct_child = Some(id);
            }
            parent = subpath;
        }

        direct_child
    }

    /// First directory entry stored at `subpath`.
    fn find_directory(&self, subpath: &str) -> Option<EntryId> {
        self.index
            .ids(subpath)
            .iter()
            .copied()
            .find(|id| self.index.get(*id).is_some_and(DirEntry::is_dir))
    }

    /// Reuse the directory at `subpath` or synthesize a placeholder for it.
    fn ensure_directory(&mut self, subpath: &str) -> EntryId {
        let id = match self.find_directory(subpath) {
            Some(id) => id,
            None => {
                let id = self.index.insert(DirEntry::synthesized_dir(subpath));
                self.placeholders.insert(id);
                id
            }
        };
        self.dirs.entry(subpath.to_string()).or_default();
        id
    }

    /// Store an explicitly listed directory, replacing a placeholder in place.
    fn insert_directory(&mut self, entry: DirEntry) -> EntryId {
        let subpath = entry.canonical_subpath.clone();
        let placeholder = self
            .index
            .ids(&subpath)
            .iter()
            .copied()
            .find(|id| self.placeholders.contains(id));

        let id = match placeholder {
            Some(id) => {
                self.index.replace(id, entry);
                self.placeholders.remove(&id);
                id
            }
            None => self.index.insert(entry),
        };
        self.dirs.entry(subpath).or_default();
        id
    }

    fn resolve(&self, name: &str) -> String {
        path::canonicalize(&path::join_subpath(&self.current, name))
    }

    pub fn get_entry_id(&self, name: &str) -> Option<EntryId> {
        self.index.ids(&self.resolve(name)).first().copied()
    }

    pub fn get_entry(&self, name: &str) -> Option<&DirEntry> {
        self.get_entry_id(name).and_then(|id| self.index.get(id))
    }

    pub fn get_entries(&self, name: &str) -> Vec<&DirEntry> {
        self.index
            .ids(&self.resolve(name))
            .iter()
            .filter_map(|id| self.index.get(*id))
            .collect()
    }

    /// Move the cursor. The caller validates with [`Self::subpath_dir`].
    pub fn subpath(&mut self, subpath: &str) {
        self.current = path::canonicalize(subpath);
    }

    pub fn current_subpath(&self) -> &str {
        &self.current
    }

    pub fn subpath_dir(&self, subpath: &str) -> Option<&ChildMap> {
        self.dirs.get(&path::canonicalize(subpath))
    }

    /// A directory entry whose contents have been observed.
    pub fn is_subdir(&self, entry: &DirEntry) -> bool {
        entry.is_dir() && self.dirs.contains_key(&entry.canonical_subpath)
    }

    /// Check if the entry at `id` is a synthesized placeholder.
    pub fn is_placeholder(&self, id: EntryId) -> bool {
        self.placeholders.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.index.live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &DirEntry)> {
        self.index.iter()
    }
}

/// A directory tree of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DirTree {
    Flat(FlatTree),
    Archive(ArchiveTree),
}

impl Default for DirTree {
    fn default() -> Self {
        Self::Flat(FlatTree::default())
    }
}

impl DirTree {
    pub fn flat() -> Self {
        Self::Flat(FlatTree::new())
    }

    pub fn archive() -> Self {
        Self::Archive(ArchiveTree::new())
    }

    /// Insert an entry.
    ///
    /// A flat tree always returns the stored handle; an archive tree only
    /// returns it for a newly registered direct child of the cursor.
    pub fn add_entry(&mut self, entry: DirEntry) -> Option<EntryId> {
        match self {
            Self::Flat(tree) => Some(tree.add_entry(entry)),
            Self::Archive(tree) => tree.add_entry(entry),
        }
    }

    pub fn entry(&self, id: EntryId) -> Option<&DirEntry> {
        match self {
            Self::Flat(tree) => tree.index.get(id),
            Self::Archive(tree) => tree.index.get(id),
        }
    }

    pub fn get_entry_id(&self, name: &str) -> Option<EntryId> {
        match self {
            Self::Flat(tree) => tree.get_entry_id(name),
            Self::Archive(tree) => tree.get_entry_id(name),
        }
    }

    pub fn get_entry(&self, name: &str) -> Option<&DirEntry> {
        match self {
            Self::Flat(tree) => tree.get_entry(name),
            Self::Archive(tree) => tree.get_entry(name),
        }
    }

    pub fn get_entries(&self, name: &str) -> Vec<&DirEntry> {
        match self {
            Self::Flat(tree) => tree.get_entries(name),
            Self::Archive(tree) => tree.get_entries(name),
        }
    }

    /// Move the cursor. Flat trees have no hierarchy and ignore this.
    pub fn subpath(&mut self, subpath: &str) {
        if let Self::Archive(tree) = self {
            tree.subpath(subpath);
        }
    }

    pub fn current_subpath(&self) -> &str {
        match self {
            Self::Flat(_) => "",
            Self::Archive(tree) => tree.current_subpath(),
        }
    }

    pub fn subpath_dir(&self, subpath: &str) -> Option<&ChildMap> {
        match self {
            Self::Flat(_) => None,
            Self::Archive(tree) => tree.subpath_dir(subpath),
        }
    }

    pub fn is_subdir(&self, entry: &DirEntry) -> bool {
        match self {
            Self::Flat(_) => false,
            Self::Archive(tree) => tree.is_subdir(entry),
        }
    }

    pub fn at_base(&self) -> bool {
        self.current_subpath().is_empty()
    }

    /// Entries shown at the cursor: everything for a flat tree, the
    /// children of the current subpath for an archive tree.
    pub fn visible_entries(&self) -> Vec<&DirEntry> {
        match self {
            Self::Flat(tree) => tree.iter().map(|(_, e)| e).collect(),
            Self::Archive(tree) => tree
                .subpath_dir(&tree.current)
                .map(|dir| dir.iter().filter_map(|(_, id)| tree.index.get(id)).collect())
                .unwrap_or_default(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Flat(tree) => tree.len(),
            Self::Archive(tree) => tree.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Archive(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Attributes, EntryType};

    fn file(path: &str) -> DirEntry {
        DirEntry::new(path, EntryType::Regular)
    }

    #[test]
    fn test_flat_duplicates_are_additive() {
        let mut tree = FlatTree::new();
        let a = tree.add_entry(file("x"));
        let b = tree.add_entry(file("x"));
        assert_ne!(a, b);
        assert_eq!(tree.get_entries("x").len(), 2);
        assert_eq!(tree.get_entry_id("x"), Some(a));
    }

    #[test]
    fn test_flat_rename_and_remove() {
        let mut tree = FlatTree::new();
        tree.add_entry(file("a"));
        tree.add_entry(file("b"));

        assert!(tree.rename("a", "c"));
        assert!(tree.get_entry("a").is_none());
        assert_eq!(tree.get_entry("c").unwrap().file_name.as_str(), "c");
        assert!(!tree.rename("missing", "d"));

        assert_eq!(tree.remove("b"), 1);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_archive_synthesizes_parents() {
        let mut tree = ArchiveTree::new();
        let id = tree.add_entry(file("a/b/c.txt"));
        // "a" is the direct child of the base, not c.txt
        assert_eq!(id, tree.get_entry_id("a"));
        assert!(tree.is_placeholder(tree.get_entry_id("a").unwrap()));
        assert!(tree.subpath_dir("a/b").unwrap().get("c.txt").is_some());
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_archive_direct_child_reported_once() {
        let mut tree = ArchiveTree::new();
        assert!(tree.add_entry(file("a/one")).is_some());
        // "a" already registered at the base
        assert!(tree.add_entry(file("a/two")).is_none());

        tree.subpath("a");
        assert!(tree.add_entry(file("a/three")).is_some());
        assert!(tree.add_entry(file("other")).is_none());
    }

    #[test]
    fn test_archive_placeholder_not_replacing_explicit() {
        let mut tree = ArchiveTree::new();
        let explicit = DirEntry::new("d", EntryType::Directory).with_attributes(Attributes {
            inode: 7,
            mode: 0o040755,
            ..Attributes::default()
        });
        tree.add_entry(explicit);
        tree.add_entry(file("d/f"));

        let entries = tree.get_entries("d");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attributes.unwrap().inode, 7);
    }

    #[test]
    fn test_is_subdir_requires_child_map() {
        let mut tree = ArchiveTree::new();
        tree.add_entry(file("dir/x"));
        let dir = tree.get_entry("dir").unwrap().clone();
        assert!(tree.is_subdir(&dir));

        let stray = DirEntry::new("elsewhere", EntryType::Directory);
        assert!(!tree.is_subdir(&stray));
    }

    #[test]
    fn test_visible_entries_follow_cursor() {
        let mut tree = DirTree::archive();
        tree.add_entry(file("top.txt"));
        tree.add_entry(file("sub/inner.txt"));

        let names: Vec<_> = tree.visible_entries().iter().map(|e| e.file_name.to_string()).collect();
        assert_eq!(names, ["top.txt", "sub"]);

        tree.subpath("sub");
        assert!(!tree.at_base());
        let names: Vec<_> = tree.visible_entries().iter().map(|e| e.file_name.to_string()).collect();
        assert_eq!(names, ["inner.txt"]);
    }
}
