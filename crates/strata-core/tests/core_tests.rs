use strata_core::path::{canonicalize, file_name, parent_subpath};
use strata_core::{ArchiveTree, Attributes, DirEntry, DirTree, EntryType, FlatTree};

fn dir_with_inode(path: &str, inode: u64) -> DirEntry {
    DirEntry::new(path, EntryType::Directory).with_attributes(Attributes {
        inode,
        mode: 0o040755,
        ..Attributes::default()
    })
}

fn file(path: &str) -> DirEntry {
    DirEntry::new(path, EntryType::Regular)
}

#[test]
fn test_inserted_entry_is_reachable_by_path_and_child_map() {
    let paths = ["a.txt", "x/y.txt", "x/y/z.bin", "deep/er/still/leaf"];
    let mut tree = ArchiveTree::new();

    for path in paths {
        tree.add_entry(file(path));
        let id = tree.get_entry_id(path).expect("entry stored");
        assert_eq!(tree.get_entry(path).unwrap().canonical_subpath, path);

        let parent = tree.subpath_dir(parent_subpath(path)).expect("parent map");
        assert!(parent.contains(file_name(path), id));
    }
}

#[test]
fn test_canonicalize_is_idempotent() {
    for input in ["a/b/../c", "./x/./y/", "../../a", "a/../..", "", "///"] {
        let once = canonicalize(input);
        assert_eq!(canonicalize(&once), once);
    }
}

#[test]
fn test_explicit_directory_replaces_placeholder() {
    let mut tree = ArchiveTree::new();
    tree.add_entry(file("pkg/lib.rs"));
    let placeholder = tree.get_entry_id("pkg").unwrap();
    assert!(tree.is_placeholder(placeholder));

    tree.add_entry(dir_with_inode("pkg", 42));

    let entries = tree.get_entries("pkg");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].attributes.unwrap().inode, 42);
    // same slot, now explicit
    assert_eq!(tree.get_entry_id("pkg"), Some(placeholder));
    assert!(!tree.is_placeholder(placeholder));
    assert_eq!(tree.subpath_dir("").unwrap().len(), 1);
}

#[test]
fn test_parent_pair_registered_once() {
    let mut tree = ArchiveTree::new();
    tree.add_entry(file("d/one"));
    tree.add_entry(file("d/two"));
    let before = tree.subpath_dir("d").unwrap().len();

    // Each listed file is a new pair; the parent "d" is registered once.
    tree.add_entry(file("d/three"));
    tree.add_entry(file("d/three"));

    let after = tree.subpath_dir("d").unwrap().len();
    assert_eq!(after, before + 2);
    assert_eq!(tree.subpath_dir("").unwrap().len(), 1);
}

#[test]
fn test_archive_scenario_any_order() {
    let orders: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for order in orders {
        let entries = [
            file("foo/bar.txt"),
            file("foo/baz/../baz.txt"),
            dir_with_inode("foo", 100),
        ];
        let mut tree = DirTree::archive();
        for i in order {
            tree.add_entry(entries[i].clone());
        }

        assert_eq!(tree.subpath_dir("foo").unwrap().len(), 2, "order {order:?}");
        assert_eq!(
            tree.get_entry("foo").unwrap().attributes.unwrap().inode,
            100,
            "order {order:?}"
        );
        assert!(tree.get_entry("foo/baz.txt").is_some());
        assert!(tree.subpath_dir("foo/baz").is_none());
    }
}

#[test]
fn test_flat_tree_has_no_hierarchy() {
    let mut tree = DirTree::Flat(FlatTree::new());
    tree.add_entry(DirEntry::new("sub", EntryType::Directory));
    let entry = tree.get_entry("sub").unwrap().clone();

    assert!(!tree.is_subdir(&entry));
    assert!(tree.subpath_dir("").is_none());
    tree.subpath("sub");
    assert!(tree.at_base());
}
