//! Directory entry types.

use std::fs::Metadata;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::path;

/// Handle to an entry stored in a [`DirTree`](crate::DirTree).
///
/// Handles are only meaningful for the tree that issued them (and for
/// clones of that tree, which keep the same slots).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub usize);

/// Type of a file system object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum EntryType {
    #[default]
    Unknown,
    Fifo,
    CharDevice,
    Directory,
    BlockDevice,
    Regular,
    Symlink,
    Socket,
    Whiteout,
    /// The `..` pseudo entry.
    Parent,
}

const S_IFMT: u32 = 0o170000;
const S_IFIFO: u32 = 0o010000;
const S_IFCHR: u32 = 0o020000;
const S_IFDIR: u32 = 0o040000;
const S_IFBLK: u32 = 0o060000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;
const S_IFSOCK: u32 = 0o140000;
const S_IFWHT: u32 = 0o160000;

impl EntryType {
    /// Derive the type from the `S_IFMT` bits of a mode.
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFIFO => Self::Fifo,
            S_IFCHR => Self::CharDevice,
            S_IFDIR => Self::Directory,
            S_IFBLK => Self::BlockDevice,
            S_IFREG => Self::Regular,
            S_IFLNK => Self::Symlink,
            S_IFSOCK => Self::Socket,
            S_IFWHT => Self::Whiteout,
            _ => Self::Unknown,
        }
    }

    /// The `S_IFMT` bits for this type (zero for unknown and pseudo types).
    pub fn mode_bits(self) -> u32 {
        match self {
            Self::Fifo => S_IFIFO,
            Self::CharDevice => S_IFCHR,
            Self::Directory => S_IFDIR,
            Self::BlockDevice => S_IFBLK,
            Self::Regular => S_IFREG,
            Self::Symlink => S_IFLNK,
            Self::Socket => S_IFSOCK,
            Self::Whiteout => S_IFWHT,
            Self::Unknown | Self::Parent => 0,
        }
    }

    /// Map a std file type (not following links).
    pub fn from_file_type(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            return Self::Symlink;
        }
        if file_type.is_dir() {
            return Self::Directory;
        }
        if file_type.is_file() {
            return Self::Regular;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if file_type.is_fifo() {
                return Self::Fifo;
            }
            if file_type.is_char_device() {
                return Self::CharDevice;
            }
            if file_type.is_block_device() {
                return Self::BlockDevice;
            }
            if file_type.is_socket() {
                return Self::Socket;
            }
        }
        Self::Unknown
    }

    /// Check if this is a directory.
    pub fn is_dir(self) -> bool {
        self == Self::Directory
    }
}

/// Raw attributes of an entry, as reported by `stat` or an archive header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Full mode including the `S_IFMT` type bits.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub inode: u64,
    pub device: u64,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            size: 0,
            modified: UNIX_EPOCH,
            mode: 0,
            uid: 0,
            gid: 0,
            inode: 0,
            device: 0,
        }
    }
}

impl Attributes {
    /// Build attributes from file system metadata.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
            mode: get_mode(metadata),
            uid: get_uid(metadata),
            gid: get_gid(metadata),
            inode: get_ino(metadata),
            device: get_dev(metadata),
        }
    }

    /// Type encoded in the mode bits.
    pub fn kind(&self) -> EntryType {
        EntryType::from_mode(self.mode)
    }

    /// Permission bits only.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// One file system object inside a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Subpath exactly as the backend reported it.
    pub original_subpath: String,
    /// Subpath with `.` and `..` resolved.
    pub canonical_subpath: String,
    /// Last component of the canonical subpath.
    pub file_name: CompactString,
    /// The entry's own type; symlinks stay symlinks.
    pub declared_type: EntryType,
    /// Raw attributes, when the backend could provide them.
    pub attributes: Option<Attributes>,
    /// Backend-specific cookie (e.g. the member index inside an archive).
    pub context: Option<u64>,
}

impl DirEntry {
    /// Create an entry from a backend-reported subpath.
    pub fn new(subpath: impl Into<String>, declared_type: EntryType) -> Self {
        let original_subpath = subpath.into();
        let canonical_subpath = path::canonicalize(&original_subpath);
        let file_name = CompactString::new(path::file_name(&canonical_subpath));
        Self {
            original_subpath,
            canonical_subpath,
            file_name,
            declared_type,
            attributes: None,
            context: None,
        }
    }

    /// Attach raw attributes.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Attach a backend cookie.
    pub fn with_context(mut self, context: u64) -> Self {
        self.context = Some(context);
        self
    }

    /// Placeholder for a directory that is only implied by a deeper path.
    pub(crate) fn synthesized_dir(canonical_subpath: &str) -> Self {
        Self::new(canonical_subpath, EntryType::Directory)
    }

    /// Type after following links, if attributes are known.
    pub fn resolved_type(&self) -> EntryType {
        match self.attributes {
            Some(attr) if attr.kind() != EntryType::Unknown => attr.kind(),
            _ => self.declared_type,
        }
    }

    /// Check if the entry resolves to a directory.
    pub fn is_dir(&self) -> bool {
        self.resolved_type().is_dir()
    }

    /// Size in bytes, zero when attributes are missing.
    pub fn size(&self) -> u64 {
        self.attributes.map(|a| a.size).unwrap_or(0)
    }

    /// Move the entry to a new subpath, keeping type and attributes.
    pub fn relocate(&mut self, subpath: impl Into<String>) {
        let original_subpath = subpath.into();
        self.canonical_subpath = path::canonicalize(&original_subpath);
        self.file_name = CompactString::new(path::file_name(&self.canonical_subpath));
        self.original_subpath = original_subpath;
    }
}

// Cross-platform metadata helpers

#[cfg(unix)]
fn get_mode(metadata: &Metadata) -> u32 {
    metadata.mode()
}

#[cfg(not(unix))]
fn get_mode(metadata: &Metadata) -> u32 {
    let kind = if metadata.is_dir() {
        EntryType::Directory
    } else if metadata.is_symlink() {
        EntryType::Symlink
    } else {
        EntryType::Regular
    };
    let perms = if metadata.permissions().readonly() { 0o444 } else { 0o644 };
    kind.mode_bits() | perms
}

#[cfg(unix)]
fn get_uid(metadata: &Metadata) -> u32 {
    metadata.uid()
}

#[cfg(not(unix))]
fn get_uid(_metadata: &Metadata) -> u32 {
    0
}

#[cfg(unix)]
fn get_gid(metadata: &Metadata) -> u32 {
    metadata.gid()
}

#[cfg(not(unix))]
fn get_gid(_metadata: &Metadata) -> u32 {
    0
}

#[cfg(unix)]
fn get_ino(metadata: &Metadata) -> u64 {
    metadata.ino()
}

#[cfg(not(unix))]
fn get_ino(_metadata: &Metadata) -> u64 {
    0
}

#[cfg(unix)]
fn get_dev(metadata: &Metadata) -> u64 {
    metadata.dev()
}

#[cfg(not(unix))]
fn get_dev(_metadata: &Metadata) -> u64 {
    0
}
