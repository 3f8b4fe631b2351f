//! Lister for archive containers.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use tracing::debug;

use strata_core::{Attributes, EntryType, ListError};

use crate::lister::{ListSource, ListedEntry, Lister};

/// Container formats the archive backend understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarXz,
    TarBz2,
}

impl ArchiveFormat {
    /// Detect the format from a file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
            Some(Self::TarBz2)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    pub fn is_tar(self) -> bool {
        !matches!(self, Self::Zip)
    }
}

/// Wrap a tar stream in the decompressor its format needs.
pub(crate) fn tar_reader(format: ArchiveFormat, file: File) -> Box<dyn Read> {
    match format {
        ArchiveFormat::TarGz => Box::new(flate2::read::GzDecoder::new(file)),
        ArchiveFormat::TarXz => Box::new(xz2::read::XzDecoder::new(file)),
        ArchiveFormat::TarBz2 => Box::new(bzip2::read::BzDecoder::new(file)),
        ArchiveFormat::Tar | ArchiveFormat::Zip => Box::new(file),
    }
}

/// Open a source as a file positioned at its start.
pub(crate) fn open_source(source: ListSource) -> Result<(File, PathBuf), ListError> {
    let path = source.display_path().to_path_buf();
    match source {
        ListSource::Path(_) => {
            let file = File::open(&path).map_err(|e| ListError::io(&path, e))?;
            if file.metadata().map(|m| m.is_dir()).unwrap_or(false) {
                return Err(ListError::UnsupportedSource {
                    message: format!("{} is a directory, not an archive", path.display()),
                });
            }
            Ok((file, path))
        }
        ListSource::File(mut file) => {
            file.seek(SeekFrom::Start(0))
                .map_err(|e| ListError::io(&path, e))?;
            Ok((file, path))
        }
    }
}

/// Type of a zip member: explicit directory flag first, then the unix mode.
pub(crate) fn zip_entry_type(is_dir: bool, unix_mode: Option<u32>) -> EntryType {
    if is_dir {
        return EntryType::Directory;
    }
    match unix_mode.map(EntryType::from_mode) {
        Some(EntryType::Unknown) | None => EntryType::Regular,
        Some(kind) => kind,
    }
}

pub(crate) fn tar_entry_type(kind: tar::EntryType) -> EntryType {
    if kind.is_dir() {
        EntryType::Directory
    } else if kind.is_symlink() {
        EntryType::Symlink
    } else if kind.is_character_special() {
        EntryType::CharDevice
    } else if kind.is_block_special() {
        EntryType::BlockDevice
    } else if kind.is_fifo() {
        EntryType::Fifo
    } else {
        EntryType::Regular
    }
}

/// Zip member names may use backslashes when written on Windows.
pub(crate) fn zip_member_name(raw: &str) -> String {
    raw.replace('\\', "/")
}

/// Lists every member of an archive, in archive order.
///
/// Member names are reported as full subpaths; building the hierarchy is
/// left to [`ArchiveTree`](strata_core::ArchiveTree).
#[derive(Debug, Clone, Copy)]
pub struct ArchiveLister {
    format: ArchiveFormat,
}

impl ArchiveLister {
    pub fn new(format: ArchiveFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    fn list_zip(
        &self,
        file: File,
        path: &Path,
        visit: &mut dyn FnMut(ListedEntry) -> ControlFlow<()>,
    ) -> Result<(), ListError> {
        let mut archive = zip::ZipArchive::new(file).map_err(|e| ListError::archive(path, e))?;

        for index in 0..archive.len() {
            let member = archive
                .by_index(index)
                .map_err(|e| ListError::archive(path, e))?;

            let declared_type = zip_entry_type(member.is_dir(), member.unix_mode());
            let default_permissions = if declared_type.is_dir() { 0o755 } else { 0o644 };
            let permissions = member
                .unix_mode()
                .map_or(default_permissions, |mode| mode & 0o7777);
            let attributes = Attributes {
                size: member.size(),
                mode: declared_type.mode_bits() | permissions,
                ..Attributes::default()
            };

            let listed = ListedEntry::new(zip_member_name(member.name()), declared_type)
                .with_attributes(attributes)
                .with_context(index as u64);
            if visit(listed).is_break() {
                return Ok(());
            }
        }

        debug!(path = %path.display(), members = archive.len(), "zip archive listed");
        Ok(())
    }

    fn list_tar(
        &self,
        file: File,
        path: &Path,
        visit: &mut dyn FnMut(ListedEntry) -> ControlFlow<()>,
    ) -> Result<(), ListError> {
        let mut archive = tar::Archive::new(tar_reader(self.format, file));
        let entries = archive.entries().map_err(|e| ListError::archive(path, e))?;

        let mut count = 0u64;
        for (index, entry) in entries.enumerate() {
            let entry = entry.map_err(|e| ListError::archive(path, e))?;
            let header = entry.header();
            let kind = header.entry_type();
            if kind.is_pax_global_extensions() {
                continue;
            }

            let declared_type = tar_entry_type(kind);
            let attributes = Attributes {
                size: entry.size(),
                modified: UNIX_EPOCH + Duration::from_secs(header.mtime().unwrap_or(0)),
                mode: declared_type.mode_bits() | (header.mode().unwrap_or(0o644) & 0o7777),
                uid: header.uid().unwrap_or(0) as u32,
                gid: header.gid().unwrap_or(0) as u32,
                ..Attributes::default()
            };
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

            count += 1;
            let listed = ListedEntry::new(name, declared_type)
                .with_attributes(attributes)
                .with_context(index as u64);
            if visit(listed).is_break() {
                return Ok(());
            }
        }

        debug!(path = %path.display(), members = count, format = %self.format, "tar archive listed");
        Ok(())
    }
}

impl Lister for ArchiveLister {
    fn list(
        &self,
        source: ListSource,
        visit: &mut dyn FnMut(ListedEntry) -> ControlFlow<()>,
    ) -> Result<(), ListError> {
        let (file, path) = open_source(source)?;
        match self.format {
            ArchiveFormat::Zip => self.list_zip(file, &path, visit),
            _ => self.list_tar(file, &path, visit),
        }
    }
}
