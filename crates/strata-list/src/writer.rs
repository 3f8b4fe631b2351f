//! The write boundary: creating entries in a directory or a new archive.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use jwalk::{Parallelism, WalkDir};
use tracing::{debug, warn};

use strata_core::{DEFAULT_BLOCK_SIZE, WriteError};

use crate::archive::ArchiveFormat;
use crate::recovery::{Copied, CopyError, Recovery, copy_blocks};

/// Validate an entry subpath before anything is written.
///
/// Names are `/`-separated; every component must be a valid file name.
pub fn validate_name(name: &str) -> Result<(), WriteError> {
    if name.is_empty() {
        return Err(WriteError::invalid_name(name, "Name cannot be empty"));
    }
    if name.starts_with('/') {
        return Err(WriteError::invalid_name(name, "Name must be relative"));
    }
    if name.contains('\0') {
        return Err(WriteError::invalid_name(name, "Name cannot contain NUL"));
    }

    for component in name.split('/') {
        if component.is_empty() {
            return Err(WriteError::invalid_name(name, "Name cannot contain empty components"));
        }
        if component == "." || component == ".." {
            return Err(WriteError::invalid_name(name, "'.' and '..' are reserved names"));
        }
        if component.len() > 255 {
            return Err(WriteError::invalid_name(name, "Name is too long (max 255 characters)"));
        }
        if component.starts_with(' ') || component.ends_with(' ') {
            return Err(WriteError::invalid_name(name, "Name cannot start or end with spaces"));
        }
    }

    Ok(())
}

/// Destination that accepts directories and streamed files.
pub trait EntryWriter {
    /// Create a directory (and any missing parents).
    fn create_directory(&mut self, name: &str) -> Result<(), WriteError>;

    /// Stream `reader` into a new file named `name`.
    ///
    /// `size` is the expected length, used for progress only. Returns
    /// `false` if the recovery strategy skipped the file.
    fn create_file(
        &mut self,
        name: &str,
        reader: &mut dyn Read,
        size: u64,
        recovery: &mut dyn Recovery,
    ) -> Result<bool, WriteError>;

    /// Flush and finalize. Further calls fail with [`WriteError::Closed`].
    fn close(&mut self) -> Result<(), WriteError>;
}

/// Open a writer for `output`: an archive if the name carries a known
/// archive extension, a directory otherwise.
pub fn create_writer(output: &Path) -> Result<Box<dyn EntryWriter>, WriteError> {
    match ArchiveFormat::from_path(output) {
        Some(ArchiveFormat::Zip) => Ok(Box::new(ZipWriter::create(output)?)),
        Some(format) => Ok(Box::new(TarWriter::create(output, format)?)),
        None => Ok(Box::new(DirWriter::create(output)?)),
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn copy_error(path: &Path, err: CopyError) -> WriteError {
    match err {
        CopyError::Read(source) | CopyError::Write(source) => WriteError::io(path, source),
        CopyError::Aborted => WriteError::Aborted,
    }
}

/// Writes entries below a directory on disk.
#[derive(Debug)]
pub struct DirWriter {
    root: PathBuf,
    block_size: usize,
    closed: bool,
}

impl DirWriter {
    /// Use `root` as the destination, creating it if needed.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, WriteError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| WriteError::io(&root, e))?;
        Ok(Self {
            root,
            block_size: DEFAULT_BLOCK_SIZE,
            closed: false,
        })
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    fn target(&self, name: &str) -> Result<PathBuf, WriteError> {
        if self.closed {
            return Err(WriteError::Closed);
        }
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

impl EntryWriter for DirWriter {
    fn create_directory(&mut self, name: &str) -> Result<(), WriteError> {
        let path = self.target(name)?;
        fs::create_dir_all(&path).map_err(|e| WriteError::io(&path, e))
    }

    fn create_file(
        &mut self,
        name: &str,
        reader: &mut dyn Read,
        size: u64,
        recovery: &mut dyn Recovery,
    ) -> Result<bool, WriteError> {
        let path = self.target(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| WriteError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| WriteError::io(&path, e))?;

        let result = copy_blocks(name, reader, &mut file, size, self.block_size, recovery);
        drop(file);
        match result {
            Ok(Copied::Complete(_)) => Ok(true),
            Ok(Copied::Skipped(_)) => {
                let _ = fs::remove_file(&path);
                Ok(false)
            }
            Err(err) => {
                let _ = fs::remove_file(&path);
                Err(copy_error(&path, err))
            }
        }
    }

    fn close(&mut self) -> Result<(), WriteError> {
        if self.closed {
            return Err(WriteError::Closed);
        }
        self.closed = true;
        Ok(())
    }
}

/// Output stream of a tar writer, compressed per format.
enum TarStream {
    Plain(File),
    Gz(flate2::write::GzEncoder<File>),
    Xz(xz2::write::XzEncoder<File>),
    Bz2(bzip2::write::BzEncoder<File>),
}

impl TarStream {
    fn new(format: ArchiveFormat, file: File) -> Self {
        match format {
            ArchiveFormat::TarGz => {
                Self::Gz(flate2::write::GzEncoder::new(file, flate2::Compression::default()))
            }
            ArchiveFormat::TarXz => Self::Xz(xz2::write::XzEncoder::new(file, 6)),
            ArchiveFormat::TarBz2 => {
                Self::Bz2(bzip2::write::BzEncoder::new(file, bzip2::Compression::default()))
            }
            ArchiveFormat::Tar | ArchiveFormat::Zip => Self::Plain(file),
        }
    }

    fn finish(self) -> io::Result<File> {
        match self {
            Self::Plain(file) => Ok(file),
            Self::Gz(encoder) => encoder.finish(),
            Self::Xz(encoder) => encoder.finish(),
            Self::Bz2(encoder) => encoder.finish(),
        }
    }
}

impl Write for TarStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Gz(w) => w.write(buf),
            Self::Xz(w) => w.write(buf),
            Self::Bz2(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gz(w) => w.flush(),
            Self::Xz(w) => w.flush(),
            Self::Bz2(w) => w.flush(),
        }
    }
}

/// Writes a new tar archive, optionally compressed.
///
/// File contents are spooled to a temporary file first so a skipped or
/// short read never leaves a header with the wrong size behind.
pub struct TarWriter {
    path: PathBuf,
    builder: Option<tar::Builder<TarStream>>,
    block_size: usize,
}

impl TarWriter {
    pub fn create(path: impl Into<PathBuf>, format: ArchiveFormat) -> Result<Self, WriteError> {
        let path = path.into();
        if !format.is_tar() {
            return Err(WriteError::archive(&path, format!("{format} is not a tar format")));
        }
        let file = File::create(&path).map_err(|e| WriteError::io(&path, e))?;
        Ok(Self {
            builder: Some(tar::Builder::new(TarStream::new(format, file))),
            path,
            block_size: DEFAULT_BLOCK_SIZE,
        })
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    fn builder(&mut self, name: &str) -> Result<&mut tar::Builder<TarStream>, WriteError> {
        validate_name(name)?;
        self.builder.as_mut().ok_or(WriteError::Closed)
    }
}

impl EntryWriter for TarWriter {
    fn create_directory(&mut self, name: &str) -> Result<(), WriteError> {
        let archive = self.path.clone();
        let builder = self.builder(name)?;

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_mtime(now_secs());
        builder
            .append_data(&mut header, format!("{name}/"), io::empty())
            .map_err(|e| WriteError::archive(&archive, e))
    }

    fn create_file(
        &mut self,
        name: &str,
        reader: &mut dyn Read,
        size: u64,
        recovery: &mut dyn Recovery,
    ) -> Result<bool, WriteError> {
        let archive = self.path.clone();
        let block_size = self.block_size;
        let builder = self.builder(name)?;

        let mut spool = tempfile::tempfile().map_err(|e| WriteError::io(&archive, e))?;
        let copied = match copy_blocks(name, reader, &mut spool, size, block_size, recovery) {
            Ok(Copied::Complete(bytes)) => bytes,
            Ok(Copied::Skipped(_)) => return Ok(false),
            Err(err) => return Err(copy_error(&archive.join(name), err)),
        };
        spool
            .seek(SeekFrom::Start(0))
            .map_err(|e| WriteError::io(&archive, e))?;

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(copied);
        header.set_mode(0o644);
        header.set_mtime(now_secs());
        builder
            .append_data(&mut header, name, spool)
            .map_err(|e| WriteError::archive(&archive, e))?;
        Ok(true)
    }

    fn close(&mut self) -> Result<(), WriteError> {
        let builder = self.builder.take().ok_or(WriteError::Closed)?;
        let stream = builder
            .into_inner()
            .map_err(|e| WriteError::archive(&self.path, e))?;
        stream
            .finish()
            .map_err(|e| WriteError::io(&self.path, e))?;
        debug!(path = %self.path.display(), "tar archive written");
        Ok(())
    }
}

impl std::fmt::Debug for TarWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TarWriter")
            .field("path", &self.path)
            .field("closed", &self.builder.is_none())
            .finish()
    }
}

/// Writes a new zip archive.
pub struct ZipWriter {
    path: PathBuf,
    zip: Option<zip::ZipWriter<File>>,
    block_size: usize,
}

impl ZipWriter {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, WriteError> {
        let path = path.into();
        let file = File::create(&path).map_err(|e| WriteError::io(&path, e))?;
        Ok(Self {
            zip: Some(zip::ZipWriter::new(file)),
            path,
            block_size: DEFAULT_BLOCK_SIZE,
        })
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    fn zip(&mut self, name: &str) -> Result<&mut zip::ZipWriter<File>, WriteError> {
        validate_name(name)?;
        self.zip.as_mut().ok_or(WriteError::Closed)
    }
}

impl EntryWriter for ZipWriter {
    fn create_directory(&mut self, name: &str) -> Result<(), WriteError> {
        let archive = self.path.clone();
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        self.zip(name)?
            .add_directory(format!("{name}/"), options)
            .map_err(|e| WriteError::archive(&archive, e))
    }

    fn create_file(
        &mut self,
        name: &str,
        reader: &mut dyn Read,
        size: u64,
        recovery: &mut dyn Recovery,
    ) -> Result<bool, WriteError> {
        let archive = self.path.clone();
        let block_size = self.block_size;
        let zip = self.zip(name)?;

        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
        zip.start_file(name, options)
            .map_err(|e| WriteError::archive(&archive, e))?;

        match copy_blocks(name, reader, &mut *zip, size, block_size, recovery) {
            Ok(Copied::Complete(_)) => Ok(true),
            Ok(Copied::Skipped(_)) => {
                zip.abort_file().map_err(|e| WriteError::archive(&archive, e))?;
                Ok(false)
            }
            Err(err) => {
                if let Err(abort_err) = zip.abort_file() {
                    warn!(error = %abort_err, "failed to drop partial zip member");
                }
                Err(copy_error(&archive.join(name), err))
            }
        }
    }

    fn close(&mut self) -> Result<(), WriteError> {
        let zip = self.zip.take().ok_or(WriteError::Closed)?;
        zip.finish().map_err(|e| WriteError::archive(&self.path, e))?;
        debug!(path = %self.path.display(), "zip archive written");
        Ok(())
    }
}

impl std::fmt::Debug for ZipWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipWriter")
            .field("path", &self.path)
            .field("closed", &self.zip.is_none())
            .finish()
    }
}

/// Write the contents of `source` (recursively, in name order) into
/// `writer`. Returns the number of entries written. Symlinks and special
/// files are skipped.
pub fn copy_tree(
    source: &Path,
    writer: &mut dyn EntryWriter,
    recovery: &mut dyn Recovery,
) -> Result<usize, WriteError> {
    let walker = WalkDir::new(source)
        .parallelism(Parallelism::Serial)
        .skip_hidden(false)
        .follow_links(false)
        .sort(true)
        .min_depth(1);

    let mut written = 0;
    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };

        let path = entry.path();
        let Ok(relative) = path.strip_prefix(source) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let file_type = entry.file_type();
        if file_type.is_dir() {
            writer.create_directory(&name)?;
        } else if file_type.is_file() {
            let mut file = File::open(&path).map_err(|e| WriteError::io(&path, e))?;
            let size = file.metadata().map(|m| m.len()).unwrap_or(0);
            if !writer.create_file(&name, &mut file, size, recovery)? {
                continue;
            }
        } else {
            debug!(path = %path.display(), "skipping non-regular entry");
            continue;
        }
        written += 1;
    }

    Ok(written)
}
