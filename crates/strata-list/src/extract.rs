//! Streaming a single member out of an archive.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::debug;

use strata_core::{ListError, path};

use crate::archive::{ArchiveFormat, tar_reader, zip_member_name};
use crate::recovery::{Copied, CopyError, Recovery, copy_blocks};

/// Copy the member at `subpath` of `archive` into `out`, `block_size`
/// bytes at a time.
///
/// Returns the number of bytes written. A strategy that skips the member
/// ends the copy early without an error.
pub fn extract_entry(
    archive: &Path,
    format: ArchiveFormat,
    subpath: &str,
    out: &mut dyn Write,
    block_size: usize,
    recovery: &mut dyn Recovery,
) -> Result<u64, ListError> {
    let wanted = path::canonicalize(subpath);
    let file = File::open(archive).map_err(|e| ListError::io(archive, e))?;

    let copied = match format {
        ArchiveFormat::Zip => {
            let mut zip = zip::ZipArchive::new(file).map_err(|e| ListError::archive(archive, e))?;
            let index = (0..zip.len())
                .find(|&i| {
                    zip.name_for_index(i)
                        .is_some_and(|name| path::canonicalize(&zip_member_name(name)) == wanted)
                })
                .ok_or_else(|| ListError::NotFound {
                    path: archive.join(&wanted),
                })?;

            let mut member = zip
                .by_index(index)
                .map_err(|e| ListError::archive(archive, e))?;
            if member.is_dir() {
                return Err(ListError::archive(archive, format!("{wanted} is not a regular file")));
            }
            let total = member.size();
            stream(archive, &wanted, &mut member, out, total, block_size, recovery)?
        }
        _ => {
            let mut tar = tar::Archive::new(tar_reader(format, file));
            let entries = tar.entries().map_err(|e| ListError::archive(archive, e))?;

            let mut found = None;
            for entry in entries {
                let entry = entry.map_err(|e| ListError::archive(archive, e))?;
                let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
                if path::canonicalize(&name) == wanted {
                    found = Some(entry);
                    break;
                }
            }
            let mut member = found.ok_or_else(|| ListError::NotFound {
                path: archive.join(&wanted),
            })?;
            if !member.header().entry_type().is_file() {
                return Err(ListError::archive(archive, format!("{wanted} is not a regular file")));
            }
            let total = member.size();
            stream(archive, &wanted, &mut member, out, total, block_size, recovery)?
        }
    };

    debug!(archive = %archive.display(), member = %wanted, bytes = copied, "member extracted");
    Ok(copied)
}

fn stream(
    archive: &Path,
    name: &str,
    reader: &mut dyn Read,
    out: &mut dyn Write,
    total: u64,
    block_size: usize,
    recovery: &mut dyn Recovery,
) -> Result<u64, ListError> {
    match copy_blocks(name, reader, out, total, block_size, recovery) {
        Ok(Copied::Complete(bytes) | Copied::Skipped(bytes)) => Ok(bytes),
        Err(CopyError::Read(e)) => Err(ListError::archive(archive, e)),
        Err(CopyError::Write(e)) => Err(ListError::Io {
            path: archive.join(name),
            source: e,
        }),
        Err(CopyError::Aborted) => Err(ListError::Aborted),
    }
}
