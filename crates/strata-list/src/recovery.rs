//! Progress reporting and error recovery for byte streaming.
//!
//! Every operation that moves file contents takes a [`Recovery`] strategy
//! explicitly. The strategy sees each entry start, each copied block and
//! each failure, and decides how the operation goes on.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use tracing::trace;

/// An event reported while streaming one entry.
#[derive(Debug)]
pub enum Progress<'a> {
    /// An entry is about to be copied. `size` may be zero if unknown.
    EntryStarted { name: &'a str, size: u64 },
    /// A block was copied.
    Block { name: &'a str, done: u64, total: u64 },
    /// Reading the entry failed.
    Error { name: &'a str, error: &'a io::Error },
    /// The entry was copied completely.
    EntryFinished { name: &'a str, bytes: u64 },
}

/// What the operation should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Action {
    #[default]
    Continue,
    /// Stop the whole operation.
    Abort,
    /// Retry the failed read. Treated as `Continue` for non-error events.
    Retry,
    /// Give up on the current entry and move on.
    Skip,
}

/// Caller-supplied policy consulted during streaming.
pub trait Recovery {
    fn on_progress(&mut self, progress: Progress<'_>) -> Action;
}

impl<F> Recovery for F
where
    F: FnMut(Progress<'_>) -> Action,
{
    fn on_progress(&mut self, progress: Progress<'_>) -> Action {
        self(progress)
    }
}

/// Continue on progress, abort on the first error.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnError;

impl Recovery for AbortOnError {
    fn on_progress(&mut self, progress: Progress<'_>) -> Action {
        match progress {
            Progress::Error { .. } => Action::Abort,
            _ => Action::Continue,
        }
    }
}

/// Continue on progress, skip entries that fail to read.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipOnError;

impl Recovery for SkipOnError {
    fn on_progress(&mut self, progress: Progress<'_>) -> Action {
        match progress {
            Progress::Error { .. } => Action::Skip,
            _ => Action::Continue,
        }
    }
}

/// How a streamed copy ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Copied {
    Complete(u64),
    Skipped(u64),
}

#[derive(Debug)]
pub(crate) enum CopyError {
    Read(io::Error),
    Write(io::Error),
    Aborted,
}

/// Copy `reader` into `writer` in blocks of `block_size`, consulting
/// `recovery` at every step.
pub(crate) fn copy_blocks(
    name: &str,
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    total: u64,
    block_size: usize,
    recovery: &mut dyn Recovery,
) -> Result<Copied, CopyError> {
    match recovery.on_progress(Progress::EntryStarted { name, size: total }) {
        Action::Abort => return Err(CopyError::Aborted),
        Action::Skip => return Ok(Copied::Skipped(0)),
        Action::Continue | Action::Retry => {}
    }

    let mut buf = vec![0u8; block_size.max(1)];
    let mut done = 0u64;
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => match recovery.on_progress(Progress::Error { name, error: &error }) {
                Action::Retry => {
                    trace!(name, "retrying read");
                    continue;
                }
                Action::Skip => return Ok(Copied::Skipped(done)),
                Action::Abort => return Err(CopyError::Read(error)),
                Action::Continue => break,
            },
        };

        writer.write_all(&buf[..read]).map_err(CopyError::Write)?;
        done += read as u64;

        match recovery.on_progress(Progress::Block { name, done, total }) {
            Action::Abort => return Err(CopyError::Aborted),
            Action::Skip => return Ok(Copied::Skipped(done)),
            Action::Continue | Action::Retry => {}
        }
    }

    if recovery.on_progress(Progress::EntryFinished { name, bytes: done }) == Action::Abort {
        return Err(CopyError::Aborted);
    }
    Ok(Copied::Complete(done))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails the first `failures` reads, then yields `data`.
    struct Flaky {
        failures: usize,
        data: io::Cursor<Vec<u8>>,
    }

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(io::Error::other("flaky"));
            }
            self.data.read(buf)
        }
    }

    #[test]
    fn test_copy_reports_blocks() {
        let mut out = Vec::new();
        let mut blocks = Vec::new();
        let mut recovery = |p: Progress<'_>| {
            if let Progress::Block { done, .. } = p {
                blocks.push(done);
            }
            Action::Continue
        };

        let copied = copy_blocks("f", &mut &b"abcdefghij"[..], &mut out, 10, 4, &mut recovery).unwrap();
        assert_eq!(copied, Copied::Complete(10));
        assert_eq!(out, b"abcdefghij");
        assert_eq!(blocks, [4, 8, 10]);
    }

    #[test]
    fn test_retry_then_succeed() {
        let mut reader = Flaky {
            failures: 2,
            data: io::Cursor::new(b"data".to_vec()),
        };
        let mut out = Vec::new();
        let mut recovery = |p: Progress<'_>| match p {
            Progress::Error { .. } => Action::Retry,
            _ => Action::Continue,
        };

        let copied = copy_blocks("f", &mut reader, &mut out, 4, 16, &mut recovery).unwrap();
        assert_eq!(copied, Copied::Complete(4));
        assert_eq!(out, b"data");
    }

    #[test]
    fn test_abort_and_skip_on_error() {
        let mut reader = Flaky {
            failures: 1,
            data: io::Cursor::new(Vec::new()),
        };
        let result = copy_blocks("f", &mut reader, &mut Vec::new(), 0, 16, &mut AbortOnError);
        assert!(matches!(result, Err(CopyError::Read(_))));

        let mut reader = Flaky {
            failures: 1,
            data: io::Cursor::new(Vec::new()),
        };
        let result = copy_blocks("f", &mut reader, &mut Vec::new(), 0, 16, &mut SkipOnError);
        assert!(matches!(result, Ok(Copied::Skipped(0))));
    }

    #[test]
    fn test_abort_on_progress() {
        let mut recovery = |p: Progress<'_>| match p {
            Progress::Block { .. } => Action::Abort,
            _ => Action::Continue,
        };
        let result = copy_blocks("f", &mut &b"abc"[..], &mut Vec::new(), 3, 1, &mut recovery);
        assert!(matches!(result, Err(CopyError::Aborted)));
    }
}
