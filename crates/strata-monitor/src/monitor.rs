//! Watching one directory or archive file for changes.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tracing::{debug, info};

use crate::coalesce::{Coalescer, Flags, Message};
use crate::event::MonitorEvent;
use crate::translate::Translator;

/// Errors raised when a watch cannot be set up.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The notification backend refused the watch.
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// A watched file has no parent directory to observe.
    #[error("cannot watch {path}: no parent directory")]
    NoParent { path: PathBuf },

    /// The coalescing thread could not be started.
    #[error("failed to start monitor thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// A live watch on one directory (per-file events) or one file such as an
/// archive (whole-object events).
///
/// Events reach the sink on a dedicated thread, bracketed into bursts.
/// Dropping the monitor cancels it.
pub struct DirMonitor {
    path: PathBuf,
    watcher: Mutex<Option<RecommendedWatcher>>,
    tx: Sender<Message>,
    flags: Arc<Flags>,
}

impl DirMonitor {
    /// Start watching `path`.
    ///
    /// `idle` is the quiet period that closes a burst. With `start_paused`
    /// events are held until [`resume`](Self::resume).
    pub fn watch(
        path: impl Into<PathBuf>,
        start_paused: bool,
        is_directory: bool,
        idle: Duration,
        sink: impl FnMut(MonitorEvent) + Send + 'static,
    ) -> Result<Self, MonitorError> {
        let path = path.into();
        let watched = if is_directory {
            path.clone()
        } else {
            path.parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .ok_or_else(|| MonitorError::NoParent { path: path.clone() })?
        };

        let flags = Arc::new(Flags::default());
        flags.paused.store(start_paused, Ordering::Release);

        let (tx, rx) = mpsc::channel();
        let raw_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = raw_tx.send(Message::Raw(res));
        })
        .map_err(|source| MonitorError::Watch {
            path: path.clone(),
            source,
        })?;
        watcher
            .watch(&watched, RecursiveMode::NonRecursive)
            .map_err(|source| MonitorError::Watch {
                path: path.clone(),
                source,
            })?;

        let coalescer = Coalescer::new(
            Translator::new(&path, is_directory),
            idle,
            Arc::clone(&flags),
            Box::new(sink),
        );
        thread::Builder::new()
            .name("strata-monitor".to_string())
            .spawn(move || coalescer.run(rx))?;

        info!(path = %path.display(), is_directory, paused = start_paused, "watching");
        Ok(Self {
            path,
            watcher: Mutex::new(Some(watcher)),
            tx,
            flags,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hold events until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.flags.paused.store(true, Ordering::Release);
    }

    /// Deliver held events, in order, and resume live delivery.
    pub fn resume(&self) {
        self.flags.paused.store(false, Ordering::Release);
        let _ = self.tx.send(Message::Resume);
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::Acquire)
    }

    /// Stop watching. No event reaches the sink once this returns, apart
    /// from one being delivered at this moment.
    pub fn cancel(&self) {
        if self.flags.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(watcher);
        let _ = self.tx.send(Message::Stop);
        debug!(path = %self.path.display(), "monitor cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for DirMonitor {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for DirMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirMonitor")
            .field("path", &self.path)
            .field("paused", &self.is_paused())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
