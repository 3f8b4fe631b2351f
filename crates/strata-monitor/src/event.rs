//! Events reported by a directory monitor.

use serde::Serialize;

/// A change seen by a [`DirMonitor`](crate::DirMonitor).
///
/// Per-file events carry the entry name relative to the watched directory.
/// Every burst of changes is bracketed by `EventsBegin` and `EventsEnd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MonitorEvent {
    FileCreated(String),
    FileModified(String),
    FileDeleted(String),
    FileRenamed { from: String, to: String },
    /// The watched object changed in a way that needs a full re-read.
    DirModified,
    /// The watched object is gone.
    DirDeleted,
    EventsBegin,
    EventsEnd,
}

impl MonitorEvent {
    /// Check if this event only delimits a burst.
    pub fn is_marker(&self) -> bool {
        matches!(self, Self::EventsBegin | Self::EventsEnd)
    }

    /// Check if this event concerns a single entry.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::FileCreated(_) | Self::FileModified(_) | Self::FileDeleted(_) | Self::FileRenamed { .. }
        )
    }
}
