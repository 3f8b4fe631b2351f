//! Callbacks through which the VFS reports to its owner.

use std::path::Path;
use std::sync::Arc;

use strata_core::{DirEntry, ListError};

/// Receiver of one read, refresh or navigation.
///
/// `begin` and `new_entry` are called from the background worker while the
/// listing runs; `finish` is called exactly once, on the controlling
/// thread, and always last. `begin` is skipped when the operation is
/// cancelled before it starts.
pub trait Delegate: Send + Sync {
    fn begin(&self) {}

    fn new_entry(&self, entry: &DirEntry);

    fn finish(&self, cancelled: bool, error: Option<&ListError>);
}

/// Called when a burst of live changes starts. Returning `None` declines
/// the update; the burst is dropped and monitoring continues.
pub type DirChangedCallback = Arc<dyn Fn() -> Option<Arc<dyn Delegate>> + Send + Sync>;

/// Called with the path that no longer exists.
pub type DeletedCallback = Arc<dyn Fn(&Path) + Send + Sync>;
