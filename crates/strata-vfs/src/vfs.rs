//! The VFS facade.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, info, warn};

use strata_core::{DirEntry, DirTree, FlatTree, ListError, VfsConfig, path};
use strata_list::{ArchiveFormat, ListSource, Lister};
use strata_monitor::{DirMonitor, MonitorEvent};
use strata_task::{BackgroundPool, CancelToken, Cancelled, DispatchHandle, TaskQueue};

use crate::delegate::{DeletedCallback, Delegate, DirChangedCallback};
use crate::dir_type::{Backend, DefaultListers, DirType, ListerProvider};
use crate::update::apply_change;

/// A live change burst between `EventsBegin` and `EventsEnd`.
enum Burst {
    /// The owner declined the update; events are dropped.
    Declined,
    Collecting {
        delegate: Arc<dyn Delegate>,
        changes: Vec<MonitorEvent>,
        /// Re-list instead of applying `changes`. Archive trees are always
        /// refreshed.
        refresh: bool,
    },
}

/// Live work waiting for the one in flight to complete.
enum LiveWork {
    Update(Vec<MonitorEvent>),
    Refresh,
}

type Deferred = VecDeque<(LiveWork, Arc<dyn Delegate>)>;

struct VfsState {
    tree: DirTree,
    dir_type: Option<DirType>,
    monitor: Option<DirMonitor>,
    monitor_generation: u64,
    /// Bumped by every read and navigation. Updates started under an older
    /// generation are discarded.
    generation: u64,
    /// Operations enqueued and not yet completed.
    pending: usize,
    /// Reads and navigations among `pending`.
    reads: usize,
    paused: bool,
    burst: Option<Burst>,
    /// A live update or refresh is in flight. Later ones wait in
    /// `deferred` so each applies to the tree the previous one committed.
    live_busy: bool,
    deferred: Deferred,
    on_dir_changed: Option<DirChangedCallback>,
    on_deleted: Option<DeletedCallback>,
}

/// Result of a successful read.
struct Listing {
    tree: DirTree,
    dir_type: DirType,
}

/// Result of a successful refresh.
struct Refreshed {
    tree: DirTree,
    dir_type: DirType,
    /// The logical subpath vanished and the cursor moved up.
    moved: bool,
}

type Outcome<T> = Result<Result<T, ListError>, Cancelled>;

struct VfsInner {
    config: VfsConfig,
    listers: Arc<dyn ListerProvider>,
    queue: TaskQueue,
    dispatch: DispatchHandle,
    state: Mutex<VfsState>,
    this: Weak<VfsInner>,
}

/// One browsable location and its live directory tree.
///
/// All methods are meant to be called from the controlling thread, the one
/// running the [`Dispatcher`](strata_task::Dispatcher) paired with the
/// handle given at construction. Results and live updates are applied when
/// that dispatcher runs.
#[derive(Clone)]
pub struct Vfs {
    inner: Arc<VfsInner>,
}

impl Vfs {
    /// Create a VFS with its own worker pool and the default listers.
    pub fn new(config: VfsConfig, dispatch: DispatchHandle) -> crate::Result<Self> {
        let pool = BackgroundPool::new(config.threads)?;
        let listers = Arc::new(DefaultListers::new(&config));
        Ok(Self::with_listers(config, pool, dispatch, listers))
    }

    /// Create a VFS on a shared pool with custom listers.
    pub fn with_listers(
        config: VfsConfig,
        pool: BackgroundPool,
        dispatch: DispatchHandle,
        listers: Arc<dyn ListerProvider>,
    ) -> Self {
        let inner = Arc::new_cyclic(|this| VfsInner {
            config,
            listers,
            queue: TaskQueue::new("vfs", pool),
            dispatch,
            state: Mutex::new(VfsState {
                tree: DirTree::flat(),
                dir_type: None,
                monitor: None,
                monitor_generation: 0,
                generation: 0,
                pending: 0,
                reads: 0,
                paused: false,
                burst: None,
                live_busy: false,
                deferred: VecDeque::new(),
                on_dir_changed: None,
                on_deleted: None,
            }),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Read `path` into a new tree.
    ///
    /// `path` may be a directory, an archive file, or a path inside an
    /// archive. Entries stream to `delegate` while listing; the tree and
    /// descriptor are replaced only if the read completes. Any live update
    /// in flight is abandoned.
    pub fn read(&self, path: impl AsRef<Path>, delegate: Arc<dyn Delegate>) {
        self.inner.read(path.as_ref().to_path_buf(), delegate);
    }

    /// Enter `entry`, one of the visible entries.
    ///
    /// Inside an archive this moves the cursor; a directory or archive file
    /// in a directory listing is read as a new location. Returns `false`
    /// when `entry` cannot be entered.
    pub fn descend(&self, entry: &DirEntry, delegate: Arc<dyn Delegate>) -> bool {
        self.inner.descend(entry, delegate)
    }

    /// Move one level up inside the current backend.
    ///
    /// Returns `false` without touching anything when already at the base.
    pub fn ascend(&self, delegate: Arc<dyn Delegate>) -> bool {
        self.inner.ascend(delegate)
    }

    /// Cancel the read or navigation in flight. Live updates are not
    /// affected. Returns `false` when nothing was reading.
    pub fn cancel(&self) -> bool {
        if self.inner.lock().reads == 0 {
            return false;
        }
        self.inner.queue.cancel()
    }

    /// Re-list the current location, keeping the cursor where it still
    /// exists. Returns `false` before the first successful read.
    pub fn refresh(&self, delegate: Arc<dyn Delegate>) -> bool {
        if self.inner.lock().dir_type.is_none() {
            return false;
        }
        self.inner.schedule_live(LiveWork::Refresh, delegate);
        true
    }

    /// Hold queued work and live updates.
    pub fn pause(&self) {
        self.inner.queue.pause();
        let mut state = self.inner.lock();
        state.paused = true;
        if let Some(monitor) = &state.monitor {
            monitor.pause();
        }
    }

    pub fn resume(&self) {
        self.inner.queue.resume();
        let mut state = self.inner.lock();
        state.paused = false;
        self.inner.settle(&state);
    }

    /// Register the callback asked for a delegate when live changes arrive.
    pub fn on_dir_changed(&self, callback: impl Fn() -> Option<Arc<dyn Delegate>> + Send + Sync + 'static) {
        self.inner.lock().on_dir_changed = Some(Arc::new(callback));
    }

    /// Register the callback told when the current location disappears.
    pub fn on_deleted(&self, callback: impl Fn(&Path) + Send + Sync + 'static) {
        self.inner.lock().on_deleted = Some(Arc::new(callback));
    }

    /// Borrow the current tree.
    pub fn with_tree<R>(&self, f: impl FnOnce(&DirTree) -> R) -> R {
        f(&self.inner.lock().tree)
    }

    /// Snapshot of the current tree.
    pub fn current_tree(&self) -> DirTree {
        self.with_tree(DirTree::clone)
    }

    /// Entries visible at the cursor.
    pub fn visible_entries(&self) -> Vec<DirEntry> {
        self.with_tree(|tree| tree.visible_entries().into_iter().cloned().collect())
    }

    pub fn dir_type(&self) -> Option<DirType> {
        self.inner.lock().dir_type.clone()
    }

    /// The current location, including the logical subpath.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.inner.lock().dir_type.as_ref().map(DirType::full_path)
    }

    /// Check if any read, navigation or update is in flight.
    pub fn is_busy(&self) -> bool {
        self.inner.lock().pending > 0
    }

    pub fn config(&self) -> &VfsConfig {
        &self.inner.config
    }

    #[cfg(test)]
    pub(crate) fn inject(&self, event: MonitorEvent) {
        self.inner.handle_monitor_event(event);
    }
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Vfs")
            .field("dir_type", &state.dir_type)
            .field("entries", &state.tree.len())
            .field("pending", &state.pending)
            .field("monitoring", &state.monitor.is_some())
            .finish()
    }
}

/// List `dir_type` into `tree`, optionally reporting each newly visible
/// entry. Insertion and reporting of one entry are never split by a
/// cancellation.
fn list_into(
    tree: &mut DirTree,
    lister: &dyn Lister,
    dir_type: &DirType,
    token: &CancelToken,
    delegate: Option<&dyn Delegate>,
) -> Result<Result<(), ListError>, Cancelled> {
    let result = lister.list(ListSource::path(dir_type.physical.clone()), &mut |listed| {
        let added = token.no_cancel(|| {
            if let Some(id) = tree.add_entry(listed.into_dir_entry()) {
                if let (Some(delegate), Some(entry)) = (delegate, tree.entry(id)) {
                    delegate.new_entry(entry);
                }
            }
        });
        match added {
            Ok(()) => ControlFlow::Continue(()),
            Err(Cancelled) => ControlFlow::Break(()),
        }
    });
    token.test_cancel()?;
    Ok(result)
}

/// Tell the owners of an open burst and of queued live work that they
/// were cancelled.
fn finish_discarded(burst: Option<Burst>, deferred: Deferred) {
    if let Some(Burst::Collecting { delegate, .. }) = burst {
        delegate.finish(true, None);
    }
    for (_, delegate) in deferred {
        delegate.finish(true, None);
    }
}

impl VfsInner {
    fn lock(&self) -> MutexGuard<'_, VfsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Account for a new operation; live updates wait until it completes.
    fn begin_op(&self, state: &mut VfsState, is_read: bool) {
        state.pending += 1;
        if is_read {
            state.reads += 1;
        }
        if let Some(monitor) = &state.monitor {
            monitor.pause();
        }
    }

    fn end_op(&self, is_read: bool) {
        let mut state = self.lock();
        state.pending = state.pending.saturating_sub(1);
        if is_read {
            state.reads = state.reads.saturating_sub(1);
        }
        self.settle(&state);
    }

    /// Let the monitor deliver again once nothing is in flight.
    fn settle(&self, state: &VfsState) {
        if state.pending == 0 && !state.paused {
            if let Some(monitor) = &state.monitor {
                monitor.resume();
            }
        }
    }

    /// Run `work` on the queue and `complete` on the controlling thread.
    ///
    /// If the VFS or the dispatcher is gone by then, the delegate is told
    /// the operation was cancelled.
    fn enqueue<T, W, C>(&self, delegate: Arc<dyn Delegate>, work: W, complete: C)
    where
        T: Send + 'static,
        W: FnOnce(&CancelToken) -> Result<T, Cancelled> + Send + 'static,
        C: FnOnce(&VfsInner, Result<T, Cancelled>, Arc<dyn Delegate>) + Send + 'static,
    {
        let this = self.this.clone();
        let dispatch = self.dispatch.clone();
        self.queue.add(work, move |result| {
            let fallback = Arc::clone(&delegate);
            let posted = dispatch.post(move || match this.upgrade() {
                Some(inner) => complete(&inner, result, delegate),
                None => delegate.finish(true, None),
            });
            if !posted {
                fallback.finish(true, None);
            }
        });
    }

    fn read(&self, path: PathBuf, delegate: Arc<dyn Delegate>) {
        let (burst, deferred) = {
            let mut state = self.lock();
            self.begin_op(&mut state, true);
            state.generation += 1;
            (state.burst.take(), std::mem::take(&mut state.deferred))
        };
        finish_discarded(burst, deferred);
        debug!(path = %path.display(), "read requested");

        let listers = Arc::clone(&self.listers);
        let emit = Arc::clone(&delegate);
        self.enqueue(
            delegate,
            move |token| -> Outcome<Listing> {
                token.test_cancel()?;
                emit.begin();

                let dir_type = match DirType::resolve(&path) {
                    Ok(dir_type) => dir_type,
                    Err(err) => return Ok(Err(err)),
                };
                let lister = listers.lister(&dir_type);
                let mut tree = dir_type.new_tree();
                tree.subpath(&dir_type.logical);

                let listed = list_into(&mut tree, lister.as_ref(), &dir_type, token, Some(emit.as_ref()))?;
                Ok(listed.and_then(|()| {
                    if !dir_type.logical.is_empty() && tree.subpath_dir(&dir_type.logical).is_none() {
                        return Err(ListError::NotFound {
                            path: dir_type.full_path(),
                        });
                    }
                    Ok(Listing { tree, dir_type })
                }))
            },
            |inner, result, delegate| inner.complete_read(result, delegate),
        );
    }

    fn complete_read(&self, result: Outcome<Listing>, delegate: Arc<dyn Delegate>) {
        let (cancelled, error) = {
            let mut state = self.lock();
            match result {
                Err(Cancelled) => (true, None),
                Ok(Err(err)) => (false, Some(err)),
                Ok(Ok(Listing { tree, dir_type })) => {
                    info!(path = %dir_type.full_path().display(), entries = tree.len(), "read complete");
                    state.tree = tree;
                    state.dir_type = Some(dir_type);
                    self.start_monitor(&mut state);
                    (false, None)
                }
            }
        };
        if let Some(err) = &error {
            warn!(error = %err, "read failed");
        }
        delegate.finish(cancelled, error.as_ref());
        self.end_op(true);
    }

    fn descend(&self, entry: &DirEntry, delegate: Arc<dyn Delegate>) -> bool {
        enum Target {
            Subdir(String),
            Location(PathBuf),
        }

        let target = {
            let state = self.lock();
            let Some(dir_type) = &state.dir_type else {
                return false;
            };
            if state.tree.is_subdir(entry) {
                Target::Subdir(entry.canonical_subpath.clone())
            } else if dir_type.backend == Backend::Directory && state.tree.get_entry(&entry.file_name).is_some() {
                let path = dir_type.physical.join(entry.file_name.as_str());
                if !entry.is_dir() && ArchiveFormat::from_path(&path).is_none() {
                    return false;
                }
                Target::Location(path)
            } else {
                return false;
            }
        };

        match target {
            Target::Subdir(subpath) => self.navigate(subpath, delegate),
            Target::Location(path) => self.read(path, delegate),
        }
        true
    }

    fn ascend(&self, delegate: Arc<dyn Delegate>) -> bool {
        let parent = {
            let state = self.lock();
            if state.tree.at_base() {
                return false;
            }
            path::parent_subpath(state.tree.current_subpath()).to_string()
        };
        self.navigate(parent, delegate);
        true
    }

    /// Move the archive cursor to `target`, replaying its children.
    fn navigate(&self, target: String, delegate: Arc<dyn Delegate>) {
        let (children, generation, burst, deferred) = {
            let mut state = self.lock();
            let children: Vec<DirEntry> = state
                .tree
                .subpath_dir(&target)
                .map(|dir| {
                    dir.iter()
                        .filter_map(|(_, id)| state.tree.entry(id).cloned())
                        .collect()
                })
                .unwrap_or_default();
            self.begin_op(&mut state, true);
            state.generation += 1;
            let deferred = std::mem::take(&mut state.deferred);
            (children, state.generation, state.burst.take(), deferred)
        };
        finish_discarded(burst, deferred);
        debug!(subpath = %target, children = children.len(), "navigating");

        let emit = Arc::clone(&delegate);
        self.enqueue(
            delegate,
            move |token| {
                token.test_cancel()?;
                emit.begin();
                for entry in &children {
                    token.test_cancel()?;
                    emit.new_entry(entry);
                }
                Ok(target)
            },
            move |inner, result, delegate| inner.complete_navigate(generation, result, delegate),
        );
    }

    fn complete_navigate(&self, generation: u64, result: Result<String, Cancelled>, delegate: Arc<dyn Delegate>) {
        let cancelled = {
            let mut state = self.lock();
            match result {
                Ok(target) if state.generation == generation => {
                    state.tree.subpath(&target);
                    if let Some(dir_type) = state.dir_type.as_mut() {
                        dir_type.logical = target;
                    }
                    false
                }
                _ => true,
            }
        };
        delegate.finish(cancelled, None);
        self.end_op(true);
    }

    fn start_refresh(&self, dir_type: DirType, generation: u64, delegate: Arc<dyn Delegate>) {
        {
            let mut state = self.lock();
            self.begin_op(&mut state, false);
        }
        debug!(path = %dir_type.full_path().display(), "refreshing");

        let listers = Arc::clone(&self.listers);
        let emit = Arc::clone(&delegate);
        self.enqueue(
            delegate,
            move |token| -> Outcome<Refreshed> {
                token.test_cancel()?;
                let lister = listers.lister(&dir_type);
                let mut tree = dir_type.new_tree();
                tree.subpath(&dir_type.logical);
                if let Err(err) = list_into(&mut tree, lister.as_ref(), &dir_type, token, None)? {
                    return Ok(Err(err));
                }

                // walk up to the nearest subpath that still exists
                let mut logical = dir_type.logical.clone();
                while !logical.is_empty() && tree.subpath_dir(&logical).is_none() {
                    logical = path::parent_subpath(&logical).to_string();
                }
                let moved = logical != dir_type.logical;
                tree.subpath(&logical);

                token.no_cancel(|| {
                    emit.begin();
                    for entry in tree.visible_entries() {
                        emit.new_entry(entry);
                    }
                })?;
                Ok(Ok(Refreshed {
                    tree,
                    dir_type: dir_type.with_logical(&logical),
                    moved,
                }))
            },
            move |inner, result, delegate| inner.complete_refresh(generation, result, delegate),
        );
    }

    fn complete_refresh(&self, generation: u64, result: Outcome<Refreshed>, delegate: Arc<dyn Delegate>) {
        let (cancelled, error, deleted) = {
            let mut state = self.lock();
            let current = state.dir_type.as_ref().map(|d| d.physical.clone());
            match result {
                Err(Cancelled) => (true, None, None),
                Ok(_) if state.generation != generation => (true, None, None),
                Ok(Err(err)) => (false, Some(err), None),
                Ok(Ok(refreshed)) if current.as_ref() != Some(&refreshed.dir_type.physical) => {
                    debug!("discarding refresh of a previous location");
                    (true, None, None)
                }
                Ok(Ok(Refreshed { tree, dir_type, moved })) => {
                    let deleted = if moved {
                        info!(path = %dir_type.full_path().display(), "subpath vanished, moved up");
                        state.on_deleted.clone().map(|callback| (callback, dir_type.full_path()))
                    } else {
                        None
                    };
                    state.tree = tree;
                    state.dir_type = Some(dir_type);
                    (false, None, deleted)
                }
            }
        };
        if let Some((callback, path)) = deleted {
            callback(&path);
        }
        delegate.finish(cancelled, error.as_ref());
        self.next_live();
        self.end_op(false);
    }

    fn start_update(
        &self,
        dir: PathBuf,
        shadow: FlatTree,
        changes: Vec<MonitorEvent>,
        generation: u64,
        delegate: Arc<dyn Delegate>,
    ) {
        {
            let mut state = self.lock();
            self.begin_op(&mut state, false);
        }
        debug!(changes = changes.len(), "applying live update");

        let follow_symlinks = self.config.follow_symlinks;
        let emit = Arc::clone(&delegate);
        self.enqueue(
            delegate,
            move |token| {
                let mut shadow = shadow;
                for change in &changes {
                    token.no_cancel(|| apply_change(&mut shadow, &dir, change, follow_symlinks))?;
                }
                token.test_cancel()?;
                token.no_cancel(|| {
                    emit.begin();
                    for (_, entry) in shadow.iter() {
                        emit.new_entry(entry);
                    }
                })?;
                Ok(shadow)
            },
            move |inner, result, delegate| inner.complete_update(generation, result, delegate),
        );
    }

    fn complete_update(&self, generation: u64, result: Result<FlatTree, Cancelled>, delegate: Arc<dyn Delegate>) {
        let cancelled = {
            let mut state = self.lock();
            match result {
                Ok(shadow) if state.generation == generation && !state.tree.is_archive() => {
                    state.tree = DirTree::Flat(shadow);
                    false
                }
                Ok(_) => {
                    debug!("discarding stale live update");
                    true
                }
                Err(Cancelled) => true,
            }
        };
        delegate.finish(cancelled, None);
        self.next_live();
        self.end_op(false);
    }

    fn start_monitor(&self, state: &mut VfsState) {
        state.monitor = None;
        if !self.config.monitor {
            return;
        }
        let Some(dir_type) = &state.dir_type else {
            return;
        };

        state.monitor_generation += 1;
        let generation = state.monitor_generation;
        let this = self.this.clone();
        let dispatch = self.dispatch.clone();
        let sink = move |event: MonitorEvent| {
            let this = this.clone();
            dispatch.post(move || {
                if let Some(inner) = this.upgrade() {
                    inner.on_monitor_event(generation, event);
                }
            });
        };

        let start_paused = state.pending > 0 || state.paused;
        match DirMonitor::watch(
            dir_type.physical.clone(),
            start_paused,
            !dir_type.is_archive(),
            self.config.monitor_idle,
            sink,
        ) {
            Ok(monitor) => state.monitor = Some(monitor),
            Err(err) => warn!(error = %err, "live updates unavailable"),
        }
    }

    fn on_monitor_event(&self, generation: u64, event: MonitorEvent) {
        {
            let state = self.lock();
            if state.monitor_generation != generation || state.monitor.is_none() {
                return;
            }
        }
        self.handle_monitor_event(event);
    }

    fn handle_monitor_event(&self, event: MonitorEvent) {
        match event {
            MonitorEvent::EventsBegin => self.begin_burst(),
            MonitorEvent::EventsEnd => self.end_burst(),
            MonitorEvent::DirDeleted => self.dir_deleted(),
            MonitorEvent::DirModified => {
                if let Some(Burst::Collecting { refresh, .. }) = &mut self.lock().burst {
                    *refresh = true;
                }
            }
            change => {
                let mut state = self.lock();
                let archive = state.tree.is_archive();
                if let Some(Burst::Collecting { changes, refresh, .. }) = &mut state.burst {
                    if archive {
                        *refresh = true;
                    } else {
                        changes.push(change);
                    }
                }
            }
        }
    }

    fn begin_burst(&self) {
        let callback = {
            let state = self.lock();
            if state.dir_type.is_none() {
                return;
            }
            state.on_dir_changed.clone()
        };
        let delegate = callback.and_then(|callback| callback());

        let discarded = {
            let mut state = self.lock();
            let burst = match delegate {
                None => Burst::Declined,
                Some(delegate) => Burst::Collecting {
                    delegate,
                    changes: Vec::new(),
                    refresh: false,
                },
            };
            state.burst.replace(burst)
        };
        finish_discarded(discarded, Deferred::new());
    }

    fn end_burst(&self) {
        let burst = self.lock().burst.take();
        let Some(Burst::Collecting {
            delegate,
            changes,
            refresh,
        }) = burst
        else {
            return;
        };
        let work = if refresh {
            LiveWork::Refresh
        } else {
            LiveWork::Update(changes)
        };
        self.schedule_live(work, delegate);
    }

    /// Start live work now, or queue it behind the one in flight.
    fn schedule_live(&self, work: LiveWork, delegate: Arc<dyn Delegate>) {
        {
            let mut state = self.lock();
            state.deferred.push_back((work, delegate));
            if state.live_busy {
                debug!(queued = state.deferred.len(), "live work waiting");
                return;
            }
        }
        self.next_live();
    }

    /// Start the oldest queued live work, if any. An update copies its
    /// shadow from the tree committed at this point.
    fn next_live(&self) {
        enum Start {
            Update(PathBuf, FlatTree, Vec<MonitorEvent>),
            Refresh(DirType),
        }

        let (start, generation, delegate) = loop {
            let mut state = self.lock();
            let Some((work, delegate)) = state.deferred.pop_front() else {
                state.live_busy = false;
                return;
            };
            let Some(dir_type) = state.dir_type.clone() else {
                drop(state);
                delegate.finish(true, None);
                continue;
            };
            let start = match (work, &state.tree) {
                (LiveWork::Update(changes), DirTree::Flat(tree)) => {
                    Start::Update(dir_type.physical, tree.clone(), changes)
                }
                _ => Start::Refresh(dir_type),
            };
            state.live_busy = true;
            break (start, state.generation, delegate);
        };

        match start {
            Start::Update(dir, shadow, changes) => self.start_update(dir, shadow, changes, generation, delegate),
            Start::Refresh(dir_type) => self.start_refresh(dir_type, generation, delegate),
        }
    }

    /// The watched object is gone: stop monitoring and fall back to the
    /// base of the location.
    fn dir_deleted(&self) {
        let (physical, callback, burst, deferred) = {
            let mut state = self.lock();
            let Some(physical) = state.dir_type.as_mut().map(|dir_type| {
                dir_type.logical.clear();
                dir_type.physical.clone()
            }) else {
                return;
            };
            state.monitor = None;
            state.tree.subpath("");
            state.generation += 1;
            let deferred = std::mem::take(&mut state.deferred);
            (physical, state.on_deleted.clone(), state.burst.take(), deferred)
        };
        info!(path = %physical.display(), "watched location deleted");
        finish_discarded(burst, deferred);
        if let Some(callback) = callback {
            callback(&physical);
        }
    }
}
