//! Asynchronous listing on the background pool.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace};

use strata_core::{FlatTree, ListError};
use strata_task::{BackgroundPool, CancelToken};

use crate::lister::{ListSource, ListedEntry, Lister};

/// Stage of an asynchronous listing.
#[derive(Debug)]
pub enum ListEvent {
    Begin,
    Entry(ListedEntry),
    /// Always the last event, delivered exactly once.
    Finish(Result<(), ListError>),
}

type Callback = Box<dyn FnMut(ListEvent) + Send>;

enum Slot {
    /// Waiting for the next event.
    Idle(Callback),
    /// The worker is inside the callback.
    Busy,
    /// `Finish` has been delivered.
    Done,
}

struct Shared {
    slot: Mutex<Slot>,
    token: CancelToken,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deliver one event from the worker. Returns `false` once the
    /// listing should stop.
    fn deliver(&self, event: ListEvent) -> bool {
        let is_finish = matches!(event, ListEvent::Finish(_));
        let mut callback = {
            let mut slot = self.lock();
            match std::mem::replace(&mut *slot, Slot::Busy) {
                Slot::Idle(callback) => callback,
                other => {
                    *slot = other;
                    return false;
                }
            }
        };

        callback(event);

        let mut slot = self.lock();
        if is_finish {
            *slot = Slot::Done;
            return false;
        }
        if self.token.is_cancelled() {
            // cancel() found the callback busy and left the final event to us
            *slot = Slot::Done;
            drop(slot);
            callback(ListEvent::Finish(Err(ListError::Cancelled)));
            return false;
        }
        *slot = Slot::Idle(callback);
        true
    }

    fn cancel(&self) {
        self.token.cancel();
        let callback = {
            let mut slot = self.lock();
            match std::mem::replace(&mut *slot, Slot::Done) {
                Slot::Idle(callback) => Some(callback),
                Slot::Busy => {
                    *slot = Slot::Busy;
                    None
                }
                Slot::Done => None,
            }
        };
        if let Some(mut callback) = callback {
            callback(ListEvent::Finish(Err(ListError::Cancelled)));
        }
    }
}

/// A listing running on the background pool.
///
/// Events reach the callback in order: `Begin`, any number of `Entry`,
/// then one `Finish`. Dropping the handle releases it without stopping
/// the listing.
pub struct ListHandle {
    shared: Arc<Shared>,
}

impl ListHandle {
    /// Start listing `source` with `lister` on `pool`.
    pub fn begin(
        lister: Arc<dyn Lister>,
        source: ListSource,
        pool: &BackgroundPool,
        callback: impl FnMut(ListEvent) + Send + 'static,
    ) -> Self {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::Idle(Box::new(callback))),
            token: CancelToken::new(),
        });

        let worker = Arc::clone(&shared);
        pool.spawn(move || {
            if !worker.deliver(ListEvent::Begin) {
                return;
            }
            let result = lister.list(source, &mut |entry| {
                if worker.token.is_cancelled() || !worker.deliver(ListEvent::Entry(entry)) {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            });
            if let Err(err) = &result {
                debug!(error = %err, "listing failed");
            }
            worker.deliver(ListEvent::Finish(result));
        });

        Self { shared }
    }

    /// Stop the listing.
    ///
    /// No `Entry` follows once this returns, unless one is being delivered
    /// right now. `Finish(Err(Cancelled))` is delivered unless a natural
    /// `Finish` already was. Safe to call from inside the callback.
    pub fn cancel(&self) {
        trace!("cancelling listing");
        self.shared.cancel();
    }

    /// Check if `Finish` has been delivered.
    pub fn is_finished(&self) -> bool {
        matches!(*self.shared.lock(), Slot::Done)
    }
}

impl std::fmt::Debug for ListHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListHandle")
            .field("cancelled", &self.shared.token.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// List `source` into a [`FlatTree`] and hand the result to `done`.
///
/// Useful for existence checks against a directory's contents.
pub fn list_flat(
    lister: Arc<dyn Lister>,
    source: ListSource,
    pool: &BackgroundPool,
    done: impl FnOnce(Result<FlatTree, ListError>) + Send + 'static,
) -> ListHandle {
    let mut tree = FlatTree::new();
    let mut done = Some(done);

    ListHandle::begin(lister, source, pool, move |event| match event {
        ListEvent::Begin => {}
        ListEvent::Entry(entry) => {
            tree.add_entry(entry.into_dir_entry());
        }
        ListEvent::Finish(result) => {
            if let Some(done) = done.take() {
                done(result.map(|()| std::mem::take(&mut tree)));
            }
        }
    })
}
