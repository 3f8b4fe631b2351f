//! Cooperative cancellation token.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use strata_core::Cancelled;

const CAN_CANCEL: u8 = 0;
const IN_NO_CANCEL: u8 = 1;
const CANCELLED: u8 = 2;

type Completion = Box<dyn FnOnce() + Send>;

/// Tri-state cancellation flag with a one-shot completion latch.
///
/// Background work polls [`test_cancel`](Self::test_cancel) at its
/// checkpoints and wraps every mutation that must not be torn in
/// [`no_cancel`](Self::no_cancel). A `cancel()` that lands inside such a
/// section is deferred until the section ends.
///
/// The completion callback runs exactly once, either from
/// [`finish`](Self::finish) or from the cancellation path.
pub struct CancelToken {
    state: AtomicU8,
    finished: AtomicBool,
    completion: Mutex<Option<Completion>>,
}

impl CancelToken {
    /// Create a token without a completion callback.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(CAN_CANCEL),
            finished: AtomicBool::new(false),
            completion: Mutex::new(None),
        }
    }

    /// Create a token that runs `completion` once the episode is over.
    pub fn with_completion(completion: impl FnOnce() + Send + 'static) -> Self {
        Self {
            completion: Mutex::new(Some(Box::new(completion))),
            ..Self::new()
        }
    }

    /// Checkpoint: fails once the token has been cancelled.
    pub fn test_cancel(&self) -> Result<(), Cancelled> {
        if self.state.load(Ordering::Acquire) == CANCELLED {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Check if `cancel()` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Run `body` with cancellation held off.
    ///
    /// Returns `Err(Cancelled)` without running `body` if the token was
    /// already cancelled. A cancellation requested while `body` runs is
    /// recorded; the completion fires after `body` returns and the next
    /// checkpoint fails.
    pub fn no_cancel<T>(&self, body: impl FnOnce() -> T) -> Result<T, Cancelled> {
        if self
            .state
            .compare_exchange(CAN_CANCEL, IN_NO_CANCEL, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Cancelled);
        }

        let value = body();

        if self
            .state
            .compare_exchange(IN_NO_CANCEL, CAN_CANCEL, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // cancel() arrived while the body ran
            self.finish();
        }

        Ok(value)
    }

    /// Request cancellation.
    ///
    /// Outside a no-cancel section the completion callback runs before this
    /// returns; inside one it runs when the section ends.
    pub fn cancel(&self) {
        let previous = self.state.swap(CANCELLED, Ordering::AcqRel);
        if previous == CAN_CANCEL {
            self.finish();
        }
    }

    /// Signal normal completion. Only the first call (from either path)
    /// runs the completion callback.
    pub fn finish(&self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        let completion = self
            .completion
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(completion) = completion {
            completion();
        }
    }

    /// Check if the completion latch has been released.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state.load(Ordering::Acquire) {
            CAN_CANCEL => "can_cancel",
            IN_NO_CANCEL => "in_no_cancel",
            _ => "cancelled",
        };
        f.debug_struct("CancelToken")
            .field("state", &state)
            .field("finished", &self.is_finished())
            .finish()
    }
}
