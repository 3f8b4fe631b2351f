//! Hand-off of closures to the controlling thread.
//!
//! Background work never touches controller-owned state directly. It posts
//! a closure through a [`DispatchHandle`]; whichever thread owns the
//! [`Dispatcher`] runs those closures in the order they were posted.

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send>;

/// Sending side, cloneable and usable from any thread.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl DispatchHandle {
    /// Queue `job` for the controlling thread.
    ///
    /// Returns `false` if the dispatcher is gone; the job is dropped.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }
}

impl std::fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Receiving side, owned by the controlling thread.
pub struct Dispatcher {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl Dispatcher {
    /// Create a dispatcher and its handle.
    pub fn new() -> (Self, DispatchHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, DispatchHandle { tx })
    }

    /// Run every job that is already queued, without waiting.
    ///
    /// Returns how many jobs ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for the next job and run it.
    ///
    /// Returns `false` once every handle has been dropped.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run jobs until `done` reports true or the channel closes.
    pub async fn run_until(&mut self, mut done: impl FnMut() -> bool) {
        while !done() {
            if !self.run_next().await {
                break;
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}
