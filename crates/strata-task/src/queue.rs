//! Ordered, pausable queue of cancellable background tasks.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

use strata_core::Cancelled;
use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::pool::BackgroundPool;

/// A queued unit of work with its completion.
trait Job: Send {
    /// Run the work and its finish. Returns `true` if the work was cancelled.
    fn run(self: Box<Self>, token: &CancelToken) -> bool;

    /// Report cancellation without running the work.
    fn abandon(self: Box<Self>);
}

struct TaskJob<T, W, F> {
    work: W,
    finish: F,
    _result: PhantomData<fn() -> T>,
}

impl<T, W, F> Job for TaskJob<T, W, F>
where
    W: FnOnce(&CancelToken) -> Result<T, Cancelled> + Send,
    F: FnOnce(Result<T, Cancelled>) + Send,
{
    fn run(self: Box<Self>, token: &CancelToken) -> bool {
        let result = (self.work)(token);
        let cancelled = result.is_err();
        (self.finish)(result);
        cancelled
    }

    fn abandon(self: Box<Self>) {
        (self.finish)(Err(Cancelled));
    }
}

struct QueueState {
    pending: VecDeque<Box<dyn Job>>,
    /// A drain loop is alive on the pool.
    running: bool,
    /// Token of the current episode; cleared by its completion callback.
    token: Option<Arc<CancelToken>>,
    paused: bool,
    episode: u64,
}

struct QueueInner {
    name: String,
    pool: BackgroundPool,
    state: Mutex<QueueState>,
}

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a drain episode if nothing prevents it.
    ///
    /// A new episode needs both the previous drain loop to have exited and
    /// the previous token to have completed, so episodes never overlap.
    fn kick(self: &Arc<Self>, state: &mut QueueState) {
        if state.paused || state.running || state.token.is_some() || state.pending.is_empty() {
            return;
        }

        state.episode += 1;
        let episode = state.episode;
        let weak = Arc::downgrade(self);
        let token = Arc::new(CancelToken::with_completion(move || {
            if let Some(inner) = weak.upgrade() {
                inner.complete_episode(episode);
            }
        }));
        state.token = Some(Arc::clone(&token));
        state.running = true;

        trace!(queue = %self.name, episode, pending = state.pending.len(), "starting episode");
        let inner = Arc::clone(self);
        self.pool.spawn(move || inner.drain(token));
    }

    fn complete_episode(self: &Arc<Self>, episode: u64) {
        let mut state = self.lock();
        if state.episode == episode {
            state.token = None;
        }
        self.kick(&mut state);
    }

    fn drain(self: Arc<Self>, token: Arc<CancelToken>) {
        loop {
            if token.is_cancelled() {
                break;
            }
            let job = {
                let mut state = self.lock();
                if state.paused {
                    None
                } else {
                    state.pending.pop_front()
                }
            };
            let Some(job) = job else {
                break;
            };
            if job.run(&token) {
                debug!(queue = %self.name, "task cancelled, ending episode");
                break;
            }
        }

        {
            let mut state = self.lock();
            state.running = false;
            self.kick(&mut state);
        }
        token.finish();
    }
}

/// Per-owner FIFO of background tasks.
///
/// Tasks run one at a time on the shared pool. Each drain episode runs
/// under its own [`CancelToken`]; [`cancel`](Self::cancel) discards tasks
/// that have not started and cancels the one in flight.
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    /// Create a queue that runs on `pool`. `name` only appears in logs.
    pub fn new(name: impl Into<String>, pool: BackgroundPool) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                pool,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    running: false,
                    token: None,
                    paused: false,
                    episode: 0,
                }),
            }),
        }
    }

    /// Enqueue `work`; `finish` receives its result on the same worker
    /// right after it returns, or `Err(Cancelled)` if the task is discarded
    /// before it starts.
    pub fn add<T, W, F>(&self, work: W, finish: F)
    where
        T: 'static,
        W: FnOnce(&CancelToken) -> Result<T, Cancelled> + Send + 'static,
        F: FnOnce(Result<T, Cancelled>) + Send + 'static,
    {
        let job = Box::new(TaskJob {
            work,
            finish,
            _result: PhantomData,
        });
        let mut state = self.inner.lock();
        state.pending.push_back(job);
        self.inner.kick(&mut state);
    }

    /// Discard pending tasks and cancel the running episode.
    ///
    /// Returns `true` if anything was pending or running.
    pub fn cancel(&self) -> bool {
        let (discarded, token) = {
            let mut state = self.inner.lock();
            (std::mem::take(&mut state.pending), state.token.clone())
        };

        let busy = !discarded.is_empty() || token.is_some();
        if busy {
            debug!(queue = %self.inner.name, discarded = discarded.len(), "cancelling queue");
        }
        if let Some(token) = token {
            token.cancel();
        }
        for job in discarded {
            job.abandon();
        }
        busy
    }

    /// Stop starting tasks. A running task completes first.
    pub fn pause(&self) {
        self.inner.lock().paused = true;
    }

    /// Resume draining if tasks remain.
    pub fn resume(&self) {
        let mut state = self.inner.lock();
        state.paused = false;
        self.inner.kick(&mut state);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Number of tasks waiting to start.
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// No task pending and no episode alive.
    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock();
        state.pending.is_empty() && !state.running && state.token.is_none()
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("TaskQueue")
            .field("name", &self.inner.name)
            .field("pending", &state.pending.len())
            .field("running", &state.running)
            .field("paused", &state.paused)
            .finish()
    }
}
