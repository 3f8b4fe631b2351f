//! Background execution for strata.
//!
//! This crate provides:
//! - [`CancelToken`]: cooperative cancellation with deferred no-cancel sections
//! - [`TaskQueue`]: an ordered, pausable per-owner queue of background tasks
//! - [`BackgroundPool`]: the shared worker pool queues run on
//! - [`Dispatcher`]: hand-off of results back to the controlling thread

mod cancel;
mod dispatch;
mod pool;
mod queue;

pub use cancel::CancelToken;
pub use dispatch::{DispatchHandle, Dispatcher};
pub use pool::BackgroundPool;
pub use queue::TaskQueue;

pub use strata_core::Cancelled;
