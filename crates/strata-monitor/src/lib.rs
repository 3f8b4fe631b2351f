//! Live change monitoring for strata.
//!
//! A [`DirMonitor`] watches one directory or archive file through `notify`
//! and reports [`MonitorEvent`]s in coalesced bursts.

mod coalesce;
mod event;
mod monitor;
mod translate;

pub use coalesce::Sink;
pub use event::MonitorEvent;
pub use monitor::{DirMonitor, MonitorError};
