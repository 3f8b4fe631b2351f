//! VFS configuration types.

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Default idle window that closes a burst of change events.
pub const DEFAULT_MONITOR_IDLE: Duration = Duration::from_millis(2000);

/// Default block size for streaming archive members.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Configuration for a VFS instance and its collaborators.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct VfsConfig {
    /// Idle time after the last change before a burst is closed.
    #[builder(default = "DEFAULT_MONITOR_IDLE")]
    #[serde(default = "default_monitor_idle")]
    pub monitor_idle: Duration,

    /// Watch the current directory for live changes.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub monitor: bool,

    /// Number of background worker threads (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Report attributes of a symlink's target rather than the link.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub follow_symlinks: bool,

    /// Block size used when streaming archive members.
    #[builder(default = "DEFAULT_BLOCK_SIZE")]
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_monitor_idle() -> Duration {
    DEFAULT_MONITOR_IDLE
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

impl VfsConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(idle) = self.monitor_idle {
            if idle.is_zero() {
                return Err("Monitor idle window cannot be zero".to_string());
            }
        }
        if let Some(block_size) = self.block_size {
            if block_size == 0 {
                return Err("Block size cannot be zero".to_string());
            }
        }
        Ok(())
    }
}

impl VfsConfig {
    /// Create a new config builder.
    pub fn builder() -> VfsConfigBuilder {
        VfsConfigBuilder::default()
    }

    /// Check if an entry should be skipped as hidden.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            monitor_idle: DEFAULT_MONITOR_IDLE,
            monitor: true,
            threads: 0,
            include_hidden: true,
            follow_symlinks: true,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}
