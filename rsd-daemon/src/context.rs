//! Daemon-wide state constructed once at startup.

use crate::config::DaemonConfig;
use crate::store::{DescriptionStore, TaskStore};

/// Owns the single instance of each store.
#[derive(Debug)]
pub struct DaemonContext {
    /// Task document store.
    pub tasks: TaskStore,
    /// Per-task description store.
    pub descriptions: DescriptionStore,
}

impl DaemonContext {
    /// Creates a context from explicit stores.
    #[must_use]
    pub const fn new(tasks: TaskStore, descriptions: DescriptionStore) -> Self {
        Self {
            tasks,
            descriptions,
        }
    }

    /// Creates a context using the store paths in `config`.
    #[must_use]
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(
            TaskStore::new(&config.task_store_path),
            DescriptionStore::new(&config.description_store_path),
        )
    }
}
