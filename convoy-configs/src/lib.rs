//! Convoy Configs
//!
//! Registries for versioned pipeline/instance configs and agent groups,
//! plus the background flusher that keeps their in-memory indices in step
//! with storage.

mod catalog;
mod flusher;
mod groups;
mod registry;

pub use catalog::{Catalog, CatalogSnapshot, DeletePolicy};
pub use flusher::{config_flush_task, FlusherMetrics, FlusherSnapshot};
pub use groups::GroupRegistry;
pub use registry::ConfigRegistry;

use std::ops::AddAssign;

/// Outcome of one push-then-pull round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Entries written because storage held an older version.
    pub pushed: usize,
    /// Entries in the index after reloading.
    pub pulled: usize,
}

impl AddAssign for FlushStats {
    fn add_assign(&mut self, other: Self) {
        self.pushed += other.pushed;
        self.pulled += other.pulled;
    }
}
