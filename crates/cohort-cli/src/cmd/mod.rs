pub mod completions;
pub mod generate;
pub mod limited;
pub mod stats;
pub mod total;

use std::path::PathBuf;

use cohort_core::config::ProjectConfig;
use cohort_core::graph::DuplicateNeighborPolicy;
use cohort_core::rollout::RolloutOptions;
use cohort_core::FlatFileStore;

/// Settings shared by every store-backed command.
#[derive(Debug, Clone)]
pub struct StoreContext {
    pub config: ProjectConfig,
    pub store_path: PathBuf,
}

impl StoreContext {
    /// Combine the loaded project config with an optional `--store` override.
    pub fn new(config: ProjectConfig, store_override: Option<PathBuf>) -> Self {
        let store_path = store_override.unwrap_or_else(|| config.store.path.clone());
        Self { config, store_path }
    }

    pub fn store(&self) -> FlatFileStore {
        FlatFileStore::open(&self.store_path).with_lock_timeout(self.config.store.lock_timeout())
    }

    pub const fn policy(&self) -> DuplicateNeighborPolicy {
        self.config.graph.duplicate_neighbors
    }

    pub const fn options(&self, dry_run: bool) -> RolloutOptions {
        RolloutOptions {
            dry_run,
            duplicate_neighbors: self.policy(),
        }
    }
}
