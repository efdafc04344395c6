#![forbid(unsafe_code)]
//! cohort-core library.
//!
//! Builds an undirected relation graph from `(identifier, neighbors)` records,
//! partitions it into connected components, and selects whole components to
//! move to a new version.
//!
//! # Conventions
//!
//! - **Errors**: library operations return [`error::RolloutError`]; binaries
//!   wrap it in `anyhow`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod error;
pub mod graph;
pub mod lock;
pub mod record;
pub mod rollout;
pub mod select;
pub mod store;
pub mod timing;

pub use error::{ErrorCode, RolloutError};
pub use graph::{ComponentId, Partition, PartitionStats, RelationGraph};
pub use record::Record;
pub use rollout::{
    InfeasibleReport, LimitedOutcome, LimitedRequest, LimitedSelection, RolloutEngine, RolloutOptions,
    RolloutReport, TargetSpec,
};
pub use select::{SubsetSelection, Tolerance};
pub use store::FlatFileStore;
