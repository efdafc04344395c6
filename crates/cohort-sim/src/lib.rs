//! cohort-sim library.
//!
//! Deterministic coaching-network fixtures for tests, benches, and the
//! `cohort generate` command.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod fixture;

pub use fixture::{DEFAULT_VERSION, FixtureSpec, Shape, identifier};
