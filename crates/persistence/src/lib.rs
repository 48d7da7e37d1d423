//! Embedded local store
//!
//! Backs the model registry, the telemetry queue, and configuration with a
//! bundled SQLite database. See [`store::Store`].

pub mod schema;
pub mod store;

pub use store::{Store, StoreError, StoreResult, TelemetryRow};
