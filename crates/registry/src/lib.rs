//! Provider, adapter, and model registries
//!
//! Three registries with a shared discipline: many readers, single writer,
//! immutable snapshots out. The assignment fetcher merges remote model
//! descriptors into the model registry.

pub mod adapters;
pub mod assignments;
pub mod models;
pub mod modules;

pub use adapters::AdapterRegistry;
pub use assignments::{AssignmentDescriptor, AssignmentFetcher, TokenProvider};
pub use models::ModelRegistry;
pub use modules::ModuleRegistry;
