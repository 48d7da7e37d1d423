//! Runtime orchestration: component lifecycle, model loading, container
//!
//! The pieces every capability shares: the lifecycle state machine
//! ([`component::Component`]), the single-flight model loader
//! ([`loading::ModelLoadingService`]), the default HTTP download strategy,
//! and the process-wide [`container::ServiceContainer`].

pub mod component;
pub mod container;
pub mod download;
pub mod loading;

pub use component::{Component, ComponentState};
pub use container::ServiceContainer;
pub use download::HttpDownloadStrategy;
pub use loading::{LoadedModel, ModelLoadingService};
