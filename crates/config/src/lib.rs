//! Configuration data and the three-layer resolver
//!
//! Precedence: runtime options > remote configuration > SDK defaults, with
//! hard limits clamped after resolution. See [`resolver::ConfigResolver`].

pub mod data;
pub mod resolver;

pub use data::{
    ApiConfig, ConfigSource, ConfigurationData, DownloadConfig, GenerationConfig,
    HardwareConfig, RoutingConfig, StageTimeouts, StorageConfig, TelemetryConfig, TokenBudget,
};
pub use resolver::{ConfigResolver, ResolvedOptions};
