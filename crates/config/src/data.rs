//! Configuration data model
//!
//! [`ConfigurationData`] composes the per-concern config sections plus API
//! credentials and sync bookkeeping. Instances exist at three layers:
//! SDK defaults (code-level), remote configuration (fetched), and runtime
//! options (per request); the resolver merges them.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a configuration snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Remote,
    Local,
    #[default]
    Defaults,
    Consumer,
}

/// On-device versus remote execution preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Prefer on-device execution when a local model is available
    #[serde(default = "default_true")]
    pub prefer_on_device: bool,
    /// Permit falling back to a remote endpoint
    #[serde(default)]
    pub allow_remote: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            prefer_on_device: true,
            allow_remote: false,
        }
    }
}

/// Hard cap applied after layer resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub max_tokens_per_request: u32,
}

/// Generation defaults for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_budget: Option<TokenBudget>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: Some(256),
            temperature: Some(0.7),
            top_p: Some(0.9),
            stop_sequences: Vec::new(),
            system_prompt: None,
            token_budget: None,
        }
    }
}

/// Model storage locations and memory limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for per-model folders
    pub model_root: PathBuf,
    /// Optional cap on total cached model bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cache_bytes: Option<u64>,
    /// Memory-pressure eviction keeps unloading until available memory
    /// rises above this threshold
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold_bytes: u64,
}

fn default_memory_threshold() -> u64 {
    512 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            model_root: PathBuf::from("models"),
            max_cache_bytes: None,
            memory_threshold_bytes: default_memory_threshold(),
        }
    }
}

/// Backend API endpoints used by the assignment fetcher and telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_timeout", with = "duration_secs")]
    pub timeout: Duration,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
}

fn default_base_url() -> String {
    "https://api.edgekit.dev/v1".to_string()
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retry_count() -> u32 {
    3
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: default_api_timeout(),
            retry_count: default_retry_count(),
        }
    }
}

/// Telemetry queue tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Flush when this many events are buffered
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval", with = "duration_secs")]
    pub flush_interval: Duration,
    /// Hard buffer cap; overflow drops oldest
    #[serde(default = "default_max_buffer")]
    pub max_buffered_events: usize,
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_max_buffer() -> usize {
    1000
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: default_batch_size(),
            flush_interval: default_flush_interval(),
            max_buffered_events: default_max_buffer(),
        }
    }
}

/// Model download tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,
    /// Minimum interval between progress events
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_concurrent_downloads() -> usize {
    2
}

fn default_progress_interval_ms() -> u64 {
    250
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            concurrent_downloads: default_concurrent_downloads(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

/// Optional accelerator preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HardwareConfig {
    #[serde(default)]
    pub prefer_gpu: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_threads: Option<usize>,
}

/// Per-stage pipeline timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimeouts {
    #[serde(with = "duration_secs")]
    pub llm: Duration,
    #[serde(with = "duration_secs")]
    pub tts: Duration,
    /// STT timeout is this multiplier times the audio duration
    pub stt_audio_multiplier: u32,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            llm: Duration::from_secs(30),
            tts: Duration::from_secs(15),
            stt_audio_multiplier: 2,
        }
    }
}

/// Full configuration snapshot for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationData {
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware: Option<HardwareConfig>,
    #[serde(default)]
    pub timeouts: StageTimeouts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// When false, runtime options are clamped to the remote values
    #[serde(default = "default_true")]
    pub allow_user_override: bool,
    #[serde(default)]
    pub source: ConfigSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sync_pending: bool,
}

impl Default for ConfigurationData {
    fn default() -> Self {
        Self {
            routing: RoutingConfig::default(),
            generation: GenerationConfig::default(),
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
            telemetry: TelemetryConfig::default(),
            download: DownloadConfig::default(),
            hardware: None,
            timeouts: StageTimeouts::default(),
            api_key: None,
            allow_user_override: true,
            source: ConfigSource::Defaults,
            updated_at: None,
            sync_pending: false,
        }
    }
}

impl ConfigurationData {
    /// Code-level SDK defaults, the bottom layer of resolution.
    pub fn sdk_defaults() -> Self {
        Self {
            updated_at: Some(Utc::now()),
            ..Default::default()
        }
    }
}

fn default_true() -> bool {
    true
}

mod duration_secs {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConfigurationData::sdk_defaults();
        assert_eq!(config.generation.max_tokens, Some(256));
        assert_eq!(config.generation.temperature, Some(0.7));
        assert!(config.allow_user_override);
        assert_eq!(config.source, ConfigSource::Defaults);
        assert_eq!(config.timeouts.llm, Duration::from_secs(30));
        assert_eq!(config.timeouts.tts, Duration::from_secs(15));
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = ConfigurationData::sdk_defaults();
        let json = serde_json::to_string(&config).unwrap();
        let back: ConfigurationData = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: ConfigurationData = serde_json::from_str("{}").unwrap();
        assert_eq!(config.telemetry.max_buffered_events, 1000);
        assert_eq!(config.api.retry_count, 3);
    }
}
