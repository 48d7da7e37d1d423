//! Assignment fetcher
//!
//! Pulls device-specific model assignments from the backend and merges
//! them into the model registry as `source = remote`. Successful fetches
//! are cached in the configuration table; a failed fetch with a fresh
//! cache falls back to the cached payload.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use edgekit_core::{
    error_context, DeviceInfo, ErrorCode, Framework, ModelCategory, ModelInfo, ModelSource,
    Result, SdkError,
};
use edgekit_persistence::Store;

use crate::models::ModelRegistry;

/// How long a cached assignment payload counts as fresh.
const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Credential source for authenticated endpoints. The refresh path is
/// invoked at most once per request on `unauthorized`.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    fn current(&self) -> Option<String>;

    async fn refresh(&self) -> Result<String>;
}

/// One model descriptor as served by the assignments endpoint. Field
/// names are part of the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentDescriptor {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub memory_required: Option<u64>,
    #[serde(default)]
    pub compatible_frameworks: Vec<String>,
    #[serde(default)]
    pub preferred_framework: Option<String>,
    #[serde(default)]
    pub context_length: Option<u32>,
    #[serde(default)]
    pub supports_thinking: Option<bool>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedAssignments {
    fetched_at: DateTime<Utc>,
    assignments: Vec<AssignmentDescriptor>,
}

/// Fetches model assignments for the current device.
pub struct AssignmentFetcher {
    client: reqwest::Client,
    base_url: String,
    device: DeviceInfo,
    store: Arc<Store>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    retry_count: u32,
}

impl AssignmentFetcher {
    pub fn new(
        base_url: impl Into<String>,
        device: DeviceInfo,
        store: Arc<Store>,
        timeout: Duration,
        retry_count: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                SdkError::new(ErrorCode::InvalidConfig, "failed to create HTTP client")
                    .with_source(e)
            })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            device,
            store,
            token_provider: None,
            retry_count,
        })
    }

    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    fn cache_key(&self) -> String {
        format!(
            "model_assignments:{}:{}",
            self.device.device_type, self.device.platform
        )
    }

    fn assignments_url(&self) -> String {
        format!(
            "{}/model-assignments/for-sdk?device_type={}&platform={}",
            self.base_url.trim_end_matches('/'),
            self.device.device_type,
            self.device.platform
        )
    }

    /// Fetch assignments, preferring a fresh cache unless `force_refresh`.
    pub async fn fetch(&self, force_refresh: bool) -> Result<Vec<ModelInfo>> {
        if !force_refresh {
            if let Some(cached) = self.read_cache(true) {
                tracing::debug!(count = cached.len(), "Using fresh cached model assignments");
                return Ok(cached);
            }
        }

        match self.fetch_remote().await {
            Ok(descriptors) => {
                self.write_cache(&descriptors);
                Ok(to_models(descriptors))
            }
            Err(e) => {
                // Any cached payload beats an empty registry on failure.
                if let Some(cached) = self.read_cache(false) {
                    tracing::warn!(
                        error = %e,
                        count = cached.len(),
                        "Assignment fetch failed, falling back to cache"
                    );
                    return Ok(cached);
                }
                Err(e)
            }
        }
    }

    /// Fetch and register everything into the registry as remote models.
    pub async fn fetch_and_merge(
        &self,
        registry: &ModelRegistry,
        force_refresh: bool,
    ) -> Result<usize> {
        let models = self.fetch(force_refresh).await?;
        let count = models.len();
        for model in models {
            registry.register(model)?;
        }
        registry.flush_pending_registrations()?;
        tracing::info!(merged = count, "Merged model assignments into registry");
        Ok(count)
    }

    async fn fetch_remote(&self) -> Result<Vec<AssignmentDescriptor>> {
        let mut backoff = Duration::from_millis(200);
        let mut refreshed_token = false;
        let mut last_error: Option<SdkError> = None;

        for attempt in 0..=self.retry_count {
            if attempt > 0 {
                let jitter = 0.8 + rand::random::<f64>() * 0.4;
                let delay = backoff.mul_f64(jitter);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying assignment fetch"
                );
                tokio::time::sleep(delay).await;
                backoff *= 2;
            }

            match self.execute_request().await {
                Ok(descriptors) => return Ok(descriptors),
                Err(e) if e.code() == ErrorCode::Unauthorized && !refreshed_token => {
                    let Some(provider) = &self.token_provider else {
                        return Err(SdkError::new(
                            ErrorCode::AuthenticationFailed,
                            "assignments endpoint rejected credentials",
                        )
                        .with_context(error_context!()));
                    };
                    refreshed_token = true;
                    if provider.refresh().await.is_err() {
                        return Err(SdkError::new(
                            ErrorCode::AuthenticationFailed,
                            "token refresh failed",
                        )
                        .with_context(error_context!()));
                    }
                    // One immediate retry with the refreshed token; a
                    // second rejection is an authentication failure.
                    match self.execute_request().await {
                        Ok(descriptors) => return Ok(descriptors),
                        Err(e2) if e2.code() == ErrorCode::Unauthorized => {
                            return Err(SdkError::new(
                                ErrorCode::AuthenticationFailed,
                                "credentials rejected after refresh",
                            )
                            .with_context(error_context!()));
                        }
                        Err(e2) if e2.is_transient() => last_error = Some(e2),
                        Err(e2) => return Err(e2),
                    }
                }
                Err(e) if e.is_transient() => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SdkError::new(ErrorCode::NetworkUnavailable, "assignment fetch retries exhausted")
        }))
    }

    async fn execute_request(&self) -> Result<Vec<AssignmentDescriptor>> {
        let mut request = self.client.get(self.assignments_url());
        if let Some(token) = self.token_provider.as_ref().and_then(|p| p.current()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SdkError::new(ErrorCode::Unauthorized, "unauthorized"));
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(SdkError::new(ErrorCode::Forbidden, "forbidden"));
        }
        if !status.is_success() {
            return Err(SdkError::new(
                ErrorCode::HttpError,
                format!("assignments endpoint returned {status}"),
            )
            .with_http_status(status.as_u16()));
        }

        response
            .json::<Vec<AssignmentDescriptor>>()
            .await
            .map_err(|e| {
                SdkError::new(
                    ErrorCode::NetworkValidationFailed,
                    "assignments payload failed to parse",
                )
                .with_source(e)
            })
    }

    fn read_cache(&self, require_fresh: bool) -> Option<Vec<ModelInfo>> {
        let raw = self.store.load_configuration(&self.cache_key()).ok()??;
        let cached: CachedAssignments = serde_json::from_str(&raw).ok()?;

        if require_fresh {
            let age = Utc::now().signed_duration_since(cached.fetched_at);
            if age.num_seconds() < 0 || age.num_seconds() as u64 > CACHE_TTL.as_secs() {
                return None;
            }
        }
        Some(to_models(cached.assignments))
    }

    fn write_cache(&self, descriptors: &[AssignmentDescriptor]) {
        let cached = CachedAssignments {
            fetched_at: Utc::now(),
            assignments: descriptors.to_vec(),
        };
        match serde_json::to_string(&cached) {
            Ok(json) => {
                if let Err(e) = self
                    .store
                    .save_configuration(&self.cache_key(), &json, "remote")
                {
                    tracing::warn!(error = %e, "Failed to cache model assignments");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize assignment cache"),
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> SdkError {
    let code = if e.is_timeout() {
        ErrorCode::NetworkTimeout
    } else {
        ErrorCode::NetworkUnavailable
    };
    SdkError::new(code, e.to_string()).with_source(e)
}

fn to_models(descriptors: Vec<AssignmentDescriptor>) -> Vec<ModelInfo> {
    descriptors
        .into_iter()
        .filter_map(|d| match to_model(&d) {
            Some(model) => Some(model),
            None => {
                tracing::warn!(id = %d.id, category = %d.category, "Skipping assignment with unknown category");
                None
            }
        })
        .collect()
}

fn to_model(descriptor: &AssignmentDescriptor) -> Option<ModelInfo> {
    let category = parse_tag::<ModelCategory>(&descriptor.category)?;

    let mut model = ModelInfo::new(&descriptor.id, &descriptor.name, category)
        .with_source(ModelSource::Remote);

    if let Some(url) = &descriptor.download_url {
        model = model.with_download_url(url.clone());
    }
    if let Some(format) = descriptor
        .format
        .as_deref()
        .and_then(parse_tag::<edgekit_core::ModelFormat>)
    {
        model.format = format;
    }
    model.download_size = descriptor.size;
    model.memory_required = descriptor.memory_required;
    model.compatible_frameworks = descriptor
        .compatible_frameworks
        .iter()
        .filter_map(|f| parse_tag::<Framework>(f))
        .collect();
    if let Some(preferred) = descriptor
        .preferred_framework
        .as_deref()
        .and_then(parse_tag::<Framework>)
    {
        model = model.with_preferred_framework(preferred);
    }
    model.context_length = descriptor.context_length;
    model.supports_thinking = descriptor.supports_thinking.unwrap_or(false);

    model.normalized().ok()
}

fn parse_tag<T: serde::de::DeserializeOwned>(tag: &str) -> Option<T> {
    serde_json::from_str(&format!("\"{tag}\"")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> AssignmentDescriptor {
        AssignmentDescriptor {
            id: id.to_string(),
            name: format!("Model {id}"),
            category: "language".to_string(),
            format: Some("gguf".to_string()),
            download_url: Some(format!("https://host/{id}/weights.gguf")),
            size: Some(1024),
            memory_required: Some(2048),
            compatible_frameworks: vec!["llama-cpp".to_string(), "bogus".to_string()],
            preferred_framework: Some("llama-cpp".to_string()),
            context_length: Some(4096),
            supports_thinking: Some(true),
            metadata: None,
        }
    }

    #[test]
    fn test_descriptor_conversion() {
        let model = to_model(&descriptor("m1")).unwrap();
        assert_eq!(model.id, "m1");
        assert_eq!(model.category, ModelCategory::Language);
        assert_eq!(model.source, ModelSource::Remote);
        assert_eq!(model.preferred_framework, Some(Framework::LlamaCpp));
        // unknown framework strings are dropped, known ones parsed
        assert_eq!(model.compatible_frameworks, vec![Framework::LlamaCpp]);
        assert!(model.supports_thinking);
    }

    #[test]
    fn test_unknown_category_is_skipped() {
        let mut bad = descriptor("m1");
        bad.category = "galaxy-brain".to_string();
        assert_eq!(to_models(vec![bad]).len(), 0);
    }

    #[test]
    fn test_wire_field_names() {
        let json = r#"{
            "id": "m1",
            "name": "Model",
            "category": "speech-recognition",
            "download_url": "https://host/m1/model.onnx",
            "compatible_frameworks": ["onnx-runtime"],
            "context_length": null
        }"#;
        let descriptor: AssignmentDescriptor = serde_json::from_str(json).unwrap();
        let model = to_model(&descriptor).unwrap();
        assert_eq!(model.category, ModelCategory::SpeechRecognition);
        assert_eq!(model.format, edgekit_core::ModelFormat::Onnx);
        assert_eq!(model.compatible_frameworks, vec![Framework::OnnxRuntime]);
    }

    #[tokio::test]
    async fn test_cache_fallback_on_network_failure() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let fetcher = AssignmentFetcher::new(
            // Unroutable endpoint; every fetch fails fast.
            "http://127.0.0.1:1",
            DeviceInfo::with_id("d1".into()),
            store.clone(),
            Duration::from_millis(200),
            0,
        )
        .unwrap();

        // No cache yet: the failure surfaces.
        assert!(fetcher.fetch(true).await.is_err());

        // Seed the cache, then the same failure falls back to it.
        fetcher.write_cache(&[descriptor("m1"), descriptor("m2")]);
        let models = fetcher.fetch(true).await.unwrap();
        assert_eq!(models.len(), 2);
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_network() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let fetcher = AssignmentFetcher::new(
            "http://127.0.0.1:1",
            DeviceInfo::with_id("d1".into()),
            store,
            Duration::from_millis(200),
            0,
        )
        .unwrap();

        fetcher.write_cache(&[descriptor("m1")]);
        let models = fetcher.fetch(false).await.unwrap();
        assert_eq!(models.len(), 1);
    }

    #[tokio::test]
    async fn test_merge_into_registry() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(store.clone(), dir.path()).unwrap();
        let fetcher = AssignmentFetcher::new(
            "http://127.0.0.1:1",
            DeviceInfo::with_id("d1".into()),
            store,
            Duration::from_millis(200),
            0,
        )
        .unwrap();
        fetcher.write_cache(&[descriptor("m1"), descriptor("m2")]);

        let merged = fetcher.fetch_and_merge(&registry, false).await.unwrap();
        assert_eq!(merged, 2);
        let models = registry.enumerate();
        assert_eq!(models.len(), 2);
        assert!(models.iter().all(|m| m.source == ModelSource::Remote));

        // Local re-registration replaces the remote entry.
        let local = ModelInfo::new("m1", "Local", ModelCategory::Language)
            .with_download_url("https://mirror/m1/weights.gguf")
            .with_source(ModelSource::Local);
        registry.register(local).unwrap();
        let found = registry.lookup("m1").unwrap();
        assert_eq!(found.source, ModelSource::Local);
        assert_eq!(
            found.download_url.as_deref(),
            Some("https://mirror/m1/weights.gguf")
        );
    }
}
