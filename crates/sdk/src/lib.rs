//! EdgeKit SDK facade
//!
//! The single stable entry point host applications build against.
//! [`EdgeKit`] owns the service container, maps internal errors onto the
//! small public surface, and exposes model management, generation, voice
//! pipelines, telemetry consent, and teardown.
//!
//! ```ignore
//! let sdk = EdgeKit::builder()
//!     .with_store_in_memory()
//!     .build()?;
//! sdk.register_adapter(Arc::new(LlamaCppAdapter::new()), 10);
//! sdk.register_model(model)?;
//! let reply = sdk.generate("m1", "Hello", &GenerationOptions::new()).await?;
//! ```

pub mod platform;

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use edgekit_config::ConfigurationData;
use edgekit_core::{
    CancellationToken, Capability, ErrorCode, EventBus, FinishReason, FrameworkAdapter,
    GeneratedToken, GenerationOptions, GenerationResult, ModelInfo, PlatformAdapter,
    ProviderConfig, PublicError, Result, SdkError, ServiceHandle, ServiceProvider, TokenSink,
};
use edgekit_llm::StreamingEngine;
use edgekit_persistence::Store;
use edgekit_pipeline::{VoicePipeline, VoicePipelineConfig, VoiceServices};
use edgekit_runtime::ServiceContainer;
use edgekit_telemetry::TelemetryConsent;

pub use edgekit_core as core;
pub use platform::StdPlatform;

/// Results crossing the public boundary.
pub type PublicResult<T> = std::result::Result<T, PublicError>;

/// Capability wiring for one voice pipeline.
#[derive(Debug, Clone, Default)]
pub struct VoicePipelineSpec {
    pub config: VoicePipelineConfig,
    /// Language model id; required
    pub llm_model: String,
    /// Model ids per capability; `None` falls back to the registered
    /// fallback provider for that capability
    pub stt_model: Option<String>,
    pub tts_model: Option<String>,
    pub vad_model: Option<String>,
    pub diarization_model: Option<String>,
    /// Enable the diarization overlay
    pub diarization: bool,
}

/// Builder for [`EdgeKit`].
pub struct EdgeKitBuilder {
    defaults: ConfigurationData,
    platform: Option<Arc<dyn PlatformAdapter>>,
    store: Option<Arc<Store>>,
    consent: TelemetryConsent,
    init_tracing: bool,
}

impl EdgeKitBuilder {
    fn new() -> Self {
        Self {
            defaults: ConfigurationData::sdk_defaults(),
            platform: None,
            store: None,
            consent: TelemetryConsent::NotDetermined,
            init_tracing: false,
        }
    }

    pub fn with_config(mut self, defaults: ConfigurationData) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_model_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.defaults.storage.model_root = root.into();
        self
    }

    pub fn with_platform(mut self, platform: Arc<dyn PlatformAdapter>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Use an in-memory store; state does not survive the process.
    pub fn with_store_in_memory(mut self) -> Self {
        self.store = Store::open_in_memory().ok().map(Arc::new);
        self
    }

    pub fn with_store(mut self, store: Arc<Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_telemetry_consent(mut self, consent: TelemetryConsent) -> Self {
        self.consent = consent;
        self
    }

    /// Install a tracing subscriber with env-filter. Skips quietly when
    /// the host already installed one.
    pub fn with_tracing(mut self) -> Self {
        self.init_tracing = true;
        self
    }

    pub fn build(self) -> PublicResult<EdgeKit> {
        if self.init_tracing {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .try_init();
        }

        let platform = self
            .platform
            .unwrap_or_else(|| Arc::new(StdPlatform::new()));

        let store = match self.store {
            Some(store) => store,
            None => {
                let path = self.defaults.storage.model_root.join(".edgekit.db");
                Arc::new(Store::open(&path).map_err(|e| PublicError::from(SdkError::from(e)))?)
            }
        };

        let container = ServiceContainer::init(self.defaults, platform, store)
            .map_err(|e| PublicError::from(&e))?;
        container.telemetry().set_consent(self.consent);

        Ok(EdgeKit {
            container,
            last_error: Mutex::new(None),
        })
    }
}

/// The on-device AI runtime.
pub struct EdgeKit {
    container: Arc<ServiceContainer>,
    last_error: Mutex<Option<SdkError>>,
}

impl EdgeKit {
    pub fn builder() -> EdgeKitBuilder {
        EdgeKitBuilder::new()
    }

    /// The typed event bus; subscribe for lifecycle, generation, voice,
    /// and analytics events.
    pub fn events(&self) -> &EventBus {
        self.container.bus()
    }

    /// Richer diagnostics for the most recent public error.
    pub fn last_error(&self) -> Option<SdkError> {
        self.last_error.lock().clone()
    }

    // ---- registries ----

    pub fn register_adapter(&self, adapter: Arc<dyn FrameworkAdapter>, priority: i32) {
        self.container.adapters().register(adapter, priority);
    }

    pub fn register_provider(
        &self,
        capability: Capability,
        provider: Arc<dyn ServiceProvider>,
        priority: i32,
    ) -> PublicResult<()> {
        let result = self.container.modules().register(capability, provider, priority);
        self.public(result)
    }

    pub fn register_model(&self, model: ModelInfo) -> PublicResult<()> {
        let result = self.container.models().register(model);
        self.public(result)
    }

    pub fn model(&self, id: &str) -> Option<ModelInfo> {
        self.container.models().lookup(id)
    }

    pub fn models(&self) -> Vec<ModelInfo> {
        self.container.models().enumerate()
    }

    pub fn delete_model(&self, id: &str) -> PublicResult<bool> {
        let result = self.container.models().remove(id);
        self.public(result)
    }

    /// Scan the model root and link files already on disk to registered
    /// models. Idempotent.
    pub fn discover_downloaded_models(&self) -> PublicResult<usize> {
        let result = self.container.models().discover_downloaded();
        self.public(result)
    }

    /// Pull device assignments and merge them into the registry.
    pub async fn fetch_model_assignments(&self, force_refresh: bool) -> PublicResult<usize> {
        let result = self
            .container
            .assignments()
            .fetch_and_merge(self.container.models(), force_refresh)
            .await;
        self.public(result)
    }

    // ---- model loading ----

    pub async fn load_model(&self, model_id: &str) -> PublicResult<()> {
        let result = self
            .container
            .loading()
            .load_model(model_id, &CancellationToken::new())
            .await
            .map(|_| ());
        self.public(result)
    }

    pub async fn unload_model(&self, model_id: &str) -> PublicResult<bool> {
        let result = self.container.loading().unload(model_id).await;
        self.public(result)
    }

    pub fn is_model_loaded(&self, model_id: &str) -> bool {
        self.container.loading().is_loaded(model_id)
    }

    /// Host memory-pressure signal; evicts LRU models until the
    /// configured threshold is met.
    pub async fn handle_memory_pressure(&self) {
        self.container.loading().handle_memory_pressure().await;
    }

    // ---- generation ----

    /// Generate to completion. The model is loaded on demand.
    pub async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> PublicResult<GenerationResult> {
        let cancel = CancellationToken::new();
        let result = self
            .generate_inner(model_id, prompt, options, None, &cancel)
            .await;
        self.public(result)
    }

    /// Streaming generation; `on_token` returning `false` stops the
    /// stream and completes.
    pub async fn stream_generate<F>(
        &self,
        model_id: &str,
        prompt: &str,
        options: &GenerationOptions,
        cancel: &CancellationToken,
        on_token: F,
    ) -> PublicResult<GenerationResult>
    where
        F: FnMut(&GeneratedToken) -> bool + Send,
    {
        let mut sink = edgekit_core::FnSink(on_token);
        let result = self
            .generate_inner(model_id, prompt, options, Some(&mut sink), cancel)
            .await;
        self.public(result)
    }

    async fn generate_inner(
        &self,
        model_id: &str,
        prompt: &str,
        options: &GenerationOptions,
        sink: Option<&mut dyn TokenSink>,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        let loaded = self
            .container
            .loading()
            .load_model(model_id, cancel)
            .await?;
        let llm = loaded.service.as_llm().ok_or_else(|| {
            SdkError::new(
                ErrorCode::UnsupportedModality,
                format!("model {model_id} does not provide a language service"),
            )
        })?;

        let engine: &Arc<StreamingEngine> = self.container.engine();
        let result = match sink {
            Some(sink) => {
                engine
                    .stream(llm, &loaded.info, prompt, options, sink, cancel)
                    .await?
            }
            None => {
                engine
                    .generate(llm, &loaded.info, prompt, options, cancel)
                    .await?
            }
        };

        if result.finish_reason == FinishReason::Cancelled {
            return Err(SdkError::new(ErrorCode::Cancelled, "generation cancelled"));
        }
        Ok(result)
    }

    // ---- voice ----

    /// Build a voice pipeline over loaded models, falling back to the
    /// registered fallback providers for capabilities without a model id.
    pub async fn create_voice_pipeline(
        &self,
        spec: VoicePipelineSpec,
    ) -> PublicResult<VoicePipeline> {
        let result = self.create_voice_pipeline_inner(spec).await;
        self.public(result)
    }

    async fn create_voice_pipeline_inner(
        &self,
        spec: VoicePipelineSpec,
    ) -> Result<VoicePipeline> {
        let cancel = CancellationToken::new();

        let loaded_llm = self
            .container
            .loading()
            .load_model(&spec.llm_model, &cancel)
            .await?;
        let llm = loaded_llm.service.as_llm().ok_or_else(|| {
            SdkError::new(
                ErrorCode::UnsupportedModality,
                format!("model {} does not provide a language service", spec.llm_model),
            )
        })?;

        let stt = self
            .resolve_service(Capability::Stt, spec.stt_model.as_deref(), &cancel)
            .await?
            .as_stt()
            .ok_or_else(|| service_kind_error(Capability::Stt))?;
        let tts = self
            .resolve_service(Capability::Tts, spec.tts_model.as_deref(), &cancel)
            .await?
            .as_tts()
            .ok_or_else(|| service_kind_error(Capability::Tts))?;
        let vad = self
            .resolve_service(Capability::Vad, spec.vad_model.as_deref(), &cancel)
            .await?
            .as_vad()
            .ok_or_else(|| service_kind_error(Capability::Vad))?;

        let diarization = if spec.diarization {
            Some(
                self.resolve_service(
                    Capability::Diarization,
                    spec.diarization_model.as_deref(),
                    &cancel,
                )
                .await?
                .as_diarization()
                .ok_or_else(|| service_kind_error(Capability::Diarization))?,
            )
        } else {
            None
        };

        let mut config = spec.config;
        config.diarization = spec.diarization;

        let services = VoiceServices {
            vad,
            stt,
            llm,
            llm_model: loaded_llm.info.clone(),
            tts,
            diarization,
        };

        Ok(VoicePipeline::new(
            config,
            services,
            self.container.engine().clone(),
            self.container.bus().clone(),
        ))
    }

    async fn resolve_service(
        &self,
        capability: Capability,
        model_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ServiceHandle> {
        if let Some(model_id) = model_id {
            let loaded = self.container.loading().load_model(model_id, cancel).await?;
            return Ok(loaded.service.clone());
        }

        let provider = self
            .container
            .modules()
            .provider_for(capability, None)
            .ok_or_else(|| {
                SdkError::new(
                    ErrorCode::FrameworkNotAvailable,
                    format!("no fallback provider registered for {capability}"),
                )
            })?;
        provider.create_service(&ProviderConfig::default()).await
    }

    // ---- telemetry ----

    pub fn set_telemetry_consent(&self, consent: TelemetryConsent) {
        self.container.telemetry().set_consent(consent);
    }

    pub async fn flush_telemetry(&self) -> PublicResult<usize> {
        let result = self.container.telemetry().flush().await;
        self.public(result)
    }

    // ---- lifecycle ----

    /// Tear the runtime down in reverse construction order.
    pub async fn shutdown(&self) {
        self.container.teardown().await;
    }

    fn public<T>(&self, result: Result<T>) -> PublicResult<T> {
        result.map_err(|e| {
            e.log();
            let public = PublicError::from(&e);
            *self.last_error.lock() = Some(e);
            public
        })
    }
}

fn service_kind_error(capability: Capability) -> SdkError {
    SdkError::new(
        ErrorCode::UnsupportedModality,
        format!("resolved service does not implement {capability}"),
    )
}
