//! Service provider seam for the module registry

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{ModelCategory, ModelInfo};
use crate::traits::llm::LlmService;
use crate::traits::speech::{SpeakerDiarizationService, SttService, TtsService, VadService};

/// One pluggable capability of the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Llm,
    Stt,
    Tts,
    Vad,
    Diarization,
    Embeddings,
    WakeWord,
    Vlm,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Stt => "stt",
            Self::Tts => "tts",
            Self::Vad => "vad",
            Self::Diarization => "diarization",
            Self::Embeddings => "embeddings",
            Self::WakeWord => "wake_word",
            Self::Vlm => "vlm",
        }
    }

    /// Capability that loads models of the given category.
    pub fn for_category(category: ModelCategory) -> Self {
        match category {
            ModelCategory::Language => Self::Llm,
            ModelCategory::SpeechRecognition => Self::Stt,
            ModelCategory::SpeechSynthesis => Self::Tts,
            ModelCategory::Vision | ModelCategory::ImageGeneration => Self::Vlm,
            ModelCategory::Multimodal => Self::Vlm,
            ModelCategory::Audio => Self::Vad,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live, capability-tagged service instance.
///
/// Services are trait objects behind `Arc`; the loading service and the
/// voice pipeline share them freely across tasks.
#[derive(Clone)]
pub enum ServiceHandle {
    Llm(Arc<dyn LlmService>),
    Stt(Arc<dyn SttService>),
    Tts(Arc<dyn TtsService>),
    Vad(Arc<dyn VadService>),
    Diarization(Arc<dyn SpeakerDiarizationService>),
}

impl ServiceHandle {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Llm(_) => Capability::Llm,
            Self::Stt(_) => Capability::Stt,
            Self::Tts(_) => Capability::Tts,
            Self::Vad(_) => Capability::Vad,
            Self::Diarization(_) => Capability::Diarization,
        }
    }

    pub fn as_llm(&self) -> Option<Arc<dyn LlmService>> {
        match self {
            Self::Llm(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_stt(&self) -> Option<Arc<dyn SttService>> {
        match self {
            Self::Stt(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_tts(&self) -> Option<Arc<dyn TtsService>> {
        match self {
            Self::Tts(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_vad(&self) -> Option<Arc<dyn VadService>> {
        match self {
            Self::Vad(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_diarization(&self) -> Option<Arc<dyn SpeakerDiarizationService>> {
        match self {
            Self::Diarization(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ServiceHandle")
            .field(&self.capability())
            .finish()
    }
}

/// Input to `ServiceProvider::create_service`.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub model: Option<ModelInfo>,
    pub model_path: Option<PathBuf>,
    /// Provider-specific settings, pass-through
    pub extra: serde_json::Value,
}

impl ProviderConfig {
    pub fn for_model(model: ModelInfo, model_path: Option<PathBuf>) -> Self {
        Self {
            model: Some(model),
            model_path,
            extra: serde_json::Value::Null,
        }
    }
}

/// Factory for services of one capability, pluggable into the module
/// registry with a priority and a `can_handle` predicate.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    fn name(&self) -> &str;

    fn capability(&self) -> Capability;

    /// Whether this provider can serve the given model. `None` asks about
    /// the capability fallback (no specific model).
    fn can_handle(&self, model: Option<&ModelInfo>) -> bool;

    async fn create_service(&self, config: &ProviderConfig) -> Result<ServiceHandle>;
}
