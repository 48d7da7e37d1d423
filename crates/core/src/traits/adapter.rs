//! Framework adapter seam
//!
//! An adapter knows how to turn a model file of a supported format into a
//! live service for one framework. Adapters are selected by the adapter
//! registry; download behavior can be customized per adapter through
//! [`DownloadStrategy`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::model::{Framework, ModelCategory, ModelFormat, ModelInfo};
use crate::traits::provider::ServiceHandle;

/// Direction of data through a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Modality {
    TextToText,
    VoiceToText,
    TextToVoice,
    ImageToText,
    TextToImage,
    Multimodal,
}

impl Modality {
    pub fn for_category(category: ModelCategory) -> Self {
        match category {
            ModelCategory::Language => Self::TextToText,
            ModelCategory::SpeechRecognition => Self::VoiceToText,
            ModelCategory::SpeechSynthesis => Self::TextToVoice,
            ModelCategory::Vision => Self::ImageToText,
            ModelCategory::ImageGeneration => Self::TextToImage,
            ModelCategory::Multimodal => Self::Multimodal,
            ModelCategory::Audio => Self::VoiceToText,
        }
    }
}

/// Bytes-downloaded / total callback for progress events.
pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Contract a model file downloader must satisfy.
///
/// The default strategy is HTTP; adapters may substitute their own (e.g. a
/// hub client with auth). Implementations must observe `cancel` between
/// chunks and must not leave partial files behind on failure.
#[async_trait]
pub trait DownloadStrategy: Send + Sync {
    /// Download `url` to exactly `dest`, returning the byte count.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<u64>;
}

/// Adapter from a model format to live services for one framework.
#[async_trait]
pub trait FrameworkAdapter: Send + Sync {
    fn framework(&self) -> Framework;

    fn supported_modalities(&self) -> Vec<Modality>;

    fn supported_formats(&self) -> Vec<ModelFormat>;

    /// Whether the adapter can load this model. The default matches on
    /// format and category modality.
    fn can_handle(&self, model: &ModelInfo) -> bool {
        self.supported_formats().contains(&model.format)
            && self
                .supported_modalities()
                .contains(&Modality::for_category(model.category))
    }

    /// Load the model rooted at `local_path` into a live service.
    async fn load_model(&self, model: &ModelInfo, local_path: &Path) -> Result<ServiceHandle>;

    /// Models this adapter ships built-in (e.g. an OS-provided voice).
    fn provided_models(&self) -> Vec<ModelInfo> {
        Vec::new()
    }

    /// Adapter-specific downloader; `None` uses the SDK default.
    fn download_strategy(&self) -> Option<Arc<dyn DownloadStrategy>> {
        None
    }
}
