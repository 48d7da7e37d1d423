//! Model catalog types
//!
//! [`ModelInfo`] describes one model: identity, on-disk packaging, download
//! source, framework compatibility, and capability flags. Entries are owned
//! by the model registry and persisted to the local store; multi-file lists
//! are additionally cached in-process because the persistent registry does
//! not round-trip arrays.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, Result, SdkError};

/// Default context length applied when a language-capable model omits one.
pub const DEFAULT_CONTEXT_LENGTH: u32 = 2048;

/// Coarse semantic type of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelCategory {
    Language,
    SpeechRecognition,
    SpeechSynthesis,
    Vision,
    ImageGeneration,
    Multimodal,
    Audio,
}

impl ModelCategory {
    /// Language-capable categories must carry a context length.
    pub fn requires_context_length(&self) -> bool {
        matches!(self, Self::Language | Self::Multimodal)
    }

    /// Only reasoning-capable categories may set `supports_thinking`.
    pub fn can_think(&self) -> bool {
        matches!(self, Self::Language | Self::Multimodal)
    }
}

/// On-disk file format of a model artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Gguf,
    Onnx,
    Ort,
    Bin,
    Mlmodel,
    Mlpackage,
    Tflite,
    Safetensors,
    #[default]
    Unknown,
}

/// Archive flavor for `ArtifactType::Archive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveKind {
    Zip,
    TarGz,
    TarBz2,
}

/// One file of a multi-file model. Owned by its parent [`ModelInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub url: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// How a model is packaged on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactType {
    #[default]
    SingleFile,
    Archive {
        format: ArchiveKind,
    },
    MultiFile {
        files: Vec<FileDescriptor>,
    },
    Directory,
}

impl ArtifactType {
    pub fn is_multi_file(&self) -> bool {
        matches!(self, Self::MultiFile { .. })
    }
}

/// Where a registry entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    Remote,
    Local,
    Defaults,
    #[default]
    Consumer,
}

/// Backend inference engine identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framework {
    LlamaCpp,
    OnnxRuntime,
    WhisperKit,
    CoreMl,
    TfLite,
    ExecuTorch,
}

/// Description of one model known to the SDK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub category: ModelCategory,
    #[serde(default)]
    pub format: ModelFormat,
    #[serde(default)]
    pub artifact_type: ArtifactType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_required: Option<u64>,
    #[serde(default)]
    pub compatible_frameworks: Vec<Framework>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_framework: Option<Framework>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u32>,
    #[serde(default)]
    pub supports_thinking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub sync_pending: bool,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: ModelSource,
}

impl ModelInfo {
    /// Create a minimal entry; packaging and source fields come from the
    /// `with_*` builders.
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: ModelCategory) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            category,
            format: ModelFormat::Unknown,
            artifact_type: ArtifactType::SingleFile,
            download_url: None,
            local_path: None,
            download_size: None,
            memory_required: None,
            compatible_frameworks: Vec::new(),
            preferred_framework: None,
            context_length: None,
            supports_thinking: false,
            checksum: None,
            created_at: now,
            updated_at: now,
            sync_pending: false,
            usage_count: 0,
            last_used: None,
            source: ModelSource::Consumer,
        }
    }

    pub fn with_format(mut self, format: ModelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_artifact_type(mut self, artifact_type: ArtifactType) -> Self {
        self.artifact_type = artifact_type;
        self
    }

    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if self.format == ModelFormat::Unknown {
            let (format, archive) = infer_packaging_from_url(&url);
            self.format = format;
            if let Some(kind) = archive {
                self.artifact_type = ArtifactType::Archive { format: kind };
            }
        }
        self.download_url = Some(url);
        self
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn with_frameworks(mut self, frameworks: Vec<Framework>) -> Self {
        self.compatible_frameworks = frameworks;
        self
    }

    pub fn with_preferred_framework(mut self, framework: Framework) -> Self {
        self.preferred_framework = Some(framework);
        if !self.compatible_frameworks.contains(&framework) {
            self.compatible_frameworks.push(framework);
        }
        self
    }

    pub fn with_context_length(mut self, context_length: u32) -> Self {
        self.context_length = Some(context_length);
        self
    }

    pub fn with_thinking(mut self, supports_thinking: bool) -> Self {
        self.supports_thinking = supports_thinking;
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_source(mut self, source: ModelSource) -> Self {
        self.source = source;
        self
    }

    /// Effective context length after defaulting.
    pub fn effective_context_length(&self) -> Option<u32> {
        if self.category.requires_context_length() {
            Some(self.context_length.unwrap_or(DEFAULT_CONTEXT_LENGTH))
        } else {
            self.context_length
        }
    }

    /// Apply the registry invariants and validate the entry.
    ///
    /// - language-capable models get the default context length when unset
    /// - `supports_thinking` is forced off for categories that cannot reason
    /// - multi-file lists must be non-empty with url + filename on each entry
    pub fn normalized(mut self) -> Result<Self> {
        if self.id.trim().is_empty() {
            return Err(SdkError::new(
                ErrorCode::ValidationFailed,
                "model id must not be empty",
            ));
        }

        if self.category.requires_context_length() && self.context_length.is_none() {
            self.context_length = Some(DEFAULT_CONTEXT_LENGTH);
        }
        if !self.category.can_think() {
            self.supports_thinking = false;
        }

        if let ArtifactType::MultiFile { files } = &self.artifact_type {
            if files.is_empty() {
                return Err(SdkError::new(
                    ErrorCode::ValidationFailed,
                    format!("model {} declares an empty multi-file list", self.id),
                ));
            }
            for file in files {
                if file.url.trim().is_empty() || file.filename.trim().is_empty() {
                    return Err(SdkError::new(
                        ErrorCode::ValidationFailed,
                        format!(
                            "model {} has a file descriptor without url or filename",
                            self.id
                        ),
                    ));
                }
            }
        }

        self.updated_at = Utc::now();
        Ok(self)
    }

    /// Expected filenames on disk, in download order.
    pub fn expected_filenames(&self) -> Vec<String> {
        match &self.artifact_type {
            ArtifactType::MultiFile { files } => {
                files.iter().map(|f| f.filename.clone()).collect()
            }
            _ => self
                .download_url
                .as_deref()
                .and_then(filename_from_url)
                .into_iter()
                .collect(),
        }
    }

    /// Record one use for LRU bookkeeping.
    pub fn touch(&mut self) {
        self.usage_count += 1;
        self.last_used = Some(Utc::now());
        self.updated_at = Utc::now();
    }
}

/// Infer format and archive flavor from a URL extension.
///
/// `.onnx → onnx`, `.ort → ort`, `.gguf → gguf`, `.bin → bin`; archive
/// extensions map to `Archive(kind)` with the inner format unknown.
pub fn infer_packaging_from_url(url: &str) -> (ModelFormat, Option<ArchiveKind>) {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let lower = path.to_ascii_lowercase();

    if lower.ends_with(".tar.bz2") {
        return (ModelFormat::Unknown, Some(ArchiveKind::TarBz2));
    }
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        return (ModelFormat::Unknown, Some(ArchiveKind::TarGz));
    }
    if lower.ends_with(".zip") {
        return (ModelFormat::Unknown, Some(ArchiveKind::Zip));
    }

    let format = match lower.rsplit('.').next() {
        Some("onnx") => ModelFormat::Onnx,
        Some("ort") => ModelFormat::Ort,
        Some("gguf") => ModelFormat::Gguf,
        Some("bin") => ModelFormat::Bin,
        Some("mlmodel") => ModelFormat::Mlmodel,
        Some("mlpackage") => ModelFormat::Mlpackage,
        Some("tflite") => ModelFormat::Tflite,
        Some("safetensors") => ModelFormat::Safetensors,
        _ => ModelFormat::Unknown,
    };
    (format, None)
}

/// Last path segment of a URL, if any.
pub fn filename_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?.trim();
    if name.is_empty() || !name.contains('.') {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_inference() {
        assert_eq!(
            infer_packaging_from_url("https://host/m/weights.gguf"),
            (ModelFormat::Gguf, None)
        );
        assert_eq!(
            infer_packaging_from_url("https://host/m/encoder.onnx?token=x"),
            (ModelFormat::Onnx, None)
        );
        assert_eq!(
            infer_packaging_from_url("https://host/m/model.ort"),
            (ModelFormat::Ort, None)
        );
        assert_eq!(
            infer_packaging_from_url("https://host/m/pytorch_model.bin"),
            (ModelFormat::Bin, None)
        );
        assert_eq!(
            infer_packaging_from_url("https://host/m/readme"),
            (ModelFormat::Unknown, None)
        );
    }

    #[test]
    fn test_archive_inference() {
        assert_eq!(
            infer_packaging_from_url("https://host/m/bundle.tar.gz").1,
            Some(ArchiveKind::TarGz)
        );
        assert_eq!(
            infer_packaging_from_url("https://host/m/bundle.tar.bz2").1,
            Some(ArchiveKind::TarBz2)
        );
        assert_eq!(
            infer_packaging_from_url("https://host/m/bundle.zip").1,
            Some(ArchiveKind::Zip)
        );
    }

    #[test]
    fn test_normalize_defaults_context_length() {
        let model = ModelInfo::new("m1", "Model One", ModelCategory::Language)
            .normalized()
            .unwrap();
        assert_eq!(model.context_length, Some(DEFAULT_CONTEXT_LENGTH));

        let stt = ModelInfo::new("s1", "Whisper", ModelCategory::SpeechRecognition)
            .normalized()
            .unwrap();
        assert_eq!(stt.context_length, None);
    }

    #[test]
    fn test_normalize_forces_thinking_off() {
        let tts = ModelInfo::new("t1", "Voice", ModelCategory::SpeechSynthesis)
            .with_thinking(true)
            .normalized()
            .unwrap();
        assert!(!tts.supports_thinking);

        let llm = ModelInfo::new("m1", "LLM", ModelCategory::Language)
            .with_thinking(true)
            .normalized()
            .unwrap();
        assert!(llm.supports_thinking);
    }

    #[test]
    fn test_normalize_rejects_empty_multifile() {
        let model = ModelInfo::new("m1", "M", ModelCategory::SpeechRecognition)
            .with_artifact_type(ArtifactType::MultiFile { files: vec![] });
        assert!(model.normalized().is_err());
    }

    #[test]
    fn test_download_url_infers_packaging() {
        let model = ModelInfo::new("m1", "M", ModelCategory::Language)
            .with_download_url("https://host/m1/weights.gguf");
        assert_eq!(model.format, ModelFormat::Gguf);

        let archived = ModelInfo::new("m2", "M", ModelCategory::SpeechRecognition)
            .with_download_url("https://host/m2/bundle.zip");
        assert!(matches!(
            archived.artifact_type,
            ArtifactType::Archive {
                format: ArchiveKind::Zip
            }
        ));
    }

    #[test]
    fn test_expected_filenames() {
        let multi = ModelInfo::new("m1", "M", ModelCategory::SpeechRecognition)
            .with_artifact_type(ArtifactType::MultiFile {
                files: vec![
                    FileDescriptor {
                        url: "https://host/m1/encoder.onnx".into(),
                        filename: "encoder.onnx".into(),
                        size: None,
                        checksum: None,
                    },
                    FileDescriptor {
                        url: "https://host/m1/decoder.onnx".into(),
                        filename: "decoder.onnx".into(),
                        size: None,
                        checksum: None,
                    },
                ],
            });
        assert_eq!(multi.expected_filenames(), vec!["encoder.onnx", "decoder.onnx"]);

        let single = ModelInfo::new("m2", "M", ModelCategory::Language)
            .with_download_url("https://host/m2/weights.gguf");
        assert_eq!(single.expected_filenames(), vec!["weights.gguf"]);
    }

    #[test]
    fn test_roundtrip_serialization() {
        let model = ModelInfo::new("m1", "Model One", ModelCategory::Language)
            .with_download_url("https://host/m1/weights.gguf")
            .with_preferred_framework(Framework::LlamaCpp)
            .with_context_length(4096)
            .normalized()
            .unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let back: ModelInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(model, back);
    }
}
