//! Speech processing backend interfaces: STT, TTS, VAD, diarization

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::audio::{AudioChunk, SampleRate};
use crate::error::{ErrorCode, Result, SdkError};

/// Options for a transcription request.
#[derive(Debug, Clone, Default)]
pub struct SttOptions {
    /// BCP-47 language hint; `None` lets the backend detect
    pub language: Option<String>,
    pub sample_rate: SampleRate,
}

/// One time-aligned span of a transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SttSegment {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub confidence: f32,
}

/// Full transcription result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SttResult {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<SttSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub confidence: f32,
    /// Length of the transcribed audio
    pub audio_ms: u64,
}

/// Speech-to-Text interface
#[async_trait]
pub trait SttService: Send + Sync {
    async fn initialize(&self, model_path: Option<&Path>) -> Result<()>;

    /// Transcribe a complete utterance of mono f32 samples.
    async fn transcribe(&self, samples: &[f32], options: &SttOptions) -> Result<SttResult>;

    /// Stream transcription as audio arrives; partial segments first.
    ///
    /// Backends that cannot stream keep the default, which reports
    /// `streaming_not_supported`.
    fn transcribe_stream<'a>(
        &'a self,
        _chunks: Pin<Box<dyn Stream<Item = AudioChunk> + Send + 'a>>,
        _options: &'a SttOptions,
    ) -> Pin<Box<dyn Stream<Item = Result<SttSegment>> + Send + 'a>> {
        Box::pin(futures::stream::once(async {
            Err(SdkError::new(
                ErrorCode::StreamingNotSupported,
                "backend does not support streaming transcription",
            ))
        }))
    }

    fn is_ready(&self) -> bool;

    fn supports_streaming(&self) -> bool {
        false
    }

    fn supported_languages(&self) -> Vec<String>;

    async fn cleanup(&self) -> Result<()>;
}

/// Options for a synthesis request.
#[derive(Debug, Clone)]
pub struct TtsOptions {
    /// Voice id from `available_voices`; `None` uses the backend default
    pub voice: Option<String>,
    /// Speaking rate multiplier, 1.0 = normal
    pub rate: f32,
    pub sample_rate: SampleRate,
}

impl Default for TtsOptions {
    fn default() -> Self {
        Self {
            voice: None,
            rate: 1.0,
            sample_rate: SampleRate::Hz22050,
        }
    }
}

/// One selectable synthesis voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub language: String,
}

/// Text-to-Speech interface
#[async_trait]
pub trait TtsService: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    /// Synthesize one span of text into a single audio chunk.
    async fn synthesize(&self, text: &str, options: &TtsOptions) -> Result<AudioChunk>;

    /// Stream synthesis chunk-by-chunk. The default yields one chunk from
    /// `synthesize`.
    fn synthesize_stream<'a>(
        &'a self,
        text: &'a str,
        options: &'a TtsOptions,
    ) -> Pin<Box<dyn Stream<Item = Result<AudioChunk>> + Send + 'a>> {
        Box::pin(futures::stream::once(
            async move { self.synthesize(text, options).await },
        ))
    }

    /// Stop the in-flight synthesis, discarding queued audio.
    fn stop(&self);

    fn available_voices(&self) -> Vec<VoiceInfo>;

    fn is_synthesizing(&self) -> bool;

    async fn cleanup(&self) -> Result<()>;
}

/// Speech boundary notification from a VAD backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechActivityEvent {
    Started,
    Ended,
}

pub type SpeechActivityCallback = Box<dyn Fn(SpeechActivityEvent) + Send + Sync>;

/// Voice Activity Detection interface
#[async_trait]
pub trait VadService: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    /// Process one chunk of mono f32 samples; `true` when it contains
    /// speech.
    async fn process_audio(&self, samples: &[f32]) -> Result<bool>;

    /// Reset internal state between utterances.
    fn reset(&self);

    fn is_speech_active(&self) -> bool;

    fn energy_threshold(&self) -> f32;

    fn set_energy_threshold(&self, threshold: f32);

    /// Register a boundary callback. Backends that only expose the polling
    /// interface may ignore it; the pipeline derives boundaries from
    /// `process_audio` transitions either way.
    fn on_speech_activity(&self, callback: SpeechActivityCallback) {
        let _ = callback;
    }

    async fn cleanup(&self) -> Result<()>;
}

/// Identified speaker with match confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub confidence: f32,
}

/// Speaker diarization interface
#[async_trait]
pub trait SpeakerDiarizationService: Send + Sync {
    /// Identify the dominant speaker in a window of samples.
    async fn detect_speaker(&self, samples: &[f32], sample_rate: u32) -> Result<SpeakerInfo>;

    fn update_speaker_name(&self, speaker_id: &str, name: &str);

    fn all_speakers(&self) -> Vec<SpeakerInfo>;

    fn current_speaker(&self) -> Option<SpeakerInfo>;

    fn reset(&self);
}
