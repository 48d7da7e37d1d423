//! Event taxonomy
//!
//! Every event carries a timestamp, a category, a destination set, and a
//! strongly-typed payload. The snake_case names returned by [`Event::name`]
//! are stable and shared with the telemetry wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::generation::TokenUsage;
use crate::traits::SpeakerInfo;

/// Category used for bus subscription routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Sdk,
    Component,
    Model,
    Generation,
    Stt,
    Tts,
    Vad,
    Pipeline,
    AudioControl,
}

/// Who receives an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDestination {
    Public,
    Analytics,
    Both,
}

impl EventDestination {
    pub fn includes_public(&self) -> bool {
        matches!(self, Self::Public | Self::Both)
    }

    pub fn includes_analytics(&self) -> bool {
        matches!(self, Self::Analytics | Self::Both)
    }
}

/// Component lifecycle sub-phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ComponentPhase {
    InitializationStarted,
    InitializationProgress { percent: f32 },
    InitializationCompleted { duration_ms: u64 },
    InitializationFailed { message: String },
    DownloadRequired,
    DownloadStarted,
    DownloadProgress { bytes: u64, total: Option<u64> },
    DownloadCompleted,
}

/// Model lifecycle sub-phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ModelPhase {
    LoadingStarted,
    LoadCompleted { duration_ms: u64 },
    LoadFailed { message: String },
    UnloadCompleted,
    DownloadStarted,
    DownloadProgress { bytes: u64, total: Option<u64> },
    DownloadCompleted,
    DownloadFailed { message: String },
}

/// Generation sub-phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum GenerationPhase {
    Started,
    FirstToken { ttft_ms: u64 },
    StreamingUpdate { index: u32, text: String },
    Completed { usage: TokenUsage },
    Failed { message: String },
}

/// Speech-to-text sub-phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SttPhase {
    TranscriptionStarted,
    PartialTranscript {
        text: String,
    },
    FinalTranscript {
        text: String,
        speaker: Option<SpeakerInfo>,
    },
    TranscriptionCompleted {
        processing_ms: u64,
        audio_ms: u64,
        real_time_factor: f32,
    },
    TranscriptionFailed {
        message: String,
    },
    LanguageDetected {
        language: String,
    },
    SpeakerChanged {
        from: Option<String>,
        to: String,
    },
}

/// Text-to-speech sub-phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TtsPhase {
    SynthesisStarted,
    AudioChunk {
        size_bytes: usize,
    },
    SynthesisCompleted {
        characters: usize,
        duration_ms: u64,
        audio_ms: u64,
    },
    SynthesisFailed {
        message: String,
    },
}

/// Voice-activity sub-phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum VadPhase {
    Started,
    Stopped,
    SpeechStarted,
    SpeechEnded,
}

/// Pipeline sub-phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PipelinePhase {
    Started,
    Error { message: String, cancelled: bool },
    Completed,
}

/// Microphone control request to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioControlAction {
    PauseRecording,
    ResumeRecording,
}

/// Typed payload of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    SdkInitialized,
    SdkShutdown,
    Component {
        component: String,
        phase: ComponentPhase,
    },
    Model {
        model_id: String,
        phase: ModelPhase,
    },
    Generation {
        session_id: String,
        model_id: Option<String>,
        phase: GenerationPhase,
    },
    Stt {
        session_id: String,
        phase: SttPhase,
    },
    Tts {
        session_id: String,
        phase: TtsPhase,
    },
    Vad {
        session_id: String,
        phase: VadPhase,
    },
    Pipeline {
        session_id: String,
        phase: PipelinePhase,
    },
    AudioControl {
        action: AudioControlAction,
    },
}

impl EventPayload {
    pub fn category(&self) -> EventCategory {
        match self {
            Self::SdkInitialized | Self::SdkShutdown => EventCategory::Sdk,
            Self::Component { .. } => EventCategory::Component,
            Self::Model { .. } => EventCategory::Model,
            Self::Generation { .. } => EventCategory::Generation,
            Self::Stt { .. } => EventCategory::Stt,
            Self::Tts { .. } => EventCategory::Tts,
            Self::Vad { .. } => EventCategory::Vad,
            Self::Pipeline { .. } => EventCategory::Pipeline,
            Self::AudioControl { .. } => EventCategory::AudioControl,
        }
    }

    /// Stable snake_case event name.
    pub fn name(&self) -> String {
        match self {
            Self::SdkInitialized => "sdk_initialized".into(),
            Self::SdkShutdown => "sdk_shutdown".into(),
            Self::Component { component, phase } => {
                let suffix = match phase {
                    ComponentPhase::InitializationStarted => "initialization_started",
                    ComponentPhase::InitializationProgress { .. } => "initialization_progress",
                    ComponentPhase::InitializationCompleted { .. } => "initialization_completed",
                    ComponentPhase::InitializationFailed { .. } => "initialization_failed",
                    ComponentPhase::DownloadRequired => "download_required",
                    ComponentPhase::DownloadStarted => "download_started",
                    ComponentPhase::DownloadProgress { .. } => "download_progress",
                    ComponentPhase::DownloadCompleted => "download_completed",
                };
                format!("component_{component}_{suffix}")
            }
            Self::Model { phase, .. } => match phase {
                ModelPhase::LoadingStarted => "model_loading_started".into(),
                ModelPhase::LoadCompleted { .. } => "model_load_completed".into(),
                ModelPhase::LoadFailed { .. } => "model_load_failed".into(),
                ModelPhase::UnloadCompleted => "model_unload_completed".into(),
                ModelPhase::DownloadStarted => "model_download_started".into(),
                ModelPhase::DownloadProgress { .. } => "model_download_progress".into(),
                ModelPhase::DownloadCompleted => "model_download_completed".into(),
                ModelPhase::DownloadFailed { .. } => "model_download_failed".into(),
            },
            Self::Generation { phase, .. } => match phase {
                GenerationPhase::Started => "generation_started".into(),
                GenerationPhase::FirstToken { .. } => "generation_first_token".into(),
                GenerationPhase::StreamingUpdate { .. } => "generation_streaming_update".into(),
                GenerationPhase::Completed { .. } => "generation_completed".into(),
                GenerationPhase::Failed { .. } => "generation_failed".into(),
            },
            Self::Stt { phase, .. } => match phase {
                SttPhase::TranscriptionStarted => "stt_transcription_started".into(),
                SttPhase::PartialTranscript { .. } => "stt_partial_transcript".into(),
                SttPhase::FinalTranscript { .. } => "stt_final_transcript".into(),
                SttPhase::TranscriptionCompleted { .. } => "stt_transcription_completed".into(),
                SttPhase::TranscriptionFailed { .. } => "stt_transcription_failed".into(),
                SttPhase::LanguageDetected { .. } => "stt_language_detected".into(),
                SttPhase::SpeakerChanged { .. } => "stt_speaker_changed".into(),
            },
            Self::Tts { phase, .. } => match phase {
                TtsPhase::SynthesisStarted => "tts_synthesis_started".into(),
                TtsPhase::AudioChunk { .. } => "tts_audio_chunk".into(),
                TtsPhase::SynthesisCompleted { .. } => "tts_synthesis_completed".into(),
                TtsPhase::SynthesisFailed { .. } => "tts_synthesis_failed".into(),
            },
            Self::Vad { phase, .. } => match phase {
                VadPhase::Started => "vad_started".into(),
                VadPhase::Stopped => "vad_stopped".into(),
                VadPhase::SpeechStarted => "vad_speech_started".into(),
                VadPhase::SpeechEnded => "vad_speech_ended".into(),
            },
            Self::Pipeline { phase, .. } => match phase {
                PipelinePhase::Started => "pipeline_started".into(),
                PipelinePhase::Error { .. } => "pipeline_error".into(),
                PipelinePhase::Completed => "pipeline_completed".into(),
            },
            Self::AudioControl { action } => match action {
                AudioControlAction::PauseRecording => "audio_control_pause_recording".into(),
                AudioControlAction::ResumeRecording => "audio_control_resume_recording".into(),
            },
        }
    }

    /// Default routing for the payload kind.
    fn default_destination(&self) -> EventDestination {
        match self {
            Self::AudioControl { .. } => EventDestination::Public,
            Self::Generation {
                phase: GenerationPhase::StreamingUpdate { .. },
                ..
            } => EventDestination::Public,
            _ => EventDestination::Both,
        }
    }
}

/// One published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub destination: EventDestination,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            destination: payload.default_destination(),
            payload,
        }
    }

    pub fn with_destination(mut self, destination: EventDestination) -> Self {
        self.destination = destination;
        self
    }

    pub fn category(&self) -> EventCategory {
        self.payload.category()
    }

    pub fn name(&self) -> String {
        self.payload.name()
    }
}
