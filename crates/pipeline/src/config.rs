//! Voice pipeline configuration

use std::time::Duration;

use edgekit_config::StageTimeouts;
use edgekit_core::{GenerationOptions, SampleRate};

/// Speech gating over VAD decisions.
#[derive(Debug, Clone)]
pub struct VadGateConfig {
    /// Chunks below this energy never open the gate, whatever VAD says
    pub energy_threshold_db: f32,
    pub sample_rate: SampleRate,
    /// Nominal chunk length; input tolerates ±50% jitter
    pub frame_length_ms: u32,
    /// Cap on accumulated utterance audio
    pub buffer_max_secs: u64,
    /// Consecutive speech chunks required to open the gate
    pub min_speech_frames: u32,
    /// Consecutive silence chunks required to close it
    pub silence_threshold_frames: u32,
}

impl Default for VadGateConfig {
    fn default() -> Self {
        Self {
            energy_threshold_db: -45.0,
            sample_rate: SampleRate::Hz16000,
            frame_length_ms: 100,
            buffer_max_secs: 30,
            min_speech_frames: 2,
            silence_threshold_frames: 8,
        }
    }
}

/// Streaming TTS span shaping.
#[derive(Debug, Clone)]
pub struct TtsSpanConfig {
    /// Flush a span after this many tokens without a sentence boundary
    pub max_tokens_per_span: usize,
    /// Queue depth before new spans coalesce into the newest entry
    pub span_queue_cap: usize,
    /// Delay between TTS finishing and resume-recording
    pub cooldown: Duration,
}

impl Default for TtsSpanConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_span: 24,
            span_queue_cap: 8,
            cooldown: Duration::from_millis(150),
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone)]
pub struct VoicePipelineConfig {
    pub vad: VadGateConfig,
    pub tts: TtsSpanConfig,
    /// Runtime generation options for the LLM stage
    pub generation: GenerationOptions,
    /// Emit a partial transcript every N speech chunks; 0 disables
    pub partial_transcript_frames: u32,
    /// Overlay speaker diarization on final transcripts
    pub diarization: bool,
    pub timeouts: StageTimeouts,
}

impl Default for VoicePipelineConfig {
    fn default() -> Self {
        Self {
            vad: VadGateConfig::default(),
            tts: TtsSpanConfig::default(),
            generation: GenerationOptions::default(),
            partial_transcript_frames: 10,
            diarization: false,
            timeouts: StageTimeouts::default(),
        }
    }
}
