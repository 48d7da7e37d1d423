//! Voice pipeline: VAD -> STT -> LLM -> TTS with streaming back-pressure
//!
//! See [`voice::VoicePipeline`] for the orchestrator and
//! [`config::VoicePipelineConfig`] for tuning.

pub mod config;
pub mod echo;
pub mod sentence;
pub mod voice;

pub use config::{TtsSpanConfig, VadGateConfig, VoicePipelineConfig};
pub use echo::EchoGuard;
pub use sentence::{SentenceBuffer, SpanQueue};
pub use voice::{PipelineOutput, PipelineState, VoicePipeline, VoiceServices};
