//! Core traits for pluggable backends
//!
//! All major components implement these traits to enable:
//! - Pluggable backends (swap implementations without code changes)
//! - Testing with mocks
//! - Runtime switching based on registered adapters
//!
//! ```text
//! Services (live handles produced by providers/adapters):
//!   - LlmService: text generation with token streaming
//!   - SttService: audio -> text transcription
//!   - TtsService: text -> audio synthesis
//!   - VadService: speech boundary detection
//!   - SpeakerDiarizationService: speaker identification
//!
//! Plug-in seams:
//!   - ServiceProvider: capability factory, registered per capability
//!   - FrameworkAdapter: model format -> service, registered per framework
//!   - DownloadStrategy: model file download contract
//!   - PlatformAdapter: host-supplied file/clock/memory/secure-store access
//! ```

mod adapter;
mod llm;
mod platform;
mod provider;
mod speech;

pub use adapter::{DownloadStrategy, FrameworkAdapter, Modality, ProgressCallback};
pub use llm::{BackendUsage, LlmService};
pub use platform::{LogLevel, MemoryInfo, PlatformAdapter};
pub use provider::{Capability, ProviderConfig, ServiceHandle, ServiceProvider};
pub use speech::{
    SpeakerDiarizationService, SpeakerInfo, SpeechActivityCallback, SpeechActivityEvent,
    SttOptions, SttResult, SttSegment, SttService, TtsOptions, TtsService, VadService, VoiceInfo,
};
