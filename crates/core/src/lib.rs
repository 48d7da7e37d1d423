//! Core traits and types for the EdgeKit runtime
//!
//! This crate provides the foundational pieces used across all other
//! crates:
//! - Service, provider, adapter, and platform traits for pluggable backends
//! - The typed event taxonomy and the publish/subscribe bus
//! - Model catalog types (identity, packaging, compatibility)
//! - Audio chunk types and processing utilities
//! - Generation options and the token streaming contract
//! - The error/context framework and cooperative cancellation

pub mod audio;
pub mod cancel;
pub mod device;
pub mod error;
pub mod events;
pub mod generation;
pub mod model;
pub mod traits;

pub use audio::{AudioBuffer, AudioChunk, SampleRate};
pub use cancel::CancellationToken;
pub use device::{DeviceInfo, SDK_VERSION};
pub use error::{ErrorCategory, ErrorCode, ErrorContext, PublicError, Result, SdkError};
pub use events::{
    AudioControlAction, ComponentPhase, Event, EventBus, EventCategory, EventDestination,
    EventPayload, GenerationPhase, ModelPhase, PipelinePhase, SttPhase, SubscriptionToken,
    TtsPhase, VadPhase,
};
pub use generation::{
    CollectingSink, FinishReason, FnSink, GeneratedToken, GenerationOptions, GenerationResult,
    StructuredOutputSpec, ThinkingTagPair, TokenKind, TokenSink, TokenUsage,
};
pub use model::{
    filename_from_url, infer_packaging_from_url, ArchiveKind, ArtifactType, FileDescriptor,
    Framework, ModelCategory, ModelFormat, ModelInfo, ModelSource, DEFAULT_CONTEXT_LENGTH,
};
pub use traits::{
    BackendUsage, Capability, DownloadStrategy, FrameworkAdapter, LlmService, LogLevel,
    MemoryInfo, Modality, PlatformAdapter, ProgressCallback, ProviderConfig,
    ServiceHandle, ServiceProvider, SpeakerDiarizationService, SpeakerInfo,
    SpeechActivityCallback, SpeechActivityEvent, SttOptions, SttResult, SttSegment, SttService,
    TtsOptions, TtsService, VadService, VoiceInfo,
};
