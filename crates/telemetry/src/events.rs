//! Typed telemetry events
//!
//! Every analytics event has a fixed schema per modality; there is no
//! free-form property bag. Wire field names (`event_type`, `created_at`,
//! token counts, audio durations, RTF) are part of the telemetry endpoint
//! contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use edgekit_core::{
    DeviceInfo, Event, EventPayload, GenerationPhase, ModelPhase, SttPhase, TtsPhase,
};

/// Routing hint the receiver uses to pick specialized storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryModality {
    Llm,
    Stt,
    Tts,
    Model,
    Unspecified,
}

impl TelemetryModality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Stt => "stt",
            Self::Tts => "tts",
            Self::Model => "model",
            Self::Unspecified => "unspecified",
        }
    }
}

/// Modality-specific typed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "modality", rename_all = "snake_case")]
pub enum ModalityFields {
    Llm {
        prompt_tokens: u32,
        output_tokens: u32,
        thinking_tokens: u32,
        tokens_per_second: f32,
        time_to_first_token_ms: u64,
        total_time_ms: u64,
    },
    Stt {
        audio_ms: u64,
        processing_ms: u64,
        real_time_factor: f32,
    },
    Tts {
        characters: usize,
        audio_ms: u64,
        duration_ms: u64,
    },
    Model {
        duration_ms: Option<u64>,
        success: bool,
    },
    Unspecified,
}

impl ModalityFields {
    pub fn modality(&self) -> TelemetryModality {
        match self {
            Self::Llm { .. } => TelemetryModality::Llm,
            Self::Stt { .. } => TelemetryModality::Stt,
            Self::Tts { .. } => TelemetryModality::Tts,
            Self::Model { .. } => TelemetryModality::Model,
            Self::Unspecified => TelemetryModality::Unspecified,
        }
    }
}

/// One analytics event in wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub id: String,
    /// Stable snake_case name from the event taxonomy
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_version: Option<String>,
    #[serde(flatten)]
    pub fields: ModalityFields,
}

impl TelemetryEvent {
    pub fn modality(&self) -> TelemetryModality {
        self.fields.modality()
    }

    /// Convert a bus event destined for analytics into wire form.
    ///
    /// Returns `None` for public-only events.
    pub fn from_event(event: &Event, device: &DeviceInfo) -> Option<Self> {
        if !event.destination.includes_analytics() {
            return None;
        }

        let (session_id, model_id, fields) = match &event.payload {
            EventPayload::Generation {
                session_id,
                model_id,
                phase,
            } => {
                let fields = match phase {
                    GenerationPhase::Completed { usage } => ModalityFields::Llm {
                        prompt_tokens: usage.prompt_tokens,
                        output_tokens: usage.output_tokens,
                        thinking_tokens: usage.thinking_tokens,
                        tokens_per_second: usage.tokens_per_second,
                        time_to_first_token_ms: usage.time_to_first_token_ms,
                        total_time_ms: usage.total_time_ms,
                    },
                    _ => ModalityFields::Unspecified,
                };
                (Some(session_id.clone()), model_id.clone(), fields)
            }
            EventPayload::Stt { session_id, phase } => {
                let fields = match phase {
                    SttPhase::TranscriptionCompleted {
                        processing_ms,
                        audio_ms,
                        real_time_factor,
                    } => ModalityFields::Stt {
                        audio_ms: *audio_ms,
                        processing_ms: *processing_ms,
                        real_time_factor: *real_time_factor,
                    },
                    _ => ModalityFields::Unspecified,
                };
                (Some(session_id.clone()), None, fields)
            }
            EventPayload::Tts { session_id, phase } => {
                let fields = match phase {
                    TtsPhase::SynthesisCompleted {
                        characters,
                        duration_ms,
                        audio_ms,
                    } => ModalityFields::Tts {
                        characters: *characters,
                        audio_ms: *audio_ms,
                        duration_ms: *duration_ms,
                    },
                    _ => ModalityFields::Unspecified,
                };
                (Some(session_id.clone()), None, fields)
            }
            EventPayload::Model { model_id, phase } => {
                let fields = match phase {
                    ModelPhase::LoadCompleted { duration_ms } => ModalityFields::Model {
                        duration_ms: Some(*duration_ms),
                        success: true,
                    },
                    ModelPhase::LoadFailed { .. } | ModelPhase::DownloadFailed { .. } => {
                        ModalityFields::Model {
                            duration_ms: None,
                            success: false,
                        }
                    }
                    _ => ModalityFields::Model {
                        duration_ms: None,
                        success: true,
                    },
                };
                (None, Some(model_id.clone()), fields)
            }
            _ => (None, None, ModalityFields::Unspecified),
        };

        Some(Self {
            id: Uuid::new_v4().to_string(),
            event_type: event.name(),
            timestamp: event.timestamp,
            created_at: Utc::now(),
            session_id,
            model_id,
            framework: None,
            device: Some(device.device_type.clone()),
            platform: Some(device.platform.clone()),
            sdk_version: Some(device.sdk_version.clone()),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgekit_core::{AudioControlAction, TokenUsage};

    fn device() -> DeviceInfo {
        DeviceInfo::with_id("d1".into())
    }

    #[test]
    fn test_generation_completed_maps_to_llm_fields() {
        let event = Event::new(EventPayload::Generation {
            session_id: "s1".into(),
            model_id: Some("m1".into()),
            phase: GenerationPhase::Completed {
                usage: TokenUsage {
                    prompt_tokens: 10,
                    output_tokens: 20,
                    thinking_tokens: 2,
                    content_tokens: 18,
                    tokens_per_second: 40.0,
                    time_to_first_token_ms: 120,
                    total_time_ms: 500,
                },
            },
        });

        let telemetry = TelemetryEvent::from_event(&event, &device()).unwrap();
        assert_eq!(telemetry.event_type, "generation_completed");
        assert_eq!(telemetry.modality(), TelemetryModality::Llm);
        match telemetry.fields {
            ModalityFields::Llm {
                prompt_tokens,
                output_tokens,
                ..
            } => {
                assert_eq!(prompt_tokens, 10);
                assert_eq!(output_tokens, 20);
            }
            other => panic!("unexpected fields: {other:?}"),
        }
    }

    #[test]
    fn test_stt_completed_carries_rtf() {
        let event = Event::new(EventPayload::Stt {
            session_id: "s1".into(),
            phase: SttPhase::TranscriptionCompleted {
                processing_ms: 200,
                audio_ms: 2000,
                real_time_factor: 0.1,
            },
        });
        let telemetry = TelemetryEvent::from_event(&event, &device()).unwrap();
        assert_eq!(telemetry.modality(), TelemetryModality::Stt);
    }

    #[test]
    fn test_public_only_events_are_skipped() {
        let event = Event::new(EventPayload::AudioControl {
            action: AudioControlAction::PauseRecording,
        });
        assert!(TelemetryEvent::from_event(&event, &device()).is_none());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let event = Event::new(EventPayload::Model {
            model_id: "m1".into(),
            phase: ModelPhase::LoadCompleted { duration_ms: 77 },
        });
        let telemetry = TelemetryEvent::from_event(&event, &device()).unwrap();
        let json = serde_json::to_string(&telemetry).unwrap();
        let back: TelemetryEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(telemetry, back);
        assert!(json.contains("\"modality\":\"model\""));
        assert!(json.contains("\"event_type\":\"model_load_completed\""));
    }
}
