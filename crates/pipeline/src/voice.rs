//! Voice pipeline orchestrator
//!
//! Coordinates one audio session end-to-end: chunked PCM input through the
//! VAD gate, utterance accumulation for STT, LLM streaming with thinking
//! split, sentence-buffered streaming TTS, and echo control. Stage events
//! publish to the event bus in a fixed order per turn; synthesized audio
//! and transcripts additionally fan out on a broadcast channel for the
//! host.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use edgekit_core::{
    AudioBuffer, AudioChunk, CancellationToken, ErrorCode, Event, EventBus, EventPayload,
    FinishReason, GeneratedToken, LlmService, ModelInfo, PipelinePhase, Result, SdkError,
    SpeakerDiarizationService, SpeakerInfo, SttOptions, SttService, TokenKind, TtsOptions,
    TtsService, VadService, SttPhase, TtsPhase, VadPhase,
};
use edgekit_llm::StreamingEngine;

use crate::config::VoicePipelineConfig;
use crate::echo::EchoGuard;
use crate::sentence::{SentenceBuffer, SpanQueue};

/// Live services one pipeline instance runs against.
#[derive(Clone)]
pub struct VoiceServices {
    pub vad: Arc<dyn VadService>,
    pub stt: Arc<dyn SttService>,
    pub llm: Arc<dyn LlmService>,
    pub llm_model: ModelInfo,
    pub tts: Arc<dyn TtsService>,
    pub diarization: Option<Arc<dyn SpeakerDiarizationService>>,
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Waiting for speech
    Idle,
    /// Accumulating an utterance
    Listening,
    /// Transcribing and generating
    Processing,
    /// Synthesizing the response
    Speaking,
}

/// Host-facing output stream.
#[derive(Debug, Clone)]
pub enum PipelineOutput {
    Transcript { text: String, is_final: bool },
    Response { text: String, is_final: bool },
    Audio(AudioChunk),
}

#[derive(Default)]
struct VadGate {
    in_speech: bool,
    speech_frames: u32,
    silence_frames: u32,
    frames_in_turn: u32,
}

/// One voice session: audio chunks in, events and audio out.
pub struct VoicePipeline {
    config: VoicePipelineConfig,
    services: VoiceServices,
    engine: Arc<StreamingEngine>,
    bus: EventBus,
    session_id: String,
    state: Mutex<PipelineState>,
    cancel: Mutex<CancellationToken>,
    gate: Mutex<VadGate>,
    buffer: Mutex<AudioBuffer>,
    last_speaker: Mutex<Option<SpeakerInfo>>,
    output_tx: broadcast::Sender<PipelineOutput>,
}

impl std::fmt::Debug for VoicePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePipeline")
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl VoicePipeline {
    pub fn new(
        config: VoicePipelineConfig,
        services: VoiceServices,
        engine: Arc<StreamingEngine>,
        bus: EventBus,
    ) -> Self {
        let buffer = AudioBuffer::new(
            config.vad.sample_rate,
            Duration::from_secs(config.vad.buffer_max_secs),
        );
        // Large capacity so a slow receiver does not lag out audio.
        let (output_tx, _) = broadcast::channel(1024);

        Self {
            config,
            services,
            engine,
            bus,
            session_id: Uuid::new_v4().to_string(),
            state: Mutex::new(PipelineState::Idle),
            cancel: Mutex::new(CancellationToken::new()),
            gate: Mutex::new(VadGate::default()),
            buffer: Mutex::new(buffer),
            last_speaker: Mutex::new(None),
            output_tx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    /// Subscribe to transcripts, responses, and synthesized audio.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineOutput> {
        self.output_tx.subscribe()
    }

    /// Begin a session; the host starts pushing chunks afterwards.
    pub fn start(&self) {
        self.reset();
        self.publish_vad(VadPhase::Started);
        tracing::info!(session_id = %self.session_id, "Voice pipeline started");
    }

    /// End the session. An utterance cut off mid-speech still gets its
    /// speech-ended event.
    pub fn stop(&self) {
        self.cancel.lock().cancel();
        let was_speaking = {
            let mut gate = self.gate.lock();
            std::mem::take(&mut gate.in_speech)
        };
        if was_speaking {
            self.publish_vad(VadPhase::SpeechEnded);
        }
        self.publish_vad(VadPhase::Stopped);
        tracing::info!(session_id = %self.session_id, "Voice pipeline stopped");
    }

    /// Cancel the in-flight turn: stops the LLM stream and drops
    /// unsynthesized TTS spans. Loaded models are untouched.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// Reset gating and buffers between utterances.
    pub fn reset(&self) {
        *self.state.lock() = PipelineState::Idle;
        *self.gate.lock() = VadGate::default();
        self.buffer.lock().clear();
        self.services.vad.reset();
        if let Some(diarization) = &self.services.diarization {
            diarization.reset();
        }
        *self.last_speaker.lock() = None;
        *self.cancel.lock() = CancellationToken::new();
    }

    /// Feed one chunk of mono PCM. Nominal chunk length is ~100 ms; the
    /// gate tolerates ±50% jitter. A completed turn runs to TTS completion
    /// before this returns.
    pub async fn process_chunk(&self, chunk: AudioChunk) -> Result<()> {
        match *self.state.lock() {
            // Echo control pauses the mic during a turn; anything that
            // still arrives is dropped.
            PipelineState::Processing | PipelineState::Speaking => return Ok(()),
            _ => {}
        }

        let vad_speech = self.services.vad.process_audio(&chunk.samples).await?;
        let is_speech = vad_speech && chunk.energy_db > self.config.vad.energy_threshold_db;

        let mut speech_started = false;
        let mut turn_ready = false;
        let mut emit_partial = false;
        {
            let mut gate = self.gate.lock();
            if is_speech {
                gate.speech_frames += 1;
                gate.silence_frames = 0;
            } else {
                gate.silence_frames += 1;
            }

            if !gate.in_speech {
                if is_speech {
                    // Pre-roll: keep audio from the first speechy chunk.
                    self.buffer.lock().push(&chunk);
                    if gate.speech_frames >= self.config.vad.min_speech_frames {
                        gate.in_speech = true;
                        gate.frames_in_turn = gate.speech_frames;
                        speech_started = true;
                    }
                } else {
                    gate.speech_frames = 0;
                    self.buffer.lock().clear();
                }
            } else {
                self.buffer.lock().push(&chunk);
                gate.frames_in_turn += 1;

                if self.config.partial_transcript_frames > 0
                    && is_speech
                    && gate.frames_in_turn % self.config.partial_transcript_frames == 0
                {
                    emit_partial = true;
                }

                if !is_speech
                    && gate.silence_frames >= self.config.vad.silence_threshold_frames
                {
                    gate.in_speech = false;
                    gate.speech_frames = 0;
                    gate.silence_frames = 0;
                    gate.frames_in_turn = 0;
                    turn_ready = true;
                }
            }
        }

        if speech_started {
            *self.state.lock() = PipelineState::Listening;
            self.publish_vad(VadPhase::SpeechStarted);
            tracing::debug!(session_id = %self.session_id, "Speech started");
        }

        if emit_partial {
            self.emit_partial_transcript().await;
        }

        if turn_ready {
            self.publish_vad(VadPhase::SpeechEnded);
            tracing::debug!(session_id = %self.session_id, "Speech ended, processing turn");
            *self.state.lock() = PipelineState::Processing;
            let outcome = self.run_turn().await;
            *self.state.lock() = PipelineState::Idle;

            if let Err(e) = outcome {
                self.publish_pipeline(PipelinePhase::Error {
                    message: e.message().to_string(),
                    cancelled: false,
                });
                return Err(e);
            }
        }

        Ok(())
    }

    async fn emit_partial_transcript(&self) {
        let samples: Vec<f32> = self.buffer.lock().samples().to_vec();
        if samples.is_empty() {
            return;
        }
        let options = SttOptions {
            language: None,
            sample_rate: self.config.vad.sample_rate,
        };
        match self.services.stt.transcribe(&samples, &options).await {
            Ok(partial) if !partial.text.trim().is_empty() => {
                self.publish_stt(SttPhase::PartialTranscript {
                    text: partial.text.clone(),
                });
                let _ = self.output_tx.send(PipelineOutput::Transcript {
                    text: partial.text,
                    is_final: false,
                });
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Partial transcription failed, continuing")
            }
        }
    }

    /// One full turn: STT on the accumulated utterance, LLM streaming,
    /// sentence-buffered TTS, echo control bracketing.
    async fn run_turn(&self) -> Result<()> {
        let cancel = self.cancel.lock().clone();
        self.publish_pipeline(PipelinePhase::Started);

        // --- STT ---
        let samples = self.buffer.lock().take();
        let audio_ms =
            (samples.len() as u64 * 1000) / self.config.vad.sample_rate.as_u32() as u64;
        self.publish_stt(SttPhase::TranscriptionStarted);

        let stt_options = SttOptions {
            language: None,
            sample_rate: self.config.vad.sample_rate,
        };
        let stt_timeout = Duration::from_millis(
            (audio_ms * self.config.timeouts.stt_audio_multiplier as u64).max(1_000),
        );
        let stt_started = Instant::now();
        let transcript = match tokio::time::timeout(
            stt_timeout,
            self.services.stt.transcribe(&samples, &stt_options),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                self.publish_stt(SttPhase::TranscriptionFailed {
                    message: e.message().to_string(),
                });
                return Err(e);
            }
            Err(_) => {
                let e = SdkError::new(
                    ErrorCode::GenerationTimeout,
                    format!("transcription exceeded {stt_timeout:?}"),
                );
                self.publish_stt(SttPhase::TranscriptionFailed {
                    message: e.message().to_string(),
                });
                return Err(e);
            }
        };
        let processing_ms = stt_started.elapsed().as_millis() as u64;

        cancel.check()?;

        if let Some(language) = &transcript.language {
            self.publish_stt(SttPhase::LanguageDetected {
                language: language.clone(),
            });
        }

        // Diarization overlay pairs the final transcript with a speaker.
        let speaker = self.detect_speaker(&samples).await;
        self.publish_stt(SttPhase::FinalTranscript {
            text: transcript.text.clone(),
            speaker,
        });
        let _ = self.output_tx.send(PipelineOutput::Transcript {
            text: transcript.text.clone(),
            is_final: true,
        });
        self.publish_stt(SttPhase::TranscriptionCompleted {
            processing_ms,
            audio_ms,
            real_time_factor: if audio_ms > 0 {
                processing_ms as f32 / audio_ms as f32
            } else {
                0.0
            },
        });

        if transcript.text.trim().is_empty() {
            tracing::debug!(session_id = %self.session_id, "Empty transcript, skipping response");
            self.publish_pipeline(PipelinePhase::Completed);
            return Ok(());
        }

        // --- LLM -> TTS ---
        *self.state.lock() = PipelineState::Speaking;
        let spans = Arc::new(SpanQueue::new(self.config.tts.span_queue_cap));
        let guard = EchoGuard::acquire(self.bus.clone(), self.config.tts.cooldown);

        let tts_task = tokio::spawn(synthesize_spans(
            self.services.tts.clone(),
            spans.clone(),
            self.bus.clone(),
            self.session_id.clone(),
            self.output_tx.clone(),
            cancel.clone(),
            self.config.timeouts.tts,
        ));

        let mut sentence = SentenceBuffer::new(self.config.tts.max_tokens_per_span);
        let mut response = String::new();
        let generation = {
            let spans = spans.clone();
            let output_tx = self.output_tx.clone();
            let mut sink = edgekit_core::FnSink(|token: &GeneratedToken| -> bool {
                if token.kind == TokenKind::Content {
                    response.push_str(&token.text);
                    let _ = output_tx.send(PipelineOutput::Response {
                        text: response.clone(),
                        is_final: false,
                    });
                    if let Some(span) = sentence.push(&token.text) {
                        spans.push(span);
                    }
                }
                true
            });

            self.engine
                .stream(
                    self.services.llm.clone(),
                    &self.services.llm_model,
                    &transcript.text,
                    &self.config.generation,
                    &mut sink,
                    &cancel,
                )
                .await
        };

        let generation = match generation {
            Ok(generation) => generation,
            Err(e) => {
                spans.abort();
                let _ = tts_task.await;
                drop(guard);
                return Err(e);
            }
        };

        if generation.finish_reason == FinishReason::Cancelled {
            // Drop unsynthesized spans; text already delivered stands.
            spans.abort();
            let _ = tts_task.await;
            guard.release().await;
            self.publish_pipeline(PipelinePhase::Error {
                message: "cancelled".to_string(),
                cancelled: true,
            });
            *self.cancel.lock() = CancellationToken::new();
            return Ok(());
        }

        if let Some(rest) = sentence.flush() {
            spans.push(rest);
        }
        spans.close();
        let _ = tts_task.await;
        guard.release().await;

        if !response.is_empty() {
            let _ = self.output_tx.send(PipelineOutput::Response {
                text: response,
                is_final: true,
            });
        }

        self.publish_pipeline(PipelinePhase::Completed);
        Ok(())
    }

    async fn detect_speaker(&self, samples: &[f32]) -> Option<SpeakerInfo> {
        if !self.config.diarization {
            return None;
        }
        let diarization = self.services.diarization.as_ref()?;
        match diarization
            .detect_speaker(samples, self.config.vad.sample_rate.as_u32())
            .await
        {
            Ok(speaker) => {
                let mut last = self.last_speaker.lock();
                let changed = last.as_ref().map(|s| s.id.clone()) != Some(speaker.id.clone());
                if changed {
                    self.publish_stt(SttPhase::SpeakerChanged {
                        from: last.as_ref().map(|s| s.id.clone()),
                        to: speaker.id.clone(),
                    });
                }
                *last = Some(speaker.clone());
                Some(speaker)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Speaker detection failed");
                None
            }
        }
    }

    fn publish_vad(&self, phase: VadPhase) {
        self.bus.publish(Event::new(EventPayload::Vad {
            session_id: self.session_id.clone(),
            phase,
        }));
    }

    fn publish_stt(&self, phase: SttPhase) {
        self.bus.publish(Event::new(EventPayload::Stt {
            session_id: self.session_id.clone(),
            phase,
        }));
    }

    fn publish_pipeline(&self, phase: PipelinePhase) {
        self.bus.publish(Event::new(EventPayload::Pipeline {
            session_id: self.session_id.clone(),
            phase,
        }));
    }
}

/// TTS consumer task: synthesizes spans in arrival order until the queue
/// closes. One started/completed pair brackets the whole turn, however
/// many sentence spans it takes; cancellation drops whatever has not been
/// synthesized yet.
async fn synthesize_spans(
    tts: Arc<dyn TtsService>,
    spans: Arc<SpanQueue>,
    bus: EventBus,
    session_id: String,
    output_tx: broadcast::Sender<PipelineOutput>,
    cancel: CancellationToken,
    per_span_timeout: Duration,
) {
    let options = TtsOptions::default();
    let mut started_at: Option<Instant> = None;
    let mut characters = 0usize;
    let mut audio_ms = 0u64;
    let mut failed = false;

    while let Some(span) = spans.pop().await {
        if cancel.is_cancelled() {
            break;
        }

        if started_at.is_none() {
            started_at = Some(Instant::now());
            bus.publish(Event::new(EventPayload::Tts {
                session_id: session_id.clone(),
                phase: TtsPhase::SynthesisStarted,
            }));
        }
        characters += span.chars().count();

        let outcome = tokio::time::timeout(per_span_timeout, async {
            let mut stream = tts.synthesize_stream(&span, &options);
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(chunk) => {
                        audio_ms += chunk.duration_ms();
                        bus.publish(Event::new(EventPayload::Tts {
                            session_id: session_id.clone(),
                            phase: TtsPhase::AudioChunk {
                                size_bytes: chunk.samples.len() * std::mem::size_of::<f32>(),
                            },
                        }));
                        let _ = output_tx.send(PipelineOutput::Audio(chunk));
                    }
                    Err(e) => {
                        bus.publish(Event::new(EventPayload::Tts {
                            session_id: session_id.clone(),
                            phase: TtsPhase::SynthesisFailed {
                                message: e.message().to_string(),
                            },
                        }));
                        failed = true;
                        break;
                    }
                }
            }
        })
        .await;

        if outcome.is_err() {
            tts.stop();
            bus.publish(Event::new(EventPayload::Tts {
                session_id: session_id.clone(),
                phase: TtsPhase::SynthesisFailed {
                    message: format!("synthesis exceeded {per_span_timeout:?}"),
                },
            }));
            failed = true;
        }
        if failed {
            break;
        }
    }

    if let Some(started_at) = started_at {
        if !failed {
            bus.publish(Event::new(EventPayload::Tts {
                session_id: session_id.clone(),
                phase: TtsPhase::SynthesisCompleted {
                    characters,
                    duration_ms: started_at.elapsed().as_millis() as u64,
                    audio_ms,
                },
            }));
        }
    }
}
