//! Streaming generation engine
//!
//! Sits between resolved options and a raw [`LlmService`] token stream:
//! prefixes the effective prompt, splits thinking from content, enforces
//! stop conditions (max tokens, stop sequences on content only,
//! cancellation, backend EOF), and reports final usage. Tokens are emitted
//! to a [`TokenSink`] whose `on_token` return value provides back-pressure.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use uuid::Uuid;

use edgekit_config::ConfigResolver;
use edgekit_core::{
    BackendUsage, CancellationToken, ErrorCode, Event, EventBus, EventPayload, FinishReason,
    GeneratedToken, GenerationOptions, GenerationPhase, GenerationResult, LlmService, ModelInfo,
    Result, SdkError, StructuredOutputSpec, ThinkingTagPair, TokenKind, TokenSink, TokenUsage,
};

use crate::estimate::approximate_token_count;
use crate::stop::{trim_stop_suffix, StopMatcher};
use crate::thinking::{ClassifiedSpan, ParseMode, ThinkingParser};

/// Orchestrates one streaming generation per call.
pub struct StreamingEngine {
    resolver: Arc<ConfigResolver>,
    bus: EventBus,
}

impl StreamingEngine {
    pub fn new(resolver: Arc<ConfigResolver>, bus: EventBus) -> Self {
        Self { resolver, bus }
    }

    /// Run one generation, streaming classified tokens into `sink`.
    ///
    /// Returns the completed result; a cancelled generation completes with
    /// `FinishReason::Cancelled` rather than erroring so the collected
    /// usage survives.
    pub async fn stream(
        &self,
        service: Arc<dyn LlmService>,
        model: &ModelInfo,
        prompt: &str,
        options: &GenerationOptions,
        sink: &mut dyn TokenSink,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        let session_id = Uuid::new_v4().to_string();
        let resolved = self
            .resolver
            .resolve(options, model.effective_context_length());
        let started = Instant::now();

        cancel.check()?;

        self.publish(
            &session_id,
            Some(&model.id),
            GenerationPhase::Started,
        );

        // max_tokens == 0 completes immediately with empty text.
        if resolved.max_tokens == 0 {
            let result = GenerationResult {
                text: String::new(),
                thinking: String::new(),
                finish_reason: FinishReason::MaxTokens,
                usage: TokenUsage::default(),
            };
            sink.on_complete(&result);
            self.publish(
                &session_id,
                Some(&model.id),
                GenerationPhase::Completed {
                    usage: result.usage,
                },
            );
            return Ok(result);
        }

        let effective_prompt = build_effective_prompt(
            prompt,
            resolved.system_prompt.as_deref(),
            options.structured_output.as_ref(),
        );
        let backend_options = GenerationOptions {
            max_tokens: Some(resolved.max_tokens),
            temperature: Some(resolved.temperature),
            top_p: Some(resolved.top_p),
            stop_sequences: resolved.stop_sequences.clone(),
            system_prompt: None,
            structured_output: None,
            thinking_tags: None,
            timeout: Some(resolved.timeout),
        };

        let (tx, mut rx) = mpsc::channel::<String>(64);
        let backend = {
            let service = service.clone();
            let prompt = effective_prompt.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                service
                    .stream_generate(&prompt, &backend_options, tx, &cancel)
                    .await
            })
        };

        let mut parser = model.supports_thinking.then(|| {
            ThinkingParser::new(
                options
                    .thinking_tags
                    .clone()
                    .unwrap_or_else(ThinkingTagPair::default),
            )
        });
        let mut stop = StopMatcher::new(resolved.stop_sequences.clone());

        let mut content = String::new();
        let mut thinking = String::new();
        let mut next_index = 0u32;
        let mut content_tokens = 0u32;
        let mut thinking_token_pieces = 0u32;
        let mut pending: Option<GeneratedToken> = None;
        let mut first_token_at: Option<Instant> = None;
        let mut finish = FinishReason::Stop;
        let mut backend_eof = false;
        let mut sink_stopped = false;
        let deadline = tokio::time::Instant::now() + resolved.timeout;

        'stream: loop {
            let piece = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    finish = FinishReason::Cancelled;
                    break 'stream;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    backend.abort();
                    let err = SdkError::new(
                        ErrorCode::GenerationTimeout,
                        format!("generation exceeded {:?}", resolved.timeout),
                    );
                    self.publish(
                        &session_id,
                        Some(&model.id),
                        GenerationPhase::Failed {
                            message: err.message().to_string(),
                        },
                    );
                    return Err(err);
                }
                piece = rx.recv() => match piece {
                    Some(piece) => piece,
                    None => {
                        backend_eof = true;
                        break 'stream;
                    }
                },
            };

            let mode_before = parser.as_ref().map(|p| p.mode());
            let spans = match parser.as_mut() {
                Some(parser) => parser.feed(&piece),
                None => vec![ClassifiedSpan {
                    kind: TokenKind::Content,
                    text: piece.clone(),
                }],
            };

            // Usage counting attributes a piece to thinking when it carried
            // thinking text, or was consumed entirely inside a thinking
            // block (tag pieces included).
            let had_thinking_text = spans
                .iter()
                .any(|s| s.kind == TokenKind::Thinking && !s.text.is_empty());
            let had_any_text = spans.iter().any(|s| !s.text.is_empty());
            if had_thinking_text || (!had_any_text && mode_before == Some(ParseMode::Thinking)) {
                thinking_token_pieces += 1;
            }

            for span in spans {
                if span.text.is_empty() {
                    continue;
                }

                if first_token_at.is_none() {
                    let now = Instant::now();
                    first_token_at = Some(now);
                    self.publish(
                        &session_id,
                        Some(&model.id),
                        GenerationPhase::FirstToken {
                            ttft_ms: now.duration_since(started).as_millis() as u64,
                        },
                    );
                }

                let token = GeneratedToken {
                    kind: span.kind,
                    text: span.text.clone(),
                    index: next_index,
                    is_last: false,
                };
                next_index += 1;

                match span.kind {
                    TokenKind::Content => {
                        content.push_str(&span.text);
                        content_tokens += 1;
                        self.publish(
                            &session_id,
                            Some(&model.id),
                            GenerationPhase::StreamingUpdate {
                                index: token.index,
                                text: span.text.clone(),
                            },
                        );
                    }
                    TokenKind::Thinking => thinking.push_str(&span.text),
                }

                // Hold one token back so the final one can carry is_last.
                if let Some(previous) = pending.replace(token) {
                    if !sink.on_token(&previous) {
                        sink_stopped = true;
                        pending = None;
                        break 'stream;
                    }
                }

                // Stop sequences match on concatenated content only.
                if span.kind == TokenKind::Content && stop.push(&span.text) {
                    finish = FinishReason::StopSequence;
                    break 'stream;
                }

                if next_index >= resolved.max_tokens {
                    finish = FinishReason::MaxTokens;
                    break 'stream;
                }
            }
        }

        // Flush a partial tag candidate on clean EOF.
        if backend_eof {
            if let Some(parser) = parser.as_mut() {
                for span in parser.finish() {
                    if span.text.is_empty() {
                        continue;
                    }
                    let token = GeneratedToken {
                        kind: span.kind,
                        text: span.text.clone(),
                        index: next_index,
                        is_last: false,
                    };
                    next_index += 1;
                    match span.kind {
                        TokenKind::Content => {
                            content.push_str(&span.text);
                            content_tokens += 1;
                        }
                        TokenKind::Thinking => thinking.push_str(&span.text),
                    }
                    if let Some(previous) = pending.replace(token) {
                        if !sink.on_token(&previous) {
                            sink_stopped = true;
                            pending = None;
                            break;
                        }
                    }
                }
            }
        }

        // Emit the held token as the last one.
        if let Some(mut last) = pending.take() {
            last.is_last = true;
            let _ = sink.on_token(&last);
        }

        // Stop the backend if it is still producing, then collect its
        // usage report when it finished cleanly.
        drop(rx);
        let backend_usage: Option<BackendUsage> = match backend.await {
            Ok(Ok(usage)) => Some(usage),
            Ok(Err(e)) => {
                if backend_eof && !sink_stopped {
                    self.publish(
                        &session_id,
                        Some(&model.id),
                        GenerationPhase::Failed {
                            message: e.message().to_string(),
                        },
                    );
                    return Err(e);
                }
                None
            }
            Err(_) => None,
        };

        let total_time_ms = started.elapsed().as_millis().max(1) as u64;
        let time_to_first_token_ms = first_token_at
            .map(|t| t.duration_since(started).as_millis() as u64)
            .unwrap_or(total_time_ms);

        let text = trim_stop_suffix(&content, stop.matched());
        let output_tokens = backend_usage
            .and_then(|u| u.output_tokens)
            .unwrap_or_else(|| {
                approximate_token_count(&content) + approximate_token_count(&thinking)
            });
        let prompt_tokens = backend_usage
            .and_then(|u| u.prompt_tokens)
            .unwrap_or_else(|| approximate_token_count(&effective_prompt));

        let usage = TokenUsage {
            prompt_tokens,
            output_tokens,
            thinking_tokens: thinking_token_pieces,
            content_tokens,
            tokens_per_second: output_tokens as f32 / (total_time_ms as f32 / 1000.0),
            time_to_first_token_ms,
            total_time_ms,
        };

        let result = GenerationResult {
            text,
            thinking,
            finish_reason: finish,
            usage,
        };

        sink.on_complete(&result);
        self.publish(
            &session_id,
            Some(&model.id),
            GenerationPhase::Completed { usage },
        );

        tracing::debug!(
            session_id = %session_id,
            model_id = %model.id,
            finish = ?result.finish_reason,
            content_tokens = usage.content_tokens,
            thinking_tokens = usage.thinking_tokens,
            ttft_ms = usage.time_to_first_token_ms,
            "Generation finished"
        );

        Ok(result)
    }

    /// Non-streaming convenience built on the streaming path.
    pub async fn generate(
        &self,
        service: Arc<dyn LlmService>,
        model: &ModelInfo,
        prompt: &str,
        options: &GenerationOptions,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        let mut sink = edgekit_core::CollectingSink::default();
        self.stream(service, model, prompt, options, &mut sink, cancel)
            .await
    }

    fn publish(&self, session_id: &str, model_id: Option<&str>, phase: GenerationPhase) {
        self.bus.publish(Event::new(EventPayload::Generation {
            session_id: session_id.to_string(),
            model_id: model_id.map(String::from),
            phase,
        }));
    }
}

fn build_effective_prompt(
    prompt: &str,
    system_prompt: Option<&str>,
    structured: Option<&StructuredOutputSpec>,
) -> String {
    let mut sections: Vec<String> = Vec::new();
    if let Some(system) = system_prompt {
        if !system.is_empty() {
            sections.push(system.to_string());
        }
    }
    if let Some(spec) = structured {
        let directive = spec.directive.clone().unwrap_or_else(|| {
            format!(
                "Respond only with JSON conforming to this schema: {}",
                spec.schema
            )
        });
        sections.push(directive);
    }
    sections.push(prompt.to_string());
    sections.join("\n\n")
}
