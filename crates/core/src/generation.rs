//! Generation option and token types
//!
//! The streaming contract is sink-based: `on_token` returns `false` to stop
//! generation immediately, which decouples back-pressure and cancellation
//! from async syntax.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Open/close pair bounding thinking tokens in a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingTagPair {
    pub open: String,
    pub close: String,
}

impl Default for ThinkingTagPair {
    fn default() -> Self {
        Self {
            open: "<thinking>".to_string(),
            close: "</thinking>".to_string(),
        }
    }
}

impl ThinkingTagPair {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }
}

/// Structured-output directive prefixed to the effective prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredOutputSpec {
    /// JSON schema the response must conform to
    pub schema: serde_json::Value,
    /// Directive text injected ahead of the prompt
    pub directive: Option<String>,
}

/// Per-request generation options.
///
/// Unset fields fall through to remote configuration and then SDK defaults
/// during resolution; see the config resolver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<StructuredOutputSpec>,
    /// Tag pair for thinking extraction; `None` uses the model default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_tags: Option<ThinkingTagPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_stop_sequence(mut self, stop: impl Into<String>) -> Self {
        self.stop_sequences.push(stop.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_thinking_tags(mut self, tags: ThinkingTagPair) -> Self {
        self.thinking_tags = Some(tags);
        self
    }
}

/// Classification of a streamed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Thinking,
    Content,
}

/// One classified token emitted by the streaming engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedToken {
    pub kind: TokenKind,
    pub text: String,
    /// Strictly increasing from 0 within one generation, no gaps.
    pub index: u32,
    pub is_last: bool,
}

/// Why a generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Backend reached end of stream
    Stop,
    MaxTokens,
    StopSequence,
    Cancelled,
}

/// Final token accounting for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub output_tokens: u32,
    pub thinking_tokens: u32,
    pub content_tokens: u32,
    pub tokens_per_second: f32,
    pub time_to_first_token_ms: u64,
    pub total_time_ms: u64,
}

/// Completed generation summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Concatenated content text (thinking excluded)
    pub text: String,
    /// Concatenated thinking text, empty when the model does not think
    pub thinking: String,
    pub finish_reason: FinishReason,
    pub usage: TokenUsage,
}

/// Receiver side of the streaming contract.
///
/// Returning `false` from `on_token` stops the generation; the engine then
/// emits the completion exactly once via `on_complete`.
pub trait TokenSink: Send {
    fn on_token(&mut self, token: &GeneratedToken) -> bool;

    fn on_complete(&mut self, result: &GenerationResult) {
        let _ = result;
    }
}

/// Collects every token; never applies back-pressure. Handy in tests and
/// for non-streaming callers built on the streaming path.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub tokens: Vec<GeneratedToken>,
    pub result: Option<GenerationResult>,
}

impl TokenSink for CollectingSink {
    fn on_token(&mut self, token: &GeneratedToken) -> bool {
        self.tokens.push(token.clone());
        true
    }

    fn on_complete(&mut self, result: &GenerationResult) {
        self.result = Some(result.clone());
    }
}

/// Adapts a closure into a [`TokenSink`].
pub struct FnSink<F>(pub F);

impl<F> TokenSink for FnSink<F>
where
    F: FnMut(&GeneratedToken) -> bool + Send,
{
    fn on_token(&mut self, token: &GeneratedToken) -> bool {
        (self.0)(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let options = GenerationOptions::new()
            .with_max_tokens(128)
            .with_temperature(0.2)
            .with_stop_sequence("\n\n");
        assert_eq!(options.max_tokens, Some(128));
        assert_eq!(options.stop_sequences, vec!["\n\n"]);
    }

    #[test]
    fn test_collecting_sink() {
        let mut sink = CollectingSink::default();
        let token = GeneratedToken {
            kind: TokenKind::Content,
            text: "hi".into(),
            index: 0,
            is_last: true,
        };
        assert!(sink.on_token(&token));
        assert_eq!(sink.tokens.len(), 1);
    }

    #[test]
    fn test_closure_sink_stops() {
        let mut count = 0usize;
        let mut sink = FnSink(move |_t: &GeneratedToken| {
            count += 1;
            count < 2
        });
        let token = GeneratedToken {
            kind: TokenKind::Content,
            text: "x".into(),
            index: 0,
            is_last: false,
        };
        assert!(sink.on_token(&token));
        assert!(!sink.on_token(&token));
    }
}
