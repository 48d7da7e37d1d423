//! Language model backend interface

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::generation::GenerationOptions;

/// Token accounting reported by a backend, when it reports any.
///
/// Backends that do not count tokens leave both fields `None`; the
/// streaming engine falls back to its own estimation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendUsage {
    pub prompt_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

/// Live handle to an initialized language model backend.
///
/// Implementations wrap a concrete engine (llama.cpp, ONNX Runtime, a
/// remote endpoint) behind the adapter registry.
#[async_trait]
pub trait LlmService: Send + Sync {
    async fn initialize(&self, model_path: Option<&Path>) -> Result<()>;

    /// Stream raw text pieces to `tokens` as the backend produces them.
    ///
    /// The service must observe `cancel` between tokens and stop promptly.
    /// A closed receiver is equivalent to cancellation.
    async fn stream_generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        tokens: mpsc::Sender<String>,
        cancel: &CancellationToken,
    ) -> Result<BackendUsage>;

    /// Non-streaming generation; collects the streamed pieces by default.
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let cancel = CancellationToken::new();
        let collector = tokio::spawn(async move {
            let mut text = String::new();
            while let Some(piece) = rx.recv().await {
                text.push_str(&piece);
            }
            text
        });
        self.stream_generate(prompt, options, tx, &cancel).await?;
        Ok(collector.await.unwrap_or_default())
    }

    fn is_ready(&self) -> bool;

    /// Identifier of the currently loaded model, if any.
    fn current_model(&self) -> Option<String>;

    async fn cleanup(&self) -> Result<()>;
}
