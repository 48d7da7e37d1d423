//! Three-layer option resolution
//!
//! Precedence (highest first): runtime options, remote configuration, SDK
//! defaults. Hard limits are clamped after resolution, so a runtime caller
//! can never exceed the remote token budget or the model context length.
//! Stop sequences are unioned across layers, runtime first, duplicates
//! removed with order preserved.

use std::time::Duration;

use parking_lot::RwLock;

use edgekit_core::GenerationOptions;

use crate::data::{ConfigurationData, GenerationConfig, StageTimeouts};

/// Fully resolved options handed to the streaming engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop_sequences: Vec<String>,
    pub system_prompt: Option<String>,
    pub timeout: Duration,
}

impl ResolvedOptions {
    /// Re-express as runtime options; feeding these back through the
    /// resolver yields the same result (resolution is idempotent).
    pub fn as_runtime_options(&self) -> GenerationOptions {
        GenerationOptions {
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            top_p: Some(self.top_p),
            stop_sequences: self.stop_sequences.clone(),
            system_prompt: self.system_prompt.clone(),
            structured_output: None,
            thinking_tags: None,
            timeout: Some(self.timeout),
        }
    }
}

/// Holds the defaults layer and the latest remote snapshot.
pub struct ConfigResolver {
    defaults: ConfigurationData,
    remote: RwLock<Option<ConfigurationData>>,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new(ConfigurationData::sdk_defaults())
    }
}

impl ConfigResolver {
    pub fn new(defaults: ConfigurationData) -> Self {
        Self {
            defaults,
            remote: RwLock::new(None),
        }
    }

    /// Install or replace the remote configuration layer.
    pub fn set_remote(&self, remote: ConfigurationData) {
        tracing::debug!(source = ?remote.source, "Installing remote configuration layer");
        *self.remote.write() = Some(remote);
    }

    pub fn clear_remote(&self) {
        *self.remote.write() = None;
    }

    pub fn has_remote(&self) -> bool {
        self.remote.read().is_some()
    }

    /// Effective full snapshot: remote when present, defaults otherwise.
    pub fn effective(&self) -> ConfigurationData {
        self.remote
            .read()
            .clone()
            .unwrap_or_else(|| self.defaults.clone())
    }

    pub fn stage_timeouts(&self) -> StageTimeouts {
        self.effective().timeouts
    }

    /// Resolve generation options for one request.
    ///
    /// `context_length` is the loaded model's effective context length and
    /// participates in the hard clamp.
    pub fn resolve(
        &self,
        runtime: &GenerationOptions,
        context_length: Option<u32>,
    ) -> ResolvedOptions {
        let remote_guard = self.remote.read();
        let remote = remote_guard.as_ref().map(|r| &r.generation);
        let defaults = &self.defaults.generation;
        let allow_override = remote_guard
            .as_ref()
            .map(|r| r.allow_user_override)
            .unwrap_or(self.defaults.allow_user_override);

        let mut max_tokens = pick(
            runtime.max_tokens,
            remote.and_then(|r| r.max_tokens),
            defaults.max_tokens,
        )
        .unwrap_or(256);
        let mut temperature = pick(
            runtime.temperature,
            remote.and_then(|r| r.temperature),
            defaults.temperature,
        )
        .unwrap_or(0.7);
        let mut top_p = pick(
            runtime.top_p,
            remote.and_then(|r| r.top_p),
            defaults.top_p,
        )
        .unwrap_or(0.9);

        // allow_user_override=false clamps runtime values to the remote
        // layer instead of ignoring them outright.
        if !allow_override {
            if let Some(remote) = remote {
                if let Some(remote_max) = remote.max_tokens {
                    max_tokens = max_tokens.min(remote_max);
                }
                if let Some(remote_temp) = remote.temperature {
                    temperature = remote_temp;
                }
                if let Some(remote_top_p) = remote.top_p {
                    top_p = remote_top_p;
                }
            }
        }

        // Hard limits apply after layering regardless of override policy.
        if let Some(budget) = remote
            .and_then(|r| r.token_budget)
            .or(defaults.token_budget)
        {
            max_tokens = max_tokens.min(budget.max_tokens_per_request);
        }
        if let Some(context_length) = context_length {
            max_tokens = max_tokens.min(context_length);
        }

        let stop_sequences = union_stop_sequences([
            runtime.stop_sequences.as_slice(),
            remote.map(|r| r.stop_sequences.as_slice()).unwrap_or(&[]),
            defaults.stop_sequences.as_slice(),
        ]);

        let system_prompt = runtime
            .system_prompt
            .clone()
            .or_else(|| remote.and_then(|r| r.system_prompt.clone()))
            .or_else(|| defaults.system_prompt.clone());

        let timeout = runtime.timeout.unwrap_or_else(|| {
            remote_guard
                .as_ref()
                .map(|r| r.timeouts.llm)
                .unwrap_or(self.defaults.timeouts.llm)
        });

        ResolvedOptions {
            max_tokens,
            temperature,
            top_p,
            stop_sequences,
            system_prompt,
            timeout,
        }
    }
}

fn pick<T>(runtime: Option<T>, remote: Option<T>, default: Option<T>) -> Option<T> {
    runtime.or(remote).or(default)
}

fn union_stop_sequences<'a>(layers: [&'a [String]; 3]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for layer in layers {
        for stop in layer {
            if !out.iter().any(|s| s == stop) {
                out.push(stop.clone());
            }
        }
    }
    out
}
