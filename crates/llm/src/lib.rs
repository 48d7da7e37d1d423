//! LLM streaming engine
//!
//! Turns a raw backend token stream into classified thinking/content
//! tokens with stop-condition enforcement, cancellation, and usage
//! accounting. See [`engine::StreamingEngine`].

pub mod engine;
pub mod estimate;
pub mod stop;
pub mod thinking;

pub use engine::StreamingEngine;
pub use estimate::approximate_token_count;
pub use stop::{trim_stop_suffix, StopMatcher};
pub use thinking::{ClassifiedSpan, ParseMode, ThinkingParser};
