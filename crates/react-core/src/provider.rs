//! LLM Provider Strategy Pattern
//!
//! Defines the interface the agent needs from any tool-calling model backend
//! (Ollama, OpenAI, Anthropic, ...). The agent only talks to models through
//! these traits.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use react_core::provider::{ChatModel, GenerationOptions};
//!
//! let bound = model.with_tools(schemas)?;
//! let reply = bound.generate(&messages, &GenerationOptions::default()).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::message::Message;
use crate::stream::StreamReader;
use crate::tool::ToolSchema;

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "llama3.2", "qwen2.5")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

const fn default_temperature() -> f32 {
    0.7
}
const fn default_max_tokens() -> u32 {
    2048
}
const fn default_top_p() -> f32 {
    0.9
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            stop_sequences: Vec::new(),
        }
    }
}

/// Incremental assistant output
pub type MessageStream = StreamReader<Message>;

/// One-shot and incremental generation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a complete assistant message
    async fn generate(&self, messages: &[Message], options: &GenerationOptions) -> Result<Message>;

    /// Generate incrementally; chunks concatenate to the full message
    async fn stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<MessageStream>;
}

/// A chat model that can be bound to a tool list.
pub trait ToolCallingModel: ChatModel {
    /// New model bound to `tools`; `self` is left as it was.
    fn with_tools(&self, tools: Vec<ToolSchema>) -> Result<Arc<dyn ToolCallingModel>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens, 2048);
        assert_eq!(opts.model, "llama3.2");
    }

    #[test]
    fn test_generation_options_serde_defaults() {
        let opts: GenerationOptions = serde_json::from_str(r#"{"model": "qwen2.5"}"#).unwrap();
        assert_eq!(opts.model, "qwen2.5");
        assert_eq!(opts.max_tokens, 2048);
        assert!(opts.stop_sequences.is_empty());
    }
}
