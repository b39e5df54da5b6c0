//! # react-runtime
//!
//! Model runtimes for react-core.
//!
//! ## Models
//!
//! - **Ollama** (default): local inference with native tool calling
//!
//! ## Usage
//!
//! ```rust,ignore
//! use react_runtime::ollama::OllamaModel;
//!
//! let model = Arc::new(OllamaModel::from_env());
//! let agent = ReactAgent::builder(model)
//!     .model_name("qwen2.5")
//!     .build()?;
//! ```

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaModel};

// Re-export core types for convenience
pub use react_core::{
    AgentError, Message, ReactAgent, Result, Role, Tool, ToolCallingModel, with_tools,
};
