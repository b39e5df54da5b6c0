//! # react-core
//!
//! Tool-calling ReAct agent with lazy tool disclosure.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         ReactAgent                           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐  │
//! │  │ StateGraph  │  │ ToolCatalog │  │   SwappableModel     │  │
//! │  │ chat ⇄ tools│──│ visible/    │──│  (ToolCallingModel)  │  │
//! │  │  TurnState  │  │ extra       │  │                      │  │
//! │  └─────────────┘  └─────────────┘  └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The model starts out seeing only the configured tools plus a reveal tool.
//! Tools injected for one call with [`options::with_tools`] stay hidden until
//! the model asks for them by name; the reveal rebinds the model in place.
//!
//! ```rust,ignore
//! let agent = ReactAgent::builder(model)
//!     .tool(DateTimeTool)
//!     .return_directly("datetime")
//!     .build()?;
//!
//! let extra = with_tools(vec![Arc::new(CalculatorTool)])?;
//! let answer = agent.generate(vec![Message::user("What is 6*7?")], &[extra]).await?;
//! ```

pub mod adapter;
pub mod agent;
pub mod catalog;
pub mod error;
pub mod graph;
pub mod message;
pub mod mock;
pub mod options;
pub mod provider;
pub mod state;
pub mod stream;
pub mod tool;

pub use adapter::SwappableModel;
pub use agent::{
    AgentConfig, ConcatChecker, FirstChunkChecker, ReactAgent, ReactAgentBuilder, ToolCallChecker,
    Turn,
};
pub use catalog::{REVEAL_TOOL_NAME, ToolCatalog};
pub use error::{AgentError, Result};
pub use message::{Message, Role, ToolCall};
pub use options::{AgentOption, CallOption, GenerationTweak, with_generation_options, with_tools};
pub use provider::{ChatModel, GenerationOptions, ToolCallingModel};
pub use state::{TurnState, current_tool_name, set_return_directly};
pub use stream::{StreamReader, StreamWriter};
pub use tool::{ParameterSchema, Tool, ToolResult, ToolSchema};
