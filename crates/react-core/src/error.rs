//! Error Types

use thiserror::Error;

use crate::graph::CompileError;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Tool not found in any catalog partition
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool validation failed
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// The run executed more graph steps than the configured bound
    #[error("Maximum steps ({0}) exceeded")]
    StepLimitExceeded(usize),

    /// A return-directly call id had no matching tool result
    #[error("No tool result matches return-directly call id {0}")]
    NoMatchingResult(String),

    /// Return-directly was requested for a call id the run never recorded
    #[error("Unknown tool call id: {0}")]
    UnknownToolCall(String),

    /// Tool-scope helper used outside of a tool execution
    #[error("Not inside a tool execution")]
    OutsideToolScope,

    /// Graph compilation failed
    #[error("Graph compile error: {0}")]
    Compile(#[from] CompileError),

    /// Graph routing or input shape error at run time
    #[error("Graph error: {0}")]
    Graph(String),

    /// Incremental output failed mid-stream
    #[error("Stream error: {0}")]
    Stream(String),

    /// Parse error (e.g., tool call arguments)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// True when the run stopped because it ran out of steps.
    pub const fn is_step_limit(&self) -> bool {
        matches!(self, Self::StepLimitExceeded(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            Self::ToolValidation(msg) => format!("Invalid tool input: {msg}"),
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            Self::StepLimitExceeded(_) => {
                "The request took too many steps to process. Please try a simpler query.".into()
            }
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            Self::Config(msg) => format!("The agent is misconfigured: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }

    /// Lossy copy used when one failure has to be reported to several readers.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::StepLimitExceeded(n) => Self::StepLimitExceeded(*n),
            Self::Provider(msg) => Self::Provider(msg.clone()),
            other => Self::Stream(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
