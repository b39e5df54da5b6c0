//! Conversation Messages
//!
//! Role-tagged content units exchanged between the agent, the model and the
//! tools. Assistant messages may carry tool call requests; tool messages
//! point back at the request they answer through `tool_call_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Role of a message sender
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// Tool call request emitted by the model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique id of this call within a run
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Structured arguments
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Read a string argument
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Optional name (tool name for tool messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool calls requested by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Id of the call a tool message answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message requesting tool calls
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a tool result message
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Add a name to the message
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Merge streamed chunks into one message.
    ///
    /// Content is appended in order. Tool call fragments sharing an id are
    /// folded into one call: a non-empty name replaces the previous one and
    /// object arguments are merged key by key.
    pub fn concat(chunks: &[Self]) -> Result<Self> {
        let first = chunks
            .first()
            .ok_or_else(|| AgentError::Stream("no message chunks to concatenate".into()))?;

        let mut merged = Self::new(first.role.clone(), String::new());
        merged.timestamp = first.timestamp;

        for chunk in chunks {
            merged.content.push_str(&chunk.content);
            if merged.name.is_none() {
                merged.name.clone_from(&chunk.name);
            }
            if merged.tool_call_id.is_none() {
                merged.tool_call_id.clone_from(&chunk.tool_call_id);
            }
            for call in &chunk.tool_calls {
                match merged.tool_calls.iter_mut().find(|c| c.id == call.id) {
                    Some(existing) => merge_call(existing, call),
                    None => merged.tool_calls.push(call.clone()),
                }
            }
        }

        Ok(merged)
    }
}

fn merge_call(into: &mut ToolCall, fragment: &ToolCall) {
    if !fragment.name.is_empty() {
        into.name.clone_from(&fragment.name);
    }
    match (&mut into.arguments, &fragment.arguments) {
        (serde_json::Value::Object(dst), serde_json::Value::Object(src)) => {
            for (k, v) in src {
                dst.insert(k.clone(), v.clone());
            }
        }
        (_, serde_json::Value::Null) => {}
        (dst, src) => *dst = src.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert!(!msg.has_tool_calls());

        let tool = Message::tool("42", "call-1").with_name("calculate");
        assert_eq!(tool.tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(tool.name.as_deref(), Some("calculate"));
    }

    #[test]
    fn test_concat_merges_text_and_tool_calls() {
        let chunks = vec![
            Message::assistant("Let me "),
            Message::assistant("check."),
            Message::assistant_with_tools(
                "",
                vec![ToolCall::new("c1", "lookup", json!({"q": "rust"}))],
            ),
            Message::assistant_with_tools(
                "",
                vec![
                    ToolCall::new("c1", "", json!({"limit": 3})),
                    ToolCall::new("c2", "other", json!({})),
                ],
            ),
        ];

        let merged = Message::concat(&chunks).unwrap();
        assert_eq!(merged.content, "Let me check.");
        assert_eq!(merged.tool_calls.len(), 2);
        assert_eq!(merged.tool_calls[0].name, "lookup");
        assert_eq!(merged.tool_calls[0].arguments, json!({"q": "rust", "limit": 3}));
        assert_eq!(merged.tool_calls[1].id, "c2");
    }

    #[test]
    fn test_concat_empty_is_error() {
        assert!(Message::concat(&[]).is_err());
    }

    #[test]
    fn test_serde_skips_empty_tool_fields() {
        let raw = serde_json::to_value(Message::assistant("hi")).unwrap();
        assert!(raw.get("tool_calls").is_none());
        assert!(raw.get("tool_call_id").is_none());
        assert_eq!(raw["role"], "assistant");
    }
}
