//! Tool System
//!
//! Capability interface implemented by every tool the agent can call, plus
//! the schema ("tool info") advertised to the model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::{Message, ToolCall};

const JSON_TYPES: &[&str] = &["string", "number", "integer", "boolean", "object", "array"];

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (success message or error)
    pub output: String,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            output: error.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Tool-role message answering `call_id`.
    pub fn into_message(self, call_id: &str) -> Message {
        let content = if self.success {
            self.output
        } else {
            format!("Error: {}", self.output)
        };
        Message::tool(content, call_id).with_name(self.name)
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
}

impl ParameterSchema {
    /// Required string parameter
    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: "string".into(),
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Tool definition advertised to the model (the "tool info")
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Category for grouping
    #[serde(default)]
    pub category: Option<String>,

    /// Whether tool has side effects
    #[serde(default)]
    pub has_side_effects: bool,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            category: None,
            has_side_effects: false,
        }
    }

    #[must_use]
    pub fn param(mut self, param: ParameterSchema) -> Self {
        self.parameters.push(param);
        self
    }

    /// Reject schemas a model provider could not accept.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AgentError::Config("tool name must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for param in &self.parameters {
            if param.name.trim().is_empty() {
                return Err(AgentError::Config(format!(
                    "tool '{}' has a parameter without a name",
                    self.name
                )));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(AgentError::Config(format!(
                    "tool '{}' declares parameter '{}' twice",
                    self.name, param.name
                )));
            }
            if !JSON_TYPES.contains(&param.param_type.as_str()) {
                return Err(AgentError::Config(format!(
                    "tool '{}' parameter '{}' has unknown type '{}'",
                    self.name, param.name, param.param_type
                )));
            }
        }

        Ok(())
    }

    /// Parameters rendered as a JSON Schema object.
    pub fn to_json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = serde_json::Map::new();
            prop.insert("type".into(), param.param_type.clone().into());
            prop.insert("description".into(), param.description.clone().into());
            if let Some(values) = &param.enum_values {
                prop.insert("enum".into(), serde_json::Value::Array(values.clone()));
            }
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            if param.required {
                required.push(serde_json::Value::String(param.name.clone()));
            }
            properties.insert(param.name.clone(), serde_json::Value::Object(prop));
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for LLM function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult>;

    /// Validate arguments before execution (optional)
    fn validate(&self, call: &ToolCall) -> Result<()> {
        let schema = self.schema();

        for param in &schema.parameters {
            if param.required && call.arguments.get(&param.name).is_none() {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// Validate and index tools by name. Later duplicates replace earlier ones.
pub fn tools_to_map(tools: &[Arc<dyn Tool>]) -> Result<HashMap<String, Arc<dyn Tool>>> {
    let mut map = HashMap::with_capacity(tools.len());
    for tool in tools {
        let schema = tool.schema();
        schema.validate()?;
        map.insert(schema.name, Arc::clone(tool));
    }
    Ok(map)
}

/// Validate schemas for a tool list, preserving order.
pub fn tool_schemas(tools: &[Arc<dyn Tool>]) -> Result<Vec<ToolSchema>> {
    tools
        .iter()
        .map(|tool| {
            let schema = tool.schema();
            schema.validate()?;
            Ok(schema)
        })
        .collect()
}

/// Validate, then execute; failures become an unsuccessful result.
pub async fn run_tool(tool: &dyn Tool, call: &ToolCall) -> ToolResult {
    let outcome = match tool.validate(call) {
        Ok(()) => tool.execute(call).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(result) => result.with_id(call.id.clone()),
        Err(e) => {
            tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool failed");
            ToolResult::failure(call.name.clone(), e.to_string()).with_id(call.id.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("echo", "Echo the text back")
                .param(ParameterSchema::string("text", "Text to echo"))
        }

        async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
            Ok(ToolResult::success("echo", call.str_arg("text").unwrap_or_default()))
        }
    }

    #[test]
    fn test_schema_validation() {
        assert!(Echo.schema().validate().is_ok());
        assert!(ToolSchema::new(" ", "blank").validate().is_err());

        let dup = ToolSchema::new("dup", "")
            .param(ParameterSchema::string("a", ""))
            .param(ParameterSchema::string("a", ""));
        assert!(matches!(dup.validate(), Err(AgentError::Config(_))));

        let mut bad_type = ParameterSchema::string("a", "");
        bad_type.param_type = "text".into();
        assert!(ToolSchema::new("t", "").param(bad_type).validate().is_err());
    }

    #[test]
    fn test_json_schema_rendering() {
        let schema = ToolSchema::new("t", "")
            .param(ParameterSchema::string("a", "first"))
            .param(ParameterSchema::string("b", "second").optional());
        let rendered = schema.to_json_schema();
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["properties"]["a"]["type"], "string");
        assert_eq!(rendered["required"], json!(["a"]));
    }

    #[tokio::test]
    async fn test_run_tool_reports_validation_failure() {
        let call = ToolCall::new("c1", "echo", json!({}));
        let result = run_tool(&Echo, &call).await;
        assert!(!result.success);
        assert_eq!(result.id.as_deref(), Some("c1"));

        let msg = result.into_message("c1");
        assert!(msg.content.starts_with("Error: "));
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_run_tool_success() {
        let call = ToolCall::new("c2", "echo", json!({"text": "hi"}));
        let msg = run_tool(&Echo, &call).await.into_message("c2");
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.name.as_deref(), Some("echo"));
    }
}
