//! Ollama Model
//!
//! `ToolCallingModel` over Ollama's `/api/chat` endpoint with native tool
//! calling. Streaming responses are newline-delimited JSON; a spawned task
//! parses them into a channel-backed `StreamReader`, and stops reading (which
//! drops the HTTP body) as soon as the reader is closed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use react_core::{
    error::{AgentError, Result},
    message::{Message, Role, ToolCall},
    provider::{ChatModel, GenerationOptions, MessageStream, ToolCallingModel},
    stream::{StreamReader, StreamWriter},
    tool::ToolSchema,
};
use serde::{Deserialize, Serialize};

/// Ollama connection settings
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Timeout for one-shot requests, in seconds
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            timeout_secs: 120,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost".into());
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(11434);

        Self {
            host,
            port,
            ..Default::default()
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}:{}", self.host.trim_end_matches('/'), self.port)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    options: WireOptions,
}

#[derive(Serialize)]
struct WireOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct WireMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Serialize, Deserialize, Debug)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Deserialize, Debug)]
struct ChatChunk {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Ollama chat model, optionally bound to a tool list
pub struct OllamaModel {
    client: reqwest::Client,
    config: OllamaConfig,
    tools: Vec<ToolSchema>,
}

impl OllamaModel {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            tools: Vec::new(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::new(OllamaConfig::from_env())
    }

    /// Create with default localhost settings
    pub fn localhost() -> Self {
        Self::new(OllamaConfig::default())
    }

    /// True if the server answers `/api/tags`.
    pub async fn health_check(&self) -> Result<bool> {
        match self.fetch_tags().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(error = %e, "Ollama health check failed");
                Ok(false)
            }
        }
    }

    /// Names of the locally installed models.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let tags = self.fetch_tags().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn fetch_tags(&self) -> Result<TagsResponse> {
        let url = format!("{}/api/tags", self.config.base_url());
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("Invalid /api/tags response: {e}")))
    }

    fn build_request<'a>(
        &self,
        messages: &[Message],
        options: &'a GenerationOptions,
        stream: bool,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &options.model,
            messages: messages.iter().map(to_wire).collect(),
            stream,
            tools: self.tools.iter().map(tool_definition).collect(),
            options: WireOptions {
                temperature: options.temperature,
                top_p: options.top_p,
                num_predict: options.max_tokens,
                stop: options.stop_sequences.clone(),
            },
        }
    }

    async fn post_chat(&self, request: &ChatRequest<'_>, timeout: bool) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.config.base_url());
        let mut builder = self.client.post(&url).json(request);
        if timeout {
            builder = builder.timeout(Duration::from_secs(self.config.timeout_secs));
        }
        let response = builder.send().await.map_err(request_error)?;
        check_status(response).await
    }
}

#[async_trait]
impl ChatModel for OllamaModel {
    async fn generate(&self, messages: &[Message], options: &GenerationOptions) -> Result<Message> {
        let request = self.build_request(messages, options, false);
        tracing::debug!(model = %options.model, messages = messages.len(), tools = self.tools.len(), "Ollama chat");

        let body = self
            .post_chat(&request, true)
            .await?
            .text()
            .await
            .map_err(|e| AgentError::Provider(format!("Failed to read Ollama response: {e}")))?;

        Ok(parse_line(&body)?.unwrap_or_else(|| Message::assistant("")))
    }

    async fn stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<MessageStream> {
        let request = self.build_request(messages, options, true);
        tracing::debug!(model = %options.model, messages = messages.len(), tools = self.tools.len(), "Ollama chat stream");

        let response = self.post_chat(&request, false).await?;
        let (writer, reader) = StreamReader::channel();
        tokio::spawn(pump_ndjson(response, writer));
        Ok(reader)
    }
}

impl ToolCallingModel for OllamaModel {
    fn with_tools(&self, tools: Vec<ToolSchema>) -> Result<Arc<dyn ToolCallingModel>> {
        for tool in &tools {
            tool.validate()?;
        }
        Ok(Arc::new(Self {
            client: self.client.clone(),
            config: self.config.clone(),
            tools,
        }))
    }
}

async fn pump_ndjson(response: reqwest::Response, writer: StreamWriter<Message>) {
    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(bytes) = body.next().await {
        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(e) => {
                writer.send(Err(AgentError::Provider(format!("Ollama stream failed: {e}"))));
                return;
            }
        };
        buffer.extend_from_slice(&bytes);

        for line in drain_lines(&mut buffer) {
            match parse_line(&line) {
                Ok(Some(message)) => {
                    if !writer.send(Ok(message)) {
                        tracing::debug!("Ollama stream reader closed early");
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    writer.send(Err(e));
                    return;
                }
            }
        }
    }

    let tail = String::from_utf8_lossy(&buffer);
    if !tail.trim().is_empty() {
        match parse_line(&tail) {
            Ok(Some(message)) => {
                writer.send(Ok(message));
            }
            Ok(None) => {}
            Err(e) => {
                writer.send(Err(e));
            }
        }
    }
}

/// Split complete lines off the front of `buffer`. Splitting on bytes keeps
/// multi-byte characters that straddle two network chunks intact.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let Some(last_newline) = buffer.iter().rposition(|&b| b == b'\n') else {
        return Vec::new();
    };
    let rest = buffer.split_off(last_newline + 1);
    let complete = std::mem::replace(buffer, rest);
    String::from_utf8_lossy(&complete)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// One response object to a message; `None` for empty keep-alive chunks.
fn parse_line(line: &str) -> Result<Option<Message>> {
    let chunk: ChatChunk = serde_json::from_str(line.trim())
        .map_err(|e| AgentError::Parse(format!("Invalid Ollama chunk: {e}")))?;
    if let Some(error) = chunk.error {
        return Err(AgentError::Provider(error));
    }
    let Some(message) = chunk.message else {
        return Ok(None);
    };
    if message.content.is_empty() && message.tool_calls.is_empty() && !chunk.done {
        return Ok(None);
    }
    Ok(Some(from_wire(message)))
}

fn to_wire(message: &Message) -> WireMessage {
    let tool_calls = message
        .tool_calls
        .iter()
        .map(|call| WireToolCall {
            function: WireFunction {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        })
        .collect();

    WireMessage {
        role: message.role.to_string(),
        content: message.content.clone(),
        tool_calls,
        tool_name: match message.role {
            Role::Tool => message.name.clone(),
            _ => None,
        },
    }
}

fn from_wire(message: WireMessage) -> Message {
    if message.tool_calls.is_empty() {
        return Message::assistant(message.content);
    }
    // Ollama does not assign call ids.
    let calls = message
        .tool_calls
        .into_iter()
        .map(|call| {
            ToolCall::new(
                uuid::Uuid::new_v4().to_string(),
                call.function.name,
                call.function.arguments,
            )
        })
        .collect();
    Message::assistant_with_tools(message.content, calls)
}

fn tool_definition(schema: &ToolSchema) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": schema.name,
            "description": schema.description,
            "parameters": schema.to_json_schema(),
        }
    })
}

fn request_error(e: reqwest::Error) -> AgentError {
    if e.is_connect() || e.is_timeout() {
        AgentError::ProviderUnavailable(e.to_string())
    } else {
        AgentError::Provider(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(AgentError::RateLimited(text));
    }
    Err(AgentError::Provider(format!("Ollama API error ({status}): {text}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use react_core::tool::ParameterSchema;
    use serde_json::json;

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
        assert_eq!(config.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_request_carries_tools_and_tool_names() {
        let model = OllamaModel {
            client: reqwest::Client::new(),
            config: OllamaConfig::default(),
            tools: vec![
                ToolSchema::new("calc", "Evaluate").param(ParameterSchema::string("expression", "Math")),
            ],
        };
        let options = GenerationOptions::default();
        let messages = vec![
            Message::user("2+2?"),
            Message::tool("4", "call-1").with_name("calc"),
        ];

        let request = serde_json::to_value(model.build_request(&messages, &options, false)).unwrap();

        assert_eq!(request["tools"][0]["function"]["name"], "calc");
        assert_eq!(
            request["tools"][0]["function"]["parameters"]["required"],
            json!(["expression"])
        );
        assert_eq!(request["messages"][1]["role"], "tool");
        assert_eq!(request["messages"][1]["tool_name"], "calc");
        assert!(request["messages"][0].get("tool_name").is_none());
        assert_eq!(request["stream"], false);
    }

    #[test]
    fn test_with_tools_leaves_receiver_unbound() {
        let base = OllamaModel::localhost();
        base.with_tools(vec![ToolSchema::new("calc", "Evaluate")]).unwrap();
        assert!(base.tools.is_empty());
        assert!(base.with_tools(vec![ToolSchema::new("", "nameless")]).is_err());
    }

    #[test]
    fn test_parse_tool_call_chunk() {
        let line = json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{ "function": { "name": "calc", "arguments": { "expression": "2+2" } } }]
            },
            "done": false
        })
        .to_string();

        let message = parse_line(&line).unwrap().unwrap();
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].name, "calc");
        assert!(!message.tool_calls[0].id.is_empty());
        assert_eq!(message.tool_calls[0].str_arg("expression"), Some("2+2"));
    }

    #[test]
    fn test_parse_skips_empty_chunks_and_reports_errors() {
        let empty = r#"{"message":{"role":"assistant","content":""},"done":false}"#;
        assert!(parse_line(empty).unwrap().is_none());

        let err = parse_line(r#"{"error":"model not found"}"#).unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
        assert!(parse_line("not json").is_err());
    }

    #[test]
    fn test_drain_lines_keeps_partial_tail() {
        let mut buffer = b"{\"a\":1}\n\n{\"b\":2}\n{\"c\"".to_vec();
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(buffer, b"{\"c\"");
        assert!(drain_lines(&mut buffer).is_empty());
    }
}
