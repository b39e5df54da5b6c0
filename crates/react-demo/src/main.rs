//! react-demo
//!
//! Asks a local Ollama model one question. The model starts out seeing only
//! `datetime` and the reveal tool; `calculate` is injected for this call and
//! has to be requested by name before it can be used.
//!
//! ```text
//! OLLAMA_MODEL=qwen2.5 cargo run -p react-demo -- "What is 17.5% of 2,340?"
//! ```

mod tools;

use std::io::Write;
use std::sync::Arc;

use react_core::{Message, REVEAL_TOOL_NAME, ReactAgent, Tool, with_tools};
use react_runtime::OllamaModel;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::tools::{CalculatorTool, DateTimeTool};

const DEFAULT_PROMPT: &str = "What is (1234 * 5678) / 2? Use a tool for the arithmetic.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,react_core=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let model = Arc::new(OllamaModel::from_env());
    if model.health_check().await? {
        tracing::info!("✓ Connected to Ollama");
        if let Ok(models) = model.list_models().await {
            for name in models {
                tracing::info!("  Model: {}", name);
            }
        }
    } else {
        tracing::warn!("⚠ Ollama not available - the run will fail");
        tracing::warn!("  Make sure Ollama is running: ollama serve");
    }

    let model_name = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "qwen2.5".into());
    let agent = ReactAgent::builder(model)
        .tool(DateTimeTool)
        .model_name(model_name)
        .system_prompt(format!(
            "You are a helpful assistant. Some tools are hidden until you request them with \
             `{REVEAL_TOOL_NAME}`. A calculator named `calculate` is available that way."
        ))
        .build()?;

    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let prompt = if prompt.trim().is_empty() {
        DEFAULT_PROMPT.to_string()
    } else {
        prompt
    };
    tracing::info!(%prompt, "Asking");

    let extra = with_tools(vec![Arc::new(CalculatorTool) as Arc<dyn Tool>])?;
    let mut answer = agent.stream(vec![Message::user(prompt)], &[extra])?;

    let mut stdout = std::io::stdout();
    while let Some(chunk) = answer.recv().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                writeln!(stdout)?;
                eprintln!("{}", e.user_message());
                return Err(e.into());
            }
        };
        write!(stdout, "{}", chunk.content)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;

    Ok(())
}
