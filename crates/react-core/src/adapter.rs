//! Model Adapter
//!
//! `SwappableModel` is the model handle registered in the agent's graph. Its
//! tool binding can be replaced mid-run (after a reveal) while every holder of
//! the `Arc<SwappableModel>` keeps talking to the same object.

use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::Result;
use crate::message::Message;
use crate::provider::{ChatModel, GenerationOptions, MessageStream, ToolCallingModel};
use crate::tool::ToolSchema;

pub struct SwappableModel {
    original: Arc<dyn ToolCallingModel>,
    current: RwLock<Arc<dyn ToolCallingModel>>,
}

impl SwappableModel {
    pub fn new(model: Arc<dyn ToolCallingModel>) -> Self {
        Self {
            current: RwLock::new(Arc::clone(&model)),
            original: model,
        }
    }

    /// Rebind to `tools`.
    ///
    /// Binding always starts from the original model so repeated swaps do not
    /// stack. On error the current binding is left untouched.
    pub fn replace_tools(&self, tools: Vec<ToolSchema>) -> Result<&Self> {
        let count = tools.len();
        let bound = self.original.with_tools(tools)?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = bound;
        tracing::debug!(tools = count, "Model rebound to new tool set");
        Ok(self)
    }

    fn current(&self) -> Arc<dyn ToolCallingModel> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl ChatModel for SwappableModel {
    async fn generate(&self, messages: &[Message], options: &GenerationOptions) -> Result<Message> {
        self.current().generate(messages, options).await
    }

    async fn stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<MessageStream> {
        self.current().stream(messages, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockModel, MockReply};

    fn names(model: &MockModel) -> Vec<String> {
        model.bound_tool_names()
    }

    #[tokio::test]
    async fn test_replace_binds_from_original() {
        let base = Arc::new(MockModel::new(vec![MockReply::text("ok"), MockReply::text("ok")]));
        let adapter = SwappableModel::new(base.clone());

        adapter.replace_tools(vec![ToolSchema::new("a", "")]).unwrap();
        adapter.replace_tools(vec![ToolSchema::new("b", "")]).unwrap();

        // The original never gets bound itself; each swap derives from it.
        assert!(names(&base).is_empty());
        assert_eq!(base.bindings(), vec![vec!["a".to_string()], vec!["b".to_string()]]);

        adapter.generate(&[Message::user("hi")], &GenerationOptions::default()).await.unwrap();
        assert_eq!(base.last_seen_tools(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_binding() {
        let base = Arc::new(MockModel::new(vec![MockReply::text("ok")]));
        let adapter = SwappableModel::new(base.clone());
        adapter.replace_tools(vec![ToolSchema::new("a", "")]).unwrap();

        base.fail_next_binding();
        assert!(adapter.replace_tools(vec![ToolSchema::new("b", "")]).is_err());

        adapter.generate(&[Message::user("hi")], &GenerationOptions::default()).await.unwrap();
        assert_eq!(base.last_seen_tools(), vec!["a".to_string()]);
    }
}
