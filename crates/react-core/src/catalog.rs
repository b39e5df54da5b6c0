//! Tool Catalog
//!
//! Splits the agent's tools by disclosure status:
//!
//! ```text
//!   original ──init()──▶ visible ◀──reveal── extra
//!   (fixed at build)     (advertised)        (injected per call, hidden)
//! ```
//!
//! The model only sees `visible`. Tools injected for one call sit in `extra`
//! until the model asks for them by name through the reveal tool, which moves
//! them into `visible` and rebinds the model to the grown set.
//!
//! The catalog is owned by one agent and reset at the start of every run. The
//! internal lock only keeps the partitions consistent; two runs sharing one
//! agent concurrently still see each other's reveals.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::adapter::SwappableModel;
use crate::error::{AgentError, Result};
use crate::message::ToolCall;
use crate::tool::{ParameterSchema, Tool, ToolResult, ToolSchema};

/// Name of the synthesized reveal tool.
pub const REVEAL_TOOL_NAME: &str = "special_get_tool";

const REVEAL_TOOL_DESCRIPTION: &str = "Request access to a tool that is not in your current tool list. \
Pass the exact tool name. On success the tool can be called from your next turn on.";

/// How a lookup found its tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disclosure {
    /// Already advertised
    Visible,
    /// Moved out of `extra` by this lookup
    Revealed,
}

#[derive(Default)]
struct Partitions {
    visible: Vec<Arc<dyn Tool>>,
    visible_index: HashMap<String, usize>,
    extra: HashMap<String, Arc<dyn Tool>>,
}

impl Partitions {
    fn from_original(original: &[(String, Arc<dyn Tool>)]) -> Self {
        let mut partitions = Self::default();
        for (name, tool) in original {
            partitions.push_visible(name.clone(), Arc::clone(tool));
        }
        partitions
    }

    fn push_visible(&mut self, name: String, tool: Arc<dyn Tool>) {
        self.visible_index.insert(name, self.visible.len());
        self.visible.push(tool);
    }

    fn remove_visible(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        let idx = self.visible_index.remove(name)?;
        let tool = self.visible.remove(idx);
        for slot in self.visible_index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Some(tool)
    }
}

pub struct ToolCatalog {
    model: Arc<SwappableModel>,
    original: Vec<(String, Arc<dyn Tool>)>,
    partitions: RwLock<Partitions>,
}

impl ToolCatalog {
    /// Build the catalog from the configured tools plus the reveal tool.
    ///
    /// Schemas are validated here. A later tool with the same name replaces an
    /// earlier one; no tool may take the reveal tool's name.
    pub fn new(tools: &[Arc<dyn Tool>], model: Arc<SwappableModel>) -> Result<Arc<Self>> {
        let mut original: Vec<(String, Arc<dyn Tool>)> = Vec::with_capacity(tools.len() + 1);
        for tool in tools {
            let schema = tool.schema();
            schema.validate()?;
            if schema.name == REVEAL_TOOL_NAME {
                return Err(reserved_name());
            }
            match original.iter_mut().find(|(name, _)| *name == schema.name) {
                Some(entry) => entry.1 = Arc::clone(tool),
                None => original.push((schema.name, Arc::clone(tool))),
            }
        }

        Ok(Arc::new_cyclic(move |catalog: &Weak<Self>| {
            let mut original = original;
            let reveal: Arc<dyn Tool> = Arc::new(RevealTool {
                catalog: catalog.clone(),
            });
            original.push((REVEAL_TOOL_NAME.to_string(), reveal));
            Self {
                model,
                partitions: RwLock::new(Partitions::from_original(&original)),
                original,
            }
        }))
    }

    fn read(&self) -> RwLockReadGuard<'_, Partitions> {
        self.partitions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Partitions> {
        self.partitions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reset for a new run: `visible` back to the original tools, no extras.
    pub fn init(&self) {
        *self.write() = Partitions::from_original(&self.original);
    }

    /// Currently advertised tools, construction order then reveal order.
    pub fn get_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.read().visible.clone()
    }

    /// Tool infos derived from one `get_tools` snapshot.
    pub fn tool_schemas(&self) -> Result<Vec<ToolSchema>> {
        crate::tool::tool_schemas(&self.get_tools())
    }

    /// Look a tool up, revealing it if it is only in `extra`.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.lookup(name).map(|(tool, _)| tool)
    }

    /// `get_by_name` that also reports whether the lookup revealed the tool.
    pub fn lookup(&self, name: &str) -> Option<(Arc<dyn Tool>, Disclosure)> {
        let mut partitions = self.write();
        if let Some(&idx) = partitions.visible_index.get(name) {
            return Some((Arc::clone(&partitions.visible[idx]), Disclosure::Visible));
        }

        let tool = partitions.extra.remove(name)?;
        partitions.push_visible(name.to_string(), Arc::clone(&tool));
        tracing::info!(tool = %name, "Revealed tool");
        Some((tool, Disclosure::Revealed))
    }

    /// Visible tool by name, without any reveal side effect.
    pub fn visible(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let partitions = self.read();
        partitions
            .visible_index
            .get(name)
            .map(|&idx| Arc::clone(&partitions.visible[idx]))
    }

    pub fn is_visible(&self, name: &str) -> bool {
        self.read().visible_index.contains_key(name)
    }

    pub fn has_extra(&self, name: &str) -> bool {
        self.read().extra.contains_key(name)
    }

    /// Add tools that may be revealed during this run.
    ///
    /// An injected tool named like a visible one replaces the visible handle
    /// in place; the name stays advertised and never lands in `extra`.
    pub fn set_extra(&self, tools: HashMap<String, Arc<dyn Tool>>) -> Result<()> {
        if tools.contains_key(REVEAL_TOOL_NAME) {
            return Err(reserved_name());
        }

        let mut partitions = self.write();
        for (name, tool) in tools {
            if let Some(&idx) = partitions.visible_index.get(&name) {
                tracing::debug!(tool = %name, "Injected tool overrides visible tool");
                partitions.visible[idx] = tool;
            } else {
                partitions.extra.insert(name, tool);
            }
        }
        Ok(())
    }

    /// Reveal `name` and rebind the model to the grown visible set.
    ///
    /// If the model rejects the new binding, the tool goes back to `extra`.
    pub fn reveal(&self, name: &str) -> Result<String> {
        let (tool, disclosure) = self
            .lookup(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        if disclosure == Disclosure::Visible {
            return Ok(format!("tool {name} is already available"));
        }

        let rebound = self
            .tool_schemas()
            .and_then(|schemas| self.model.replace_tools(schemas).map(|_| ()));
        if let Err(e) = rebound {
            let mut partitions = self.write();
            partitions.remove_visible(name);
            partitions.extra.insert(name.to_string(), tool);
            return Err(e);
        }

        Ok(format!("get tool {name} success"))
    }
}

fn reserved_name() -> AgentError {
    AgentError::Config(format!("tool name '{REVEAL_TOOL_NAME}' is reserved"))
}

/// Meta-tool the model calls to gain access to a hidden tool.
struct RevealTool {
    catalog: Weak<ToolCatalog>,
}

#[async_trait]
impl Tool for RevealTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(REVEAL_TOOL_NAME, REVEAL_TOOL_DESCRIPTION)
            .param(ParameterSchema::string("name", "Exact name of the tool to unlock"))
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let name = call
            .str_arg("name")
            .ok_or_else(|| AgentError::ToolValidation("Missing tool name".into()))?;
        let catalog = self
            .catalog
            .upgrade()
            .ok_or_else(|| AgentError::Other("tool catalog is gone".into()))?;

        let output = catalog.reveal(name)?;
        Ok(ToolResult::success(REVEAL_TOOL_NAME, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockModel, MockTool};
    use crate::tool::tools_to_map;
    use serde_json::json;

    fn tool(name: &str) -> Arc<dyn Tool> {
        Arc::new(MockTool::new(name, format!("{name} output")))
    }

    fn names(tools: &[Arc<dyn Tool>]) -> Vec<String> {
        tools.iter().map(|t| t.schema().name).collect()
    }

    fn catalog_with(model: &Arc<MockModel>, base: &[&str]) -> Arc<ToolCatalog> {
        let adapter = Arc::new(SwappableModel::new(model.clone()));
        let tools: Vec<_> = base.iter().map(|n| tool(n)).collect();
        ToolCatalog::new(&tools, adapter).unwrap()
    }

    fn extras(list: &[&str]) -> HashMap<String, Arc<dyn Tool>> {
        let tools: Vec<_> = list.iter().map(|n| tool(n)).collect();
        tools_to_map(&tools).unwrap()
    }

    #[test]
    fn test_original_includes_reveal_tool() {
        let catalog = catalog_with(&Arc::new(MockModel::new(vec![])), &["a", "b"]);
        assert_eq!(names(&catalog.get_tools()), vec!["a", "b", REVEAL_TOOL_NAME]);
    }

    #[test]
    fn test_reserved_name_rejected() {
        let adapter = Arc::new(SwappableModel::new(Arc::new(MockModel::new(vec![]))));
        assert!(ToolCatalog::new(&[tool(REVEAL_TOOL_NAME)], adapter).is_err());

        let catalog = catalog_with(&Arc::new(MockModel::new(vec![])), &[]);
        assert!(catalog.set_extra(extras(&[REVEAL_TOOL_NAME])).is_err());
    }

    #[test]
    fn test_lazy_reveal_moves_once() {
        let catalog = catalog_with(&Arc::new(MockModel::new(vec![])), &["a"]);
        catalog.set_extra(extras(&["hidden"])).unwrap();
        assert!(!catalog.is_visible("hidden"));

        let (_, first) = catalog.lookup("hidden").unwrap();
        assert_eq!(first, Disclosure::Revealed);
        assert!(catalog.is_visible("hidden"));
        assert!(!catalog.has_extra("hidden"));

        let (_, second) = catalog.lookup("hidden").unwrap();
        assert_eq!(second, Disclosure::Visible);
        assert_eq!(catalog.get_tools().len(), 3);
        assert!(catalog.get_by_name("missing").is_none());
    }

    #[test]
    fn test_init_restores_original() {
        let catalog = catalog_with(&Arc::new(MockModel::new(vec![])), &["a"]);
        catalog.set_extra(extras(&["x", "y"])).unwrap();
        catalog.get_by_name("x").unwrap();

        catalog.init();
        assert_eq!(names(&catalog.get_tools()), vec!["a", REVEAL_TOOL_NAME]);
        assert!(!catalog.has_extra("y"));
    }

    #[test]
    fn test_injected_overrides_visible() {
        let catalog = catalog_with(&Arc::new(MockModel::new(vec![])), &["a"]);
        let replacement: Arc<dyn Tool> = Arc::new(MockTool::new("a", "new"));
        let mut map = HashMap::new();
        map.insert("a".to_string(), Arc::clone(&replacement));
        catalog.set_extra(map).unwrap();

        assert!(!catalog.has_extra("a"));
        let visible = catalog.visible("a").unwrap();
        assert!(Arc::ptr_eq(&visible, &replacement));
    }

    #[tokio::test]
    async fn test_reveal_tool_rebinds_model() {
        let model = Arc::new(MockModel::new(vec![]));
        let catalog = catalog_with(&model, &["a"]);
        catalog.set_extra(extras(&["calc"])).unwrap();

        let reveal = catalog.visible(REVEAL_TOOL_NAME).unwrap();
        let result = reveal
            .execute(&ToolCall::new("c1", REVEAL_TOOL_NAME, json!({"name": "calc"})))
            .await
            .unwrap();

        assert_eq!(result.output, "get tool calc success");
        assert_eq!(
            model.bindings().last().unwrap(),
            &vec!["a".to_string(), REVEAL_TOOL_NAME.to_string(), "calc".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reveal_unknown_is_named_error() {
        let catalog = catalog_with(&Arc::new(MockModel::new(vec![])), &[]);
        let reveal = catalog.visible(REVEAL_TOOL_NAME).unwrap();
        let err = reveal
            .execute(&ToolCall::new("c1", REVEAL_TOOL_NAME, json!({"name": "ghost"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound(ref n) if n == "ghost"));
    }

    #[test]
    fn test_failed_rebind_restores_extra() {
        let model = Arc::new(MockModel::new(vec![]));
        let catalog = catalog_with(&model, &["a"]);
        catalog.set_extra(extras(&["calc"])).unwrap();

        model.fail_next_binding();
        assert!(catalog.reveal("calc").is_err());
        assert!(catalog.has_extra("calc"));
        assert!(!catalog.is_visible("calc"));
        assert_eq!(catalog.get_tools().len(), 2);

        assert_eq!(catalog.reveal("calc").unwrap(), "get tool calc success");
        assert_eq!(catalog.reveal("calc").unwrap(), "tool calc is already available");
    }
}
