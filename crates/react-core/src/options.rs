//! Per-call options.
//!
//! An `AgentOption` is applied at the start of one `generate`/`stream` call,
//! after the catalog has been reset. Applying it may change the catalog and
//! yields `CallOption` fragments; the agent folds the fragments of every
//! option, in the order given, into the configuration of that single run.

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::ToolCatalog;
use crate::error::Result;
use crate::provider::GenerationOptions;
use crate::tool::{Tool, ToolSchema, tool_schemas, tools_to_map};

/// Configuration fragment for one run.
#[derive(Clone)]
pub enum CallOption {
    /// Tool infos the model is bound to at run start
    ModelTools(Vec<ToolSchema>),
    /// Tools the tools step looks up first
    ToolList(Vec<Arc<dyn Tool>>),
    /// Adjustment applied to the agent's generation options for the run
    Generation(GenerationTweak),
}

/// In-place change to a copy of the agent's generation options.
pub type GenerationTweak = Arc<dyn Fn(&mut GenerationOptions) + Send + Sync>;

impl std::fmt::Debug for CallOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ModelTools(schemas) => f
                .debug_tuple("ModelTools")
                .field(&schemas.iter().map(|s| s.name.as_str()).collect::<Vec<_>>())
                .finish(),
            Self::ToolList(tools) => f.debug_tuple("ToolList").field(&tools.len()).finish(),
            Self::Generation(_) => f.debug_tuple("Generation").finish_non_exhaustive(),
        }
    }
}

type ApplyFn = dyn Fn(&ToolCatalog) -> Result<Vec<CallOption>> + Send + Sync;

/// Deferred per-call configuration.
pub struct AgentOption {
    apply: Box<ApplyFn>,
}

impl AgentOption {
    pub fn new<F>(apply: F) -> Self
    where
        F: Fn(&ToolCatalog) -> Result<Vec<CallOption>> + Send + Sync + 'static,
    {
        Self {
            apply: Box::new(apply),
        }
    }

    /// Option that only contributes fixed fragments.
    pub fn fragments(fragments: Vec<CallOption>) -> Self {
        Self::new(move |_| Ok(fragments.clone()))
    }

    pub(crate) fn apply(&self, catalog: &ToolCatalog) -> Result<Vec<CallOption>> {
        (self.apply)(catalog)
    }
}

impl std::fmt::Debug for AgentOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOption").finish_non_exhaustive()
    }
}

/// Make `tools` available for this call only.
///
/// The tools are not advertised: they go to the catalog's extra partition and
/// the model learns about one only after asking for it through the reveal
/// tool. Schemas are validated here, so a malformed tool fails before the run.
pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Result<AgentOption> {
    let extra = tools_to_map(&tools)?;

    Ok(AgentOption::new(move |catalog| {
        catalog.set_extra(extra.clone())?;
        let visible = catalog.get_tools();
        let schemas = tool_schemas(&visible)?;
        Ok(vec![
            CallOption::ModelTools(schemas),
            CallOption::ToolList(visible),
        ])
    }))
}

/// Adjust the agent's generation options for this call.
///
/// `tweak` edits a copy of the options the agent was built with, so fields it
/// leaves alone (the model name in particular) keep the agent's values.
pub fn with_generation_options<F>(tweak: F) -> AgentOption
where
    F: Fn(&mut GenerationOptions) + Send + Sync + 'static,
{
    AgentOption::fragments(vec![CallOption::Generation(Arc::new(tweak))])
}

/// Fragments folded into one run's configuration. Later fragments win.
#[derive(Default)]
pub(crate) struct RunOptions {
    pub model_tools: Option<Vec<ToolSchema>>,
    pub tool_list: Option<HashMap<String, Arc<dyn Tool>>>,
    pub generation: Vec<GenerationTweak>,
}

impl RunOptions {
    pub fn resolve(options: &[AgentOption], catalog: &ToolCatalog) -> Result<Self> {
        let mut run = Self::default();
        for option in options {
            for fragment in option.apply(catalog)? {
                match fragment {
                    CallOption::ModelTools(schemas) => run.model_tools = Some(schemas),
                    CallOption::ToolList(tools) => run.tool_list = Some(tools_to_map(&tools)?),
                    CallOption::Generation(tweak) => run.generation.push(tweak),
                }
            }
        }
        Ok(run)
    }

    /// The agent's options with every per-call adjustment applied in order.
    pub fn generation(&self, base: &GenerationOptions) -> GenerationOptions {
        let mut options = base.clone();
        for tweak in &self.generation {
            tweak(&mut options);
        }
        options
    }
}
