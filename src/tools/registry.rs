//! Tool registry: the set of tools a conversation may call.
//!
//! Built once at startup and then shared read-only (`Arc<ToolRegistry>`)
//! between the dispatcher and the agent loop. Tests build their own.

use crate::tools::builtin;
use crate::tools::error::RegistryError;
use crate::tools::traits::{Tool, ToolDefinition};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Longest tool name accepted by function-calling APIs.
const MAX_NAME_LEN: usize = 64;

/// Restricts which registered tools are exposed to a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ToolFilter {
    /// Keep tools carrying at least one of these tags (empty = no tag filter).
    pub tags: Vec<String>,
    /// Keep only these tool names (empty = no name filter).
    pub names: Vec<String>,
}

impl ToolFilter {
    fn accepts(&self, tool: &dyn Tool) -> bool {
        if !self.names.is_empty() && !self.names.iter().any(|n| n == tool.name()) {
            return false;
        }
        if !self.tags.is_empty() && !tool.tags().iter().any(|t| self.tags.contains(t)) {
            return false;
        }
        true
    }
}

/// Registered tools in registration order, indexed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in tools.
    pub fn with_builtin_tools() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        builtin::register_all(&mut registry)?;
        Ok(registry)
    }

    /// Register a tool.
    ///
    /// Fails if the name is taken (the existing tool is kept), the name is
    /// not a valid function name, or the schema is malformed.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();

        if !is_valid_name(&name) {
            return Err(RegistryError::InvalidName(name));
        }
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        tool.schema().check().map_err(|source| RegistryError::Schema {
            tool: name.clone(),
            source,
        })?;

        debug!("Registered tool '{}' (terminal: {})", name, tool.is_terminal());
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<&Arc<dyn Tool>, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    /// Names of tools carrying `tag`.
    pub fn by_tag(&self, tag: &str) -> Vec<&str> {
        self.tools
            .iter()
            .filter(|t| t.tags().iter().any(|t| t == tag))
            .map(|t| t.name())
            .collect()
    }

    /// Definitions exposed to the model, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Sub-registry holding the tools accepted by `filter`.
    ///
    /// The `terminate` tool is always kept so a filtered run can still end.
    pub fn select(&self, filter: &ToolFilter) -> Self {
        let mut selected = Self::new();
        for tool in &self.tools {
            if tool.name() == builtin::TERMINATE || filter.accepts(tool.as_ref()) {
                selected.index.insert(tool.name().to_string(), selected.tools.len());
                selected.tools.push(tool.clone());
            }
        }
        selected
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
