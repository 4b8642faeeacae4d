//! Ordered, name-indexed tool catalog

use std::collections::HashMap;
use std::sync::Arc;

use super::{Tool, ToolDeclaration};
use crate::error::ToolError;

/// Registry of the tools offered to the model
///
/// Entries keep registration order and are never mutated once registered.
/// A host that needs a different tool set builds a new catalog and swaps it
/// in wholesale.
pub struct ToolCatalog<C> {
    tools: Vec<Arc<dyn Tool<C>>>,
    index: HashMap<String, usize>,
    declarations: Vec<ToolDeclaration>,
}

impl<C> Default for ToolCatalog<C> {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            declarations: Vec::new(),
        }
    }
}

impl<C> Clone for ToolCatalog<C> {
    fn clone(&self) -> Self {
        Self {
            tools: self.tools.clone(),
            index: self.index.clone(),
            declarations: self.declarations.clone(),
        }
    }
}

impl<C> std::fmt::Debug for ToolCatalog<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("tools", &self.names())
            .finish()
    }
}

impl<C> ToolCatalog<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; names must be unique
    pub fn register(&mut self, tool: Arc<dyn Tool<C>>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        self.index.insert(name, self.tools.len());
        self.declarations.push(tool.declaration().clone());
        self.tools.push(tool);
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, tool: impl Tool<C> + 'static) -> Result<Self, ToolError> {
        self.register(Arc::new(tool))?;
        Ok(self)
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool<C>>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Compiled declarations in registration order
    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool<C>>> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
