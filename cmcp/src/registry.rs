//! Startup-time tool registration.
//!
//! The registry is built once from the declared tool set and is immutable
//! afterwards. Duplicate names and invalid pricing declarations fail the
//! build, which aborts startup.

use std::collections::HashMap;
use std::sync::Arc;

use cmcp_proto::mcp::ToolDescriptor;

use crate::error::RegistryError;
use crate::tool::Tool;

/// Immutable registry of all tools, keyed by wire name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}

impl ToolRegistry {
    /// Builds the registry from the declared tool set.
    ///
    /// Registration order is preserved for `tools/list` and discovery
    /// broadcasts.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on duplicate names or invalid pricing.
    pub fn build(tools: Vec<Arc<dyn Tool>>) -> Result<Self, RegistryError> {
        let mut map: HashMap<String, Arc<dyn Tool>> = HashMap::with_capacity(tools.len());
        let mut order = Vec::with_capacity(tools.len());

        for tool in tools {
            let name = tool.name().to_owned();

            tool.pricing()
                .validate()
                .map_err(|reason| RegistryError::InvalidPricing {
                    tool: name.clone(),
                    reason,
                })?;

            if map.insert(name.clone(), tool).is_some() {
                return Err(RegistryError::DuplicateTool(name));
            }
            order.push(name);
        }

        Ok(Self { tools: map, order })
    }

    /// Looks up a tool by wire name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Iterates tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.order.iter().filter_map(|name| self.tools.get(name))
    }

    /// Builds the wire descriptors for `tools/list`, in registration order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.iter().map(|tool| tool.descriptor()).collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
