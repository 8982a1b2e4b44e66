//! Capability registry
//!
//! Holds the tools, resources, resource templates and prompts a server
//! exposes. Names are unique per kind; listing returns entries in
//! registration order and never mutates anything.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;

use tessera_mcp_protocol::initialize::{ListChangedCapability, ServerCapabilities};

use crate::prompt::McpPrompt;
use crate::resource::{McpResource, McpResourceTemplate};
use crate::tool::McpTool;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{kind} '{name}' is already registered")]
    DuplicateName { kind: &'static str, name: String },

    #[error("{kind} '{name}' is not registered")]
    NotRegistered { kind: &'static str, name: String },
}

/// Insertion-ordered map of shared entries.
struct NamedEntries<T: ?Sized> {
    kind: &'static str,
    order: Vec<String>,
    items: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> NamedEntries<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            order: Vec::new(),
            items: HashMap::new(),
        }
    }

    fn insert(&mut self, name: String, item: Arc<T>) -> Result<(), RegistryError> {
        if self.items.contains_key(&name) {
            return Err(RegistryError::DuplicateName {
                kind: self.kind,
                name,
            });
        }
        self.order.push(name.clone());
        self.items.insert(name, item);
        Ok(())
    }

    fn replace(&mut self, name: &str, item: Arc<T>) -> Result<(), RegistryError> {
        match self.items.get_mut(name) {
            Some(slot) => {
                *slot = item;
                Ok(())
            }
            None => Err(RegistryError::NotRegistered {
                kind: self.kind,
                name: name.to_string(),
            }),
        }
    }

    fn get(&self, name: &str) -> Option<Arc<T>> {
        self.items.get(name).cloned()
    }

    fn snapshot(&self) -> Vec<Arc<T>> {
        self.order
            .iter()
            .filter_map(|name| self.items.get(name).cloned())
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub struct CapabilityRegistry {
    tools: RwLock<NamedEntries<dyn McpTool>>,
    resources: RwLock<NamedEntries<dyn McpResource>>,
    templates: RwLock<NamedEntries<dyn McpResourceTemplate>>,
    prompts: RwLock<NamedEntries<dyn McpPrompt>>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(NamedEntries::new("tool")),
            resources: RwLock::new(NamedEntries::new("resource")),
            templates: RwLock::new(NamedEntries::new("resource template")),
            prompts: RwLock::new(NamedEntries::new("prompt")),
        }
    }

    pub fn register_tool(&self, tool: Arc<dyn McpTool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        self.tools.write().insert(name, tool)
    }

    /// Swap the implementation of an already registered tool. Calls already
    /// running keep the old implementation.
    pub fn replace_tool(&self, tool: Arc<dyn McpTool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        self.tools.write().replace(&name, tool)
    }

    /// Resources are keyed by URI.
    pub fn register_resource(&self, resource: Arc<dyn McpResource>) -> Result<(), RegistryError> {
        let uri = resource.uri().to_string();
        self.resources.write().insert(uri, resource)
    }

    /// Templates are keyed by their pattern.
    pub fn register_template(
        &self,
        template: Arc<dyn McpResourceTemplate>,
    ) -> Result<(), RegistryError> {
        let pattern = template.uri_template().pattern().to_string();
        self.templates.write().insert(pattern, template)
    }

    pub fn register_prompt(&self, prompt: Arc<dyn McpPrompt>) -> Result<(), RegistryError> {
        let name = prompt.name().to_string();
        self.prompts.write().insert(name, prompt)
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn McpTool>> {
        self.tools.read().get(name)
    }

    pub fn resource(&self, uri: &str) -> Option<Arc<dyn McpResource>> {
        self.resources.read().get(uri)
    }

    pub fn template(&self, pattern: &str) -> Option<Arc<dyn McpResourceTemplate>> {
        self.templates.read().get(pattern)
    }

    pub fn prompt(&self, name: &str) -> Option<Arc<dyn McpPrompt>> {
        self.prompts.read().get(name)
    }

    pub fn tools(&self) -> Vec<Arc<dyn McpTool>> {
        self.tools.read().snapshot()
    }

    pub fn resources(&self) -> Vec<Arc<dyn McpResource>> {
        self.resources.read().snapshot()
    }

    pub fn templates(&self) -> Vec<Arc<dyn McpResourceTemplate>> {
        self.templates.read().snapshot()
    }

    pub fn prompts(&self) -> Vec<Arc<dyn McpPrompt>> {
        self.prompts.read().snapshot()
    }

    /// Capabilities advertised in the `initialize` result.
    pub fn server_capabilities(&self) -> ServerCapabilities {
        let has_tools = !self.tools.read().is_empty();
        let has_resources =
            !self.resources.read().is_empty() || !self.templates.read().is_empty();
        let has_prompts = !self.prompts.read().is_empty();
        let completable = has_prompts || !self.templates.read().is_empty();

        ServerCapabilities {
            tools: has_tools.then(ListChangedCapability::default),
            resources: has_resources.then(ListChangedCapability::default),
            prompts: has_prompts.then(ListChangedCapability::default),
            logging: Some(json!({})),
            completions: completable.then(|| json!({})),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptBuilder;
    use crate::resource::{ResourceBuilder, ResourceTemplateBuilder};
    use crate::tool::ToolBuilder;
    use tessera_mcp_protocol::ResourceContents;

    fn tool(name: &str, reply: &'static str) -> Arc<dyn McpTool> {
        Arc::new(
            ToolBuilder::new(name)
                .execute(move |_args, _ctx| async move { Ok(reply) })
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_duplicate_tool_rejected() {
        let registry = CapabilityRegistry::new();
        registry.register_tool(tool("add", "1")).unwrap();
        let error = registry.register_tool(tool("add", "2")).unwrap_err();
        assert_eq!(
            error,
            RegistryError::DuplicateName {
                kind: "tool",
                name: "add".into()
            }
        );
        assert_eq!(registry.tools().len(), 1);
    }

    #[test]
    fn test_listing_preserves_registration_order() {
        let registry = CapabilityRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register_tool(tool(name, "x")).unwrap();
        }
        let names: Vec<_> = registry.tools().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        let again: Vec<_> = registry.tools().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, again);
    }

    #[test]
    fn test_replace_requires_existing_entry() {
        let registry = CapabilityRegistry::new();
        assert!(matches!(
            registry.replace_tool(tool("add", "1")),
            Err(RegistryError::NotRegistered { .. })
        ));
        registry.register_tool(tool("add", "1")).unwrap();
        registry.replace_tool(tool("add", "2")).unwrap();
        assert_eq!(registry.tools().len(), 1);
    }

    #[test]
    fn test_capabilities_reflect_registrations() {
        let registry = CapabilityRegistry::new();
        let caps = registry.server_capabilities();
        assert!(caps.tools.is_none());
        assert!(caps.resources.is_none());
        assert!(caps.completions.is_none());
        assert!(caps.logging.is_some());

        registry.register_tool(tool("add", "1")).unwrap();
        registry
            .register_resource(Arc::new(
                ResourceBuilder::new("thing://one", "one")
                    .read(|uri| async move { Ok(vec![ResourceContents::text(uri, "1")]) })
                    .build()
                    .unwrap(),
            ))
            .unwrap();
        let caps = registry.server_capabilities();
        assert!(caps.tools.is_some());
        assert!(caps.resources.is_some());
        assert!(caps.prompts.is_none());
        assert!(caps.completions.is_none());

        registry
            .register_template(Arc::new(
                ResourceTemplateBuilder::new("thing://{id}", "thing")
                    .read(|uri, _vars| async move { Ok(vec![ResourceContents::text(uri, "t")]) })
                    .build()
                    .unwrap(),
            ))
            .unwrap();
        registry
            .register_prompt(Arc::new(
                PromptBuilder::new("greet")
                    .render(|_args| async move { Ok("hi".to_string()) })
                    .build()
                    .unwrap(),
            ))
            .unwrap();
        let caps = registry.server_capabilities();
        assert!(caps.prompts.is_some());
        assert!(caps.completions.is_some());
    }
}
