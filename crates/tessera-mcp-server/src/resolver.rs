//! Resource resolution
//!
//! A URI resolves to a direct resource when one is registered under exactly
//! that URI. Otherwise templates are tried in registration order; the first
//! whose prefix and segments match wins.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use tessera_mcp_protocol::{McpError, McpResult, ResourceContents};

use crate::registry::CapabilityRegistry;
use crate::resource::{McpResource, McpResourceTemplate};

/// The provider a URI resolved to.
pub enum ResolvedResource {
    Direct(Arc<dyn McpResource>),
    Template {
        template: Arc<dyn McpResourceTemplate>,
        variables: HashMap<String, String>,
    },
}

impl ResolvedResource {
    pub fn is_direct(&self) -> bool {
        matches!(self, ResolvedResource::Direct(_))
    }

    pub fn variables(&self) -> Option<&HashMap<String, String>> {
        match self {
            ResolvedResource::Direct(_) => None,
            ResolvedResource::Template { variables, .. } => Some(variables),
        }
    }
}

#[derive(Clone)]
pub struct ResourceResolver {
    registry: Arc<CapabilityRegistry>,
}

impl ResourceResolver {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, uri: &str) -> McpResult<ResolvedResource> {
        if let Some(resource) = self.registry.resource(uri) {
            return Ok(ResolvedResource::Direct(resource));
        }

        for template in self.registry.templates() {
            let compiled = template.uri_template();
            if !uri.starts_with(compiled.prefix()) {
                continue;
            }
            if let Some(variables) = compiled.extract(uri) {
                debug!(uri, template = compiled.pattern(), "resolved resource via template");
                return Ok(ResolvedResource::Template {
                    template,
                    variables,
                });
            }
        }

        Err(McpError::ResourceNotFound(uri.to_string()))
    }

    /// Resolve and invoke the loader. Every payload it returns is validated
    /// and returned in order.
    pub async fn read(&self, uri: &str) -> McpResult<Vec<ResourceContents>> {
        let resolved = self.resolve(uri)?;
        let contents = match &resolved {
            ResolvedResource::Direct(resource) => resource.read().await,
            ResolvedResource::Template {
                template,
                variables,
            } => template.read(uri, variables).await,
        }
        .map_err(|e| match e {
            McpError::ResourceNotFound(_) | McpError::InvalidParameters(_) => e,
            other => McpError::ResourceExecutionError(other.to_string()),
        })?;

        for item in &contents {
            item.validate()?;
        }
        Ok(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceBuilder, ResourceTemplateBuilder};

    fn registry() -> Arc<CapabilityRegistry> {
        let registry = Arc::new(CapabilityRegistry::new());
        registry
            .register_resource(Arc::new(
                ResourceBuilder::new("thing://one", "one")
                    .read(|uri| async move { Ok(vec![ResourceContents::text(uri, "direct one")]) })
                    .build()
                    .unwrap(),
            ))
            .unwrap();
        registry
            .register_template(Arc::new(
                ResourceTemplateBuilder::new("thing://{id}", "thing")
                    .read(|uri, vars| async move {
                        let id = vars.get("id").cloned().unwrap_or_default();
                        Ok(vec![ResourceContents::text(uri, format!("template {id}"))])
                    })
                    .build()
                    .unwrap(),
            ))
            .unwrap();
        registry
    }

    fn text(contents: &[ResourceContents]) -> &str {
        match &contents[0] {
            ResourceContents::Text(t) => &t.text,
            ResourceContents::Blob(_) => panic!("expected text"),
        }
    }

    #[tokio::test]
    async fn test_exact_uri_beats_template() {
        let resolver = ResourceResolver::new(registry());
        assert!(resolver.resolve("thing://one").unwrap().is_direct());
        assert_eq!(text(&resolver.read("thing://one").await.unwrap()), "direct one");
    }

    #[tokio::test]
    async fn test_template_fallback_extracts_variables() {
        let resolver = ResourceResolver::new(registry());
        let resolved = resolver.resolve("thing://other").unwrap();
        assert_eq!(resolved.variables().unwrap().get("id").unwrap(), "other");
        assert_eq!(text(&resolver.read("thing://other").await.unwrap()), "template other");
    }

    #[tokio::test]
    async fn test_unmatched_uri_is_not_found() {
        let resolver = ResourceResolver::new(registry());
        let error = resolver.read("elsewhere://x").await.unwrap_err();
        assert!(matches!(error, McpError::ResourceNotFound(ref uri) if uri == "elsewhere://x"));
        assert!(resolver.resolve("thing://a/b").is_err());
    }

    #[tokio::test]
    async fn test_loader_failure_maps_to_execution_error() {
        let registry = Arc::new(CapabilityRegistry::new());
        registry
            .register_resource(Arc::new(
                ResourceBuilder::new("broken://x", "broken")
                    .read(|_uri| async move { Err(McpError::from("disk on fire")) })
                    .build()
                    .unwrap(),
            ))
            .unwrap();
        let error = ResourceResolver::new(registry).read("broken://x").await.unwrap_err();
        assert!(matches!(error, McpError::ResourceExecutionError(ref m) if m.contains("disk on fire")));
    }
}
