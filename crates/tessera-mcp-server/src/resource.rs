//! MCP Resource Traits
//!
//! Direct resources answer exactly one URI. Templates answer every URI that
//! matches their compiled [`UriTemplate`] and receive the extracted
//! variables with each read.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use tessera_mcp_protocol::resources::{Resource, ResourceTemplate};
use tessera_mcp_protocol::{McpError, McpResult, ResourceContents};

use crate::uri_template::UriTemplate;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

#[async_trait]
pub trait McpResource: Send + Sync {
    fn uri(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn mime_type(&self) -> Option<&str> {
        None
    }

    async fn read(&self) -> McpResult<Vec<ResourceContents>>;

    fn to_resource(&self) -> Resource {
        Resource {
            uri: self.uri().to_string(),
            name: self.name().to_string(),
            description: self.description().map(str::to_string),
            mime_type: self.mime_type().map(str::to_string),
        }
    }
}

#[async_trait]
pub trait McpResourceTemplate: Send + Sync {
    fn uri_template(&self) -> &UriTemplate;

    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn mime_type(&self) -> Option<&str> {
        self.uri_template().mime_type()
    }

    /// Read `uri` with the variables extracted from it.
    async fn read(
        &self,
        uri: &str,
        variables: &HashMap<String, String>,
    ) -> McpResult<Vec<ResourceContents>>;

    /// Candidate values for `variable` starting with `partial`.
    async fn complete(&self, _variable: &str, _partial: &str) -> McpResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn to_template(&self) -> ResourceTemplate {
        ResourceTemplate {
            uri_template: self.uri_template().pattern().to_string(),
            name: self.name().to_string(),
            description: self.description().map(str::to_string),
            mime_type: self.mime_type().map(str::to_string),
        }
    }
}

pub type ReadFn = Box<dyn Fn(String) -> BoxFuture<McpResult<Vec<ResourceContents>>> + Send + Sync>;

pub type TemplateReadFn = Box<
    dyn Fn(String, HashMap<String, String>) -> BoxFuture<McpResult<Vec<ResourceContents>>>
        + Send
        + Sync,
>;

pub type CompleteFn = Box<dyn Fn(&str, &str) -> Vec<String> + Send + Sync>;

/// Builder for direct resources
pub struct ResourceBuilder {
    uri: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    read_fn: Option<ReadFn>,
}

impl ResourceBuilder {
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            read_fn: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn read<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Vec<ResourceContents>>> + Send + 'static,
    {
        self.read_fn = Some(Box::new(move |uri| Box::pin(f(uri))));
        self
    }

    pub fn build(self) -> McpResult<DynamicResource> {
        if self.uri.is_empty() {
            return Err(McpError::configuration("resource uri must not be empty"));
        }
        if self.uri.contains('{') {
            return Err(McpError::configuration(format!(
                "resource '{}' contains a placeholder; register it as a template",
                self.uri
            )));
        }
        let read_fn = self.read_fn.ok_or_else(|| {
            McpError::configuration(format!("resource '{}' has no read function", self.uri))
        })?;
        Ok(DynamicResource {
            uri: self.uri,
            name: self.name,
            description: self.description,
            mime_type: self.mime_type,
            read_fn,
        })
    }
}

pub struct DynamicResource {
    uri: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    read_fn: ReadFn,
}

#[async_trait]
impl McpResource for DynamicResource {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    async fn read(&self) -> McpResult<Vec<ResourceContents>> {
        (self.read_fn)(self.uri.clone()).await
    }
}

/// Builder for parameterized resources
pub struct ResourceTemplateBuilder {
    pattern: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    read_fn: Option<TemplateReadFn>,
    complete_fn: Option<CompleteFn>,
}

impl ResourceTemplateBuilder {
    pub fn new(pattern: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            read_fn: None,
            complete_fn: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn read<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String, HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Vec<ResourceContents>>> + Send + 'static,
    {
        self.read_fn = Some(Box::new(move |uri, vars| Box::pin(f(uri, vars))));
        self
    }

    /// Completion source for template variables: `(variable, partial) -> candidates`.
    pub fn complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) -> Vec<String> + Send + Sync + 'static,
    {
        self.complete_fn = Some(Box::new(f));
        self
    }

    pub fn build(self) -> McpResult<DynamicResourceTemplate> {
        let template = UriTemplate::new(&self.pattern)?;
        if template.variables().is_empty() {
            return Err(McpError::configuration(format!(
                "resource template '{}' has no variables",
                self.pattern
            )));
        }
        let read_fn = self.read_fn.ok_or_else(|| {
            McpError::configuration(format!(
                "resource template '{}' has no read function",
                self.pattern
            ))
        })?;
        Ok(DynamicResourceTemplate {
            template,
            name: self.name,
            description: self.description,
            mime_type: self.mime_type,
            read_fn,
            complete_fn: self.complete_fn,
        })
    }
}

pub struct DynamicResourceTemplate {
    template: UriTemplate,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    read_fn: TemplateReadFn,
    complete_fn: Option<CompleteFn>,
}

#[async_trait]
impl McpResourceTemplate for DynamicResourceTemplate {
    fn uri_template(&self) -> &UriTemplate {
        &self.template
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn mime_type(&self) -> Option<&str> {
        self.mime_type
            .as_deref()
            .or_else(|| self.template.mime_type())
    }

    async fn read(
        &self,
        uri: &str,
        variables: &HashMap<String, String>,
    ) -> McpResult<Vec<ResourceContents>> {
        (self.read_fn)(uri.to_string(), variables.clone()).await
    }

    async fn complete(&self, variable: &str, partial: &str) -> McpResult<Vec<String>> {
        Ok(self
            .complete_fn
            .as_ref()
            .map(|f| f(variable, partial))
            .unwrap_or_default())
    }
}
