//! MCP Prompt Trait

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use tessera_mcp_protocol::prompts::{Prompt, PromptArgument, PromptMessage};
use tessera_mcp_protocol::{McpError, McpResult};

#[async_trait]
pub trait McpPrompt: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn arguments(&self) -> &[PromptArgument] {
        &[]
    }

    /// Render the prompt. Required arguments are checked before this runs.
    async fn render(&self, arguments: HashMap<String, String>) -> McpResult<Vec<PromptMessage>>;

    /// Candidate values for `argument` starting with `partial`.
    async fn complete(&self, _argument: &str, _partial: &str) -> McpResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn to_prompt(&self) -> Prompt {
        let arguments = self.arguments();
        Prompt {
            name: self.name().to_string(),
            description: self.description().map(str::to_string),
            arguments: (!arguments.is_empty()).then(|| arguments.to_vec()),
        }
    }
}

pub type RenderFn = Box<
    dyn Fn(HashMap<String, String>) -> Pin<Box<dyn Future<Output = McpResult<String>> + Send>>
        + Send
        + Sync,
>;

type ArgumentCompleteFn = Box<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Builds single-message prompts from a text renderer.
pub struct PromptBuilder {
    name: String,
    description: Option<String>,
    arguments: Vec<PromptArgument>,
    render_fn: Option<RenderFn>,
    completions: HashMap<String, ArgumentCompleteFn>,
}

impl PromptBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
            render_fn: None,
            completions: HashMap::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn argument(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.arguments.push(PromptArgument {
            name: name.into(),
            description: Some(description.into()),
            required: Some(required),
        });
        self
    }

    /// Completion source for one argument: `partial -> candidates`.
    pub fn complete<F>(mut self, argument: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str) -> Vec<String> + Send + Sync + 'static,
    {
        self.completions.insert(argument.into(), Box::new(f));
        self
    }

    /// The rendered text becomes one `user` message.
    pub fn render<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<String>> + Send + 'static,
    {
        self.render_fn = Some(Box::new(move |args| Box::pin(f(args))));
        self
    }

    pub fn build(self) -> McpResult<DynamicPrompt> {
        let render_fn = self.render_fn.ok_or_else(|| {
            McpError::configuration(format!("prompt '{}' has no render function", self.name))
        })?;
        if let Some(unknown) = self
            .completions
            .keys()
            .find(|name| !self.arguments.iter().any(|a| &a.name == *name))
        {
            return Err(McpError::configuration(format!(
                "prompt '{}' has a completion for unknown argument '{unknown}'",
                self.name
            )));
        }
        Ok(DynamicPrompt {
            name: self.name,
            description: self.description,
            arguments: self.arguments,
            render_fn,
            completions: self.completions,
        })
    }
}

pub struct DynamicPrompt {
    name: String,
    description: Option<String>,
    arguments: Vec<PromptArgument>,
    render_fn: RenderFn,
    completions: HashMap<String, ArgumentCompleteFn>,
}

#[async_trait]
impl McpPrompt for DynamicPrompt {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn arguments(&self) -> &[PromptArgument] {
        &self.arguments
    }

    async fn render(&self, arguments: HashMap<String, String>) -> McpResult<Vec<PromptMessage>> {
        let text = (self.render_fn)(arguments).await?;
        Ok(vec![PromptMessage::user_text(text)])
    }

    async fn complete(&self, argument: &str, partial: &str) -> McpResult<Vec<String>> {
        Ok(self
            .completions
            .get(argument)
            .map(|f| f(partial))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greet() -> DynamicPrompt {
        PromptBuilder::new("greet")
            .description("Greets someone")
            .argument("name", "Who to greet", true)
            .complete("name", |partial| {
                ["alice", "albert", "bob"]
                    .into_iter()
                    .filter(|n| n.starts_with(partial))
                    .map(str::to_string)
                    .collect()
            })
            .render(|args| async move {
                Ok(format!("Hello, {}!", args.get("name").cloned().unwrap_or_default()))
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_render_produces_user_message() {
        let prompt = greet();
        let args = HashMap::from([("name".to_string(), "Ada".to_string())]);
        let messages = prompt.render(args).await.unwrap();
        assert_eq!(messages, vec![PromptMessage::user_text("Hello, Ada!")]);
    }

    #[tokio::test]
    async fn test_argument_completion() {
        let prompt = greet();
        assert_eq!(prompt.complete("name", "al").await.unwrap(), ["alice", "albert"]);
        assert!(prompt.complete("other", "al").await.unwrap().is_empty());
    }

    #[test]
    fn test_descriptor_lists_arguments() {
        let descriptor = greet().to_prompt();
        let args = descriptor.arguments.unwrap();
        assert_eq!(args[0].name, "name");
        assert_eq!(args[0].required, Some(true));
    }

    #[test]
    fn test_completion_for_unknown_argument_rejected() {
        let result = PromptBuilder::new("p")
            .complete("ghost", |_| Vec::new())
            .render(|_| async { Ok(String::new()) })
            .build();
        assert!(result.is_err());
    }
}
