//! Request handlers for the listing, prompt and completion methods.
//!
//! These only read the registry; the session dispatches to them after
//! decoding params.

use tessera_mcp_protocol::completion::{CompleteParams, CompleteResult, CompletionReference};
use tessera_mcp_protocol::prompts::{GetPromptParams, GetPromptResult, ListPromptsResult};
use tessera_mcp_protocol::resources::{ListResourceTemplatesResult, ListResourcesResult};
use tessera_mcp_protocol::tools::ListToolsResult;
use tessera_mcp_protocol::{CompletionValues, McpError, McpResult};

use crate::registry::CapabilityRegistry;

pub fn list_tools(registry: &CapabilityRegistry) -> ListToolsResult {
    ListToolsResult {
        tools: registry.tools().iter().map(|t| t.to_tool()).collect(),
    }
}

pub fn list_resources(registry: &CapabilityRegistry) -> ListResourcesResult {
    ListResourcesResult {
        resources: registry.resources().iter().map(|r| r.to_resource()).collect(),
    }
}

pub fn list_resource_templates(registry: &CapabilityRegistry) -> ListResourceTemplatesResult {
    ListResourceTemplatesResult {
        resource_templates: registry.templates().iter().map(|t| t.to_template()).collect(),
    }
}

pub fn list_prompts(registry: &CapabilityRegistry) -> ListPromptsResult {
    ListPromptsResult {
        prompts: registry.prompts().iter().map(|p| p.to_prompt()).collect(),
    }
}

pub async fn get_prompt(
    registry: &CapabilityRegistry,
    params: GetPromptParams,
) -> McpResult<GetPromptResult> {
    let prompt = registry
        .prompt(&params.name)
        .ok_or_else(|| McpError::PromptNotFound(params.name.clone()))?;

    if let Some(missing) = prompt
        .arguments()
        .iter()
        .filter(|arg| arg.required.unwrap_or(false))
        .find(|arg| !params.arguments.contains_key(&arg.name))
    {
        return Err(McpError::invalid_params(format!(
            "Prompt '{}' requires argument '{}'",
            params.name, missing.name
        )));
    }

    let messages = prompt.render(params.arguments).await?;
    Ok(GetPromptResult {
        description: prompt.description().map(str::to_string),
        messages,
    })
}

/// Completion for prompt arguments and template variables. References that
/// name nothing registered complete to an empty list.
pub async fn complete(
    registry: &CapabilityRegistry,
    params: CompleteParams,
) -> McpResult<CompleteResult> {
    let argument = &params.argument;
    let values = match &params.reference {
        CompletionReference::Prompt { name } => match registry.prompt(name) {
            Some(prompt) => prompt.complete(&argument.name, &argument.value).await?,
            None => Vec::new(),
        },
        CompletionReference::Resource { uri } => match registry.template(uri) {
            Some(template) if template.uri_template().has_variable(&argument.name) => {
                template.complete(&argument.name, &argument.value).await?
            }
            _ => Vec::new(),
        },
    };
    Ok(CompleteResult {
        completion: CompletionValues::capped(values),
    })
}
