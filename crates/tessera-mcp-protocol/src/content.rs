//! Content model
//!
//! Every outward tool result, prompt message and sampling payload is built
//! from [`ContentBlock`]s. Each tag has exactly one validation rule set, and
//! [`ContentBlock::from_value`] rejects tags it does not know instead of
//! letting them through as opaque JSON.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{McpError, McpResult};

/// Text resource contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextResourceContents {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub text: String,
}

/// Binary resource contents, base64 encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobResourceContents {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub blob: String,
}

/// `{uri, mimeType?, text}` or `{uri, mimeType?, blob}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceContents {
    Text(TextResourceContents),
    Blob(BlobResourceContents),
}

impl ResourceContents {
    pub fn text(uri: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Text(TextResourceContents {
            uri: uri.into(),
            mime_type: Some("text/plain".to_string()),
            text: text.into(),
        })
    }

    pub fn blob(uri: impl Into<String>, bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::Blob(BlobResourceContents {
            uri: uri.into(),
            mime_type: Some(mime_type.into()),
            blob: BASE64.encode(bytes),
        })
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        match &mut self {
            Self::Text(t) => t.mime_type = Some(mime.into()),
            Self::Blob(b) => b.mime_type = Some(mime.into()),
        }
        self
    }

    pub fn uri(&self) -> &str {
        match self {
            Self::Text(t) => &t.uri,
            Self::Blob(b) => &b.uri,
        }
    }

    pub fn validate(&self) -> McpResult<()> {
        if self.uri().is_empty() {
            return Err(McpError::InvalidContent("resource uri must not be empty".into()));
        }
        if let Self::Blob(b) = self {
            decode_base64("blob", &b.blob)?;
        }
        Ok(())
    }
}

/// A single content payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    /// Base64 image data with an `image/*` media type
    #[serde(rename = "image")]
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// Base64 audio data with an `audio/*` media type
    #[serde(rename = "audio")]
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// Embedded resource: uri plus inline data
    #[serde(rename = "resource")]
    Resource { resource: ResourceContents },

    /// Reference to a resource by uri, metadata only
    #[serde(rename = "resource_link")]
    ResourceLink {
        uri: String,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
}

impl ContentBlock {
    pub const KNOWN_TYPES: [&'static str; 5] =
        ["text", "image", "audio", "resource", "resource_link"];

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn audio(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Audio {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn resource(resource: ResourceContents) -> Self {
        Self::Resource { resource }
    }

    pub fn resource_link(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ResourceLink {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Audio { .. } => "audio",
            Self::Resource { .. } => "resource",
            Self::ResourceLink { .. } => "resource_link",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Decode and validate an untyped payload. Unknown or missing `type`
    /// tags are rejected by name.
    pub fn from_value(value: Value) -> McpResult<Self> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidContent("content block has no 'type' tag".into()))?;
        if !Self::KNOWN_TYPES.contains(&tag) {
            return Err(McpError::InvalidContent(format!(
                "unknown content type '{tag}'"
            )));
        }
        let block: ContentBlock = serde_json::from_value(value)
            .map_err(|e| McpError::InvalidContent(e.to_string()))?;
        block.validate()?;
        Ok(block)
    }

    pub fn validate(&self) -> McpResult<()> {
        match self {
            Self::Text { .. } => Ok(()),
            Self::Image { data, mime_type } => {
                require_media_prefix("image", mime_type)?;
                decode_base64("image data", data).map(|_| ())
            }
            Self::Audio { data, mime_type } => {
                require_media_prefix("audio", mime_type)?;
                decode_base64("audio data", data).map(|_| ())
            }
            Self::Resource { resource } => resource.validate(),
            Self::ResourceLink { uri, name, .. } => {
                if uri.is_empty() {
                    return Err(McpError::InvalidContent(
                        "resource_link uri must not be empty".into(),
                    ));
                }
                if name.is_empty() {
                    return Err(McpError::InvalidContent(
                        "resource_link name must not be empty".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

fn require_media_prefix(kind: &str, mime_type: &str) -> McpResult<()> {
    let prefix = format!("{kind}/");
    if mime_type.len() > prefix.len() && mime_type.starts_with(&prefix) {
        Ok(())
    } else {
        Err(McpError::InvalidContent(format!(
            "{kind} content needs a '{prefix}*' media type, got '{mime_type}'"
        )))
    }
}

fn decode_base64(what: &str, data: &str) -> McpResult<Vec<u8>> {
    BASE64
        .decode(data)
        .map_err(|e| McpError::InvalidContent(format!("{what} is not valid base64: {e}")))
}

/// Result of `tools/call`: content payloads plus an optional error flag.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    pub fn success(content: Vec<ContentBlock>) -> Self {
        Self {
            content,
            is_error: None,
            structured_content: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::success(vec![ContentBlock::text(text)])
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(message)],
            is_error: Some(true),
            structured_content: None,
        }
    }

    pub fn with_structured_content(mut self, value: Value) -> Self {
        self.structured_content = Some(value);
        self
    }

    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }

    pub fn validate(&self) -> McpResult<()> {
        self.content.iter().try_for_each(ContentBlock::validate)
    }
}
