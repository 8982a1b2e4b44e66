//! `completion/complete` shapes.

use serde::{Deserialize, Serialize};

/// Maximum number of values returned in one completion response.
pub const MAX_COMPLETION_VALUES: usize = 100;

/// What is being completed: a prompt argument or a resource template parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionReference {
    #[serde(rename = "ref/prompt")]
    Prompt { name: String },
    #[serde(rename = "ref/resource")]
    Resource { uri: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionArgument {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteParams {
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    pub argument: CompletionArgument,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionValues {
    pub values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

impl CompletionValues {
    /// Cap `values` at [`MAX_COMPLETION_VALUES`], recording the full count.
    pub fn capped(mut values: Vec<String>) -> Self {
        let total = values.len();
        let has_more = total > MAX_COMPLETION_VALUES;
        values.truncate(MAX_COMPLETION_VALUES);
        Self {
            values,
            total: Some(total),
            has_more: Some(has_more),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResult {
    pub completion: CompletionValues,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_tags() {
        let params: CompleteParams = serde_json::from_value(json!({
            "ref": {"type": "ref/resource", "uri": "thing://{id}"},
            "argument": {"name": "id", "value": "ot"}
        }))
        .unwrap();
        assert_eq!(
            params.reference,
            CompletionReference::Resource { uri: "thing://{id}".into() }
        );
    }

    #[test]
    fn test_values_capped() {
        let values: Vec<String> = (0..150).map(|i| i.to_string()).collect();
        let capped = CompletionValues::capped(values);
        assert_eq!(capped.values.len(), MAX_COMPLETION_VALUES);
        assert_eq!(capped.total, Some(150));
        assert_eq!(capped.has_more, Some(true));
    }
}
