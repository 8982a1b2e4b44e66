//! Tool argument validation against declared input schemas.

use std::collections::HashMap;
use std::sync::Arc;

use jsonschema::error::ValidationErrorKind;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// One schema violation. `path` is dotted (`items.0.name`), `(root)` for the
/// top-level value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
}

impl ValidationIssue {
    fn root(message: impl Into<String>) -> Self {
        Self {
            path: ROOT_PATH.to_string(),
            message: message.into(),
            expected: None,
            received: None,
        }
    }

    /// `b: expected number, received string`
    pub fn summary(&self) -> String {
        format!("{}: {}", self.path, self.message)
    }
}

const ROOT_PATH: &str = "(root)";

/// Checks tool arguments against a schema. On success returns the arguments
/// to hand to the tool.
pub trait Validator: Send + Sync {
    fn validate(&self, schema: &Value, input: &Value) -> Result<Value, Vec<ValidationIssue>>;
}

/// [`Validator`] backed by the `jsonschema` crate. Compiled schemas are
/// cached by their serialized form.
#[derive(Default)]
pub struct JsonSchemaValidator {
    compiled: RwLock<HashMap<String, Arc<jsonschema::Validator>>>,
}

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(&self, schema: &Value) -> Result<Arc<jsonschema::Validator>, ValidationIssue> {
        let key = schema.to_string();
        if let Some(validator) = self.compiled.read().get(&key) {
            return Ok(validator.clone());
        }
        let validator = jsonschema::validator_for(schema).map_err(|e| {
            warn!(error = %e, "tool input schema failed to compile");
            ValidationIssue::root(format!("invalid input schema: {e}"))
        })?;
        let validator = Arc::new(validator);
        self.compiled.write().insert(key, validator.clone());
        Ok(validator)
    }
}

impl Validator for JsonSchemaValidator {
    fn validate(&self, schema: &Value, input: &Value) -> Result<Value, Vec<ValidationIssue>> {
        let validator = self.compile(schema).map_err(|issue| vec![issue])?;
        let issues: Vec<ValidationIssue> = validator
            .iter_errors(input)
            .map(|error| {
                let instance_path = error.instance_path.to_string();
                match &error.kind {
                    ValidationErrorKind::Required { property } => {
                        let property = property
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| property.to_string());
                        ValidationIssue {
                            path: join_path(&instance_path, &property),
                            message: "required property is missing".to_string(),
                            expected: Some("required property".to_string()),
                            received: Some("undefined".to_string()),
                        }
                    }
                    ValidationErrorKind::Type { .. } => {
                        let expected = schema
                            .pointer(&error.schema_path.to_string())
                            .map(describe_type)
                            .unwrap_or_else(|| "other type".to_string());
                        let received = json_type_name(&error.instance).to_string();
                        ValidationIssue {
                            path: dotted(&instance_path),
                            message: format!("expected {expected}, received {received}"),
                            expected: Some(expected),
                            received: Some(received),
                        }
                    }
                    ValidationErrorKind::AdditionalProperties { unexpected } => ValidationIssue {
                        path: dotted(&instance_path),
                        message: format!("unexpected properties: {}", unexpected.join(", ")),
                        expected: None,
                        received: None,
                    },
                    _ => ValidationIssue {
                        path: dotted(&instance_path),
                        message: error.to_string(),
                        expected: None,
                        received: Some(json_type_name(&error.instance).to_string()),
                    },
                }
            })
            .collect();

        if issues.is_empty() {
            Ok(input.clone())
        } else {
            Err(issues)
        }
    }
}

/// `/items/0/name` -> `items.0.name`
fn dotted(pointer: &str) -> String {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        ROOT_PATH.to_string()
    } else {
        trimmed.replace('/', ".")
    }
}

fn join_path(parent: &str, property: &str) -> String {
    match dotted(parent).as_str() {
        ROOT_PATH => property.to_string(),
        parent => format!("{parent}.{property}"),
    }
}

fn describe_type(schema_type: &Value) -> String {
    match schema_type {
        Value::String(s) => s.clone(),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.to_string(),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": {"type": "number"},
                "b": {"type": "number"}
            },
            "required": ["a", "b"]
        })
    }

    #[test]
    fn test_valid_arguments_pass_through() {
        let validator = JsonSchemaValidator::new();
        let args = json!({"a": 1, "b": 2});
        assert_eq!(validator.validate(&add_schema(), &args).unwrap(), args);
    }

    #[test]
    fn test_type_mismatch_names_path_and_types() {
        let validator = JsonSchemaValidator::new();
        let issues = validator
            .validate(&add_schema(), &json!({"a": 1, "b": "x"}))
            .unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "b");
        assert_eq!(issues[0].expected.as_deref(), Some("number"));
        assert_eq!(issues[0].received.as_deref(), Some("string"));
        assert_eq!(issues[0].summary(), "b: expected number, received string");
    }

    #[test]
    fn test_missing_required_property() {
        let validator = JsonSchemaValidator::new();
        let issues = validator.validate(&add_schema(), &json!({"a": 1})).unwrap_err();
        assert_eq!(issues[0].path, "b");
        assert_eq!(issues[0].received.as_deref(), Some("undefined"));
    }

    #[test]
    fn test_nested_paths_are_dotted() {
        let schema = json!({
            "type": "object",
            "properties": {
                "items": {"type": "array", "items": {"type": "object", "properties": {"qty": {"type": "integer"}}}}
            }
        });
        let validator = JsonSchemaValidator::new();
        let issues = validator
            .validate(&schema, &json!({"items": [{"qty": 1}, {"qty": "many"}]}))
            .unwrap_err();
        assert_eq!(issues[0].path, "items.1.qty");
    }

    #[test]
    fn test_root_type_mismatch() {
        let validator = JsonSchemaValidator::new();
        let issues = validator.validate(&add_schema(), &json!("nope")).unwrap_err();
        assert_eq!(issues[0].path, "(root)");
        assert_eq!(issues[0].received.as_deref(), Some("string"));
    }

    #[test]
    fn test_uncompilable_schema_reports_root_issue() {
        let validator = JsonSchemaValidator::new();
        let issues = validator
            .validate(&json!({"type": "not-a-type"}), &json!({}))
            .unwrap_err();
        assert_eq!(issues[0].path, "(root)");
        assert!(issues[0].message.contains("invalid input schema"));
    }
}
