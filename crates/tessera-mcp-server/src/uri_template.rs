//! URI templates for parameterized resources
//!
//! A template such as `file:///users/{user_id}/avatar.{format}` is compiled
//! once, at registration time, into its literal prefix (everything before the
//! first `{`) and a list of `/`-separated segment matchers. Matching a request
//! checks the prefix, then walks the segments positionally.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use tessera_mcp_protocol::{McpError, McpResult};

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    /// The whole segment is one `{name}` placeholder.
    Param(String),
    /// Placeholders embedded in literal text, e.g. `avatar.{format}`.
    Mixed { regex: Regex, names: Vec<String> },
}

/// A compiled URI template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    pattern: String,
    prefix: String,
    segments: Vec<Segment>,
    variables: Vec<String>,
}

impl UriTemplate {
    pub fn new(pattern: &str) -> McpResult<Self> {
        let prefix = match pattern.find('{') {
            Some(index) => pattern[..index].to_string(),
            None => pattern.to_string(),
        };

        let mut variables = Vec::new();
        let mut seen = HashSet::new();
        let mut segments = Vec::new();

        for raw in pattern.split('/') {
            let (segment, names) = compile_segment(pattern, raw)?;
            for name in names {
                if !seen.insert(name.clone()) {
                    return Err(McpError::configuration(format!(
                        "URI template '{pattern}' repeats variable '{name}'"
                    )));
                }
                variables.push(name);
            }
            segments.push(segment);
        }

        Ok(Self {
            pattern: pattern.to_string(),
            prefix,
            segments,
            variables,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Literal text before the first placeholder.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v == name)
    }

    /// Extract variable values when `uri` matches this template.
    pub fn extract(&self, uri: &str) -> Option<HashMap<String, String>> {
        if !uri.starts_with(&self.prefix) {
            return None;
        }

        let parts: Vec<&str> = uri.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut values = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    values.insert(name.clone(), part.to_string());
                }
                Segment::Mixed { regex, names } => {
                    let captures = regex.captures(part)?;
                    for (index, name) in names.iter().enumerate() {
                        let value = captures.get(index + 1)?.as_str();
                        values.insert(name.clone(), value.to_string());
                    }
                }
            }
        }
        Some(values)
    }

    pub fn matches(&self, uri: &str) -> bool {
        self.extract(uri).is_some()
    }

    /// Substitute `values` into the template.
    pub fn resolve(&self, values: &HashMap<String, String>) -> McpResult<String> {
        let mut resolved = self.pattern.clone();
        for name in &self.variables {
            let value = values
                .get(name)
                .ok_or_else(|| McpError::missing_param(name))?;
            if value.is_empty() || value.contains('/') {
                return Err(McpError::invalid_params(format!(
                    "value for '{name}' must be a non-empty path segment"
                )));
            }
            resolved = resolved.replace(&format!("{{{name}}}"), value);
        }
        Ok(resolved)
    }

    /// MIME type implied by a literal file extension at the end of the pattern.
    pub fn mime_type(&self) -> Option<&'static str> {
        let last = self.pattern.rsplit('/').next()?;
        let (_, extension) = last.rsplit_once('.')?;
        if extension.contains('{') {
            return None;
        }
        match extension {
            "json" => Some("application/json"),
            "txt" | "log" => Some("text/plain"),
            "md" => Some("text/markdown"),
            "html" => Some("text/html"),
            "csv" => Some("text/csv"),
            "pdf" => Some("application/pdf"),
            "png" => Some("image/png"),
            "jpg" | "jpeg" => Some("image/jpeg"),
            _ => None,
        }
    }
}

fn compile_segment(pattern: &str, raw: &str) -> McpResult<(Segment, Vec<String>)> {
    if !raw.contains('{') && !raw.contains('}') {
        return Ok((Segment::Literal(raw.to_string()), Vec::new()));
    }

    let mut names = Vec::new();
    let mut regex_source = String::from("^");
    let mut rest = raw;
    while let Some(open) = rest.find('{') {
        let literal = &rest[..open];
        if literal.contains('}') {
            return Err(unbalanced(pattern));
        }
        regex_source.push_str(&regex::escape(literal));

        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| unbalanced(pattern))?;
        let name = &after[..close];
        if name.is_empty() || name.contains('{') {
            return Err(McpError::configuration(format!(
                "URI template '{pattern}' has an empty or nested placeholder"
            )));
        }
        names.push(name.to_string());
        regex_source.push_str("([^/]+?)");
        rest = &after[close + 1..];
    }
    if rest.contains('}') {
        return Err(unbalanced(pattern));
    }
    regex_source.push_str(&regex::escape(rest));
    regex_source.push('$');

    if names.len() == 1 && raw == format!("{{{}}}", names[0]) {
        return Ok((Segment::Param(names[0].clone()), names));
    }

    let regex = Regex::new(&regex_source).map_err(|e| {
        McpError::configuration(format!("URI template '{pattern}' failed to compile: {e}"))
    })?;
    Ok((
        Segment::Mixed {
            regex,
            names: names.clone(),
        },
        names,
    ))
}

fn unbalanced(pattern: &str) -> McpError {
    McpError::configuration(format!("URI template '{pattern}' has unbalanced braces"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_variable_extraction() {
        let template = UriTemplate::new("thing://{id}").unwrap();
        assert_eq!(template.prefix(), "thing://");
        assert_eq!(template.variables(), ["id".to_string()]);

        let values = template.extract("thing://other").unwrap();
        assert_eq!(values.get("id").map(String::as_str), Some("other"));

        assert!(template.extract("other://x").is_none());
        assert!(template.extract("thing://a/b").is_none());
        assert!(template.extract("thing://").is_none());
    }

    #[test]
    fn test_multiple_variable_template() {
        let template = UriTemplate::new("file:///user/{user_id}/avatar.{format}").unwrap();

        let vars = template.extract("file:///user/alice123/avatar.png").unwrap();
        assert_eq!(vars.get("user_id"), Some(&"alice123".to_string()));
        assert_eq!(vars.get("format"), Some(&"png".to_string()));
        assert!(template.extract("file:///user/alice123/photo.png").is_none());

        let mut values = HashMap::new();
        values.insert("user_id".to_string(), "bob456".to_string());
        values.insert("format".to_string(), "jpg".to_string());
        assert_eq!(
            template.resolve(&values).unwrap(),
            "file:///user/bob456/avatar.jpg"
        );
    }

    #[test]
    fn test_prefix_gate() {
        let template = UriTemplate::new("logs://service/{name}").unwrap();
        assert_eq!(template.prefix(), "logs://service/");
        assert!(template.matches("logs://service/api"));
        assert!(!template.matches("logs://other/api"));
    }

    #[test]
    fn test_invalid_templates_rejected() {
        assert!(UriTemplate::new("thing://{id").is_err());
        assert!(UriTemplate::new("thing://id}").is_err());
        assert!(UriTemplate::new("thing://{}").is_err());
        assert!(UriTemplate::new("thing://{id}/{id}").is_err());
    }

    #[test]
    fn test_mime_type_detection() {
        assert_eq!(
            UriTemplate::new("file:///data/{id}.json").unwrap().mime_type(),
            Some("application/json")
        );
        assert_eq!(
            UriTemplate::new("file:///images/{id}.{format}").unwrap().mime_type(),
            None
        );
    }
}
