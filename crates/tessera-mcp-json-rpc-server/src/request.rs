use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{JsonRpcVersion, RequestId};

/// A JSON-RPC request. MCP only uses by-name (object) parameters, so `params`
/// is kept as raw JSON and decoded by the method handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            method: method.into(),
            params,
        }
    }

    /// Get a parameter by name (if params are an object)
    pub fn get_param(&self, name: &str) -> Option<&Value> {
        self.params.as_ref()?.get(name)
    }

    /// `params._meta.progressToken`, when the caller asked for progress updates.
    pub fn progress_token(&self) -> Option<&Value> {
        self.get_param("_meta")?.get("progressToken")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_without_params_omits_member() {
        let request = JsonRpcRequest::new(RequestId::Number(1), "ping", None);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}));
    }

    #[test]
    fn test_progress_token_lookup() {
        let request = JsonRpcRequest::new(
            RequestId::from("r1"),
            "tools/call",
            Some(json!({"name": "slow", "_meta": {"progressToken": "tok-1"}})),
        );
        assert_eq!(request.get_param("name"), Some(&json!("slow")));
        assert_eq!(request.progress_token(), Some(&json!("tok-1")));

        let bare = JsonRpcRequest::new(RequestId::Number(2), "tools/call", Some(json!({})));
        assert!(bare.progress_token().is_none());
    }
}
