use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::JsonRpcVersion;

/// A JSON-RPC notification (request without an id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            method: method.into(),
            params,
        }
    }

    /// Build a notification from any serializable params struct.
    pub fn with_params<T: Serialize>(
        method: impl Into<String>,
        params: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(method, Some(serde_json::to_value(params)?)))
    }

    pub fn get_param(&self, name: &str) -> Option<&Value> {
        self.params.as_ref()?.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_json_format() {
        let notification = JsonRpcNotification::new("notifications/initialized", None);
        let json_str = serde_json::to_string(&notification).unwrap();

        assert!(!json_str.contains("\"id\""));
        assert!(json_str.contains("\"jsonrpc\":\"2.0\""));
        assert!(json_str.contains("\"method\":\"notifications/initialized\""));
    }

    #[test]
    fn test_notification_with_params() {
        let notification = JsonRpcNotification::with_params(
            "notifications/message",
            &json!({"level": "info", "data": "hello"}),
        )
        .unwrap();
        assert_eq!(notification.get_param("level"), Some(&json!("info")));
    }
}
