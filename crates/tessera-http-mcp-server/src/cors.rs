//! CORS (Cross-Origin Resource Sharing) support

use hyper::HeaderMap;
use hyper::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE, HeaderValue,
};

pub struct CorsLayer;

impl CorsLayer {
    /// Permissive headers for browser-based clients. The session header is
    /// exposed so scripts can read it from the initialize response.
    pub fn apply_cors_headers(headers: &mut HeaderMap) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(
                "Content-Type, Accept, Authorization, Mcp-Session-Id, MCP-Protocol-Version",
            ),
        );
        headers.insert(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("Mcp-Session-Id"),
        );
        headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_cors_headers() {
        let mut headers = HeaderMap::new();
        CorsLayer::apply_cors_headers(&mut headers);

        assert_eq!(headers.get("Access-Control-Allow-Origin").unwrap(), "*");
        assert!(
            headers["Access-Control-Allow-Methods"]
                .to_str()
                .unwrap()
                .contains("DELETE")
        );
        assert_eq!(
            headers.get("Access-Control-Expose-Headers").unwrap(),
            "Mcp-Session-Id"
        );
        assert!(headers.contains_key("Access-Control-Max-Age"));
    }
}
