//! Protocol revisions this server speaks.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum McpVersion {
    #[serde(rename = "2024-11-05")]
    V2024_11_05,
    #[serde(rename = "2025-03-26")]
    V2025_03_26,
    #[serde(rename = "2025-06-18")]
    V2025_06_18,
}

impl McpVersion {
    pub const LATEST: McpVersion = McpVersion::V2025_06_18;

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "2024-11-05" => Some(McpVersion::V2024_11_05),
            "2025-03-26" => Some(McpVersion::V2025_03_26),
            "2025-06-18" => Some(McpVersion::V2025_06_18),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            McpVersion::V2024_11_05 => "2024-11-05",
            McpVersion::V2025_03_26 => "2025-03-26",
            McpVersion::V2025_06_18 => "2025-06-18",
        }
    }

    /// Echo the client's revision when we support it, otherwise offer ours.
    pub fn negotiate(requested: Option<&str>) -> Self {
        requested.and_then(Self::parse).unwrap_or(Self::LATEST)
    }
}

impl std::fmt::Display for McpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate() {
        assert_eq!(McpVersion::negotiate(Some("2025-03-26")), McpVersion::V2025_03_26);
        assert_eq!(McpVersion::negotiate(Some("1999-01-01")), McpVersion::LATEST);
        assert_eq!(McpVersion::negotiate(None), McpVersion::LATEST);
    }
}
