//! Handshake types: `initialize` params and result.

use serde::{Deserialize, Serialize};

/// Protocol version spoken by both ends.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Method names on the wire.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    /// Sent by clients after a successful `initialize`; never answered.
    pub const INITIALIZED: &str = "notifications/initialized";
}

/// The no-argument tool every provider serves; its text is a JSON snapshot.
pub const SYSTEM_INFO_TOOL: &str = "get_system_info";

/// Name and version of either end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

impl Implementation {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Marker for tool support. Serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Capabilities declared during `initialize`. Both ends use the same shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

impl Capabilities {
    pub fn with_tools() -> Self {
        Self {
            tools: Some(ToolsCapability::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Capabilities,
    pub client_info: Implementation,
}

impl InitializeParams {
    pub fn new(client_info: Implementation) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Capabilities::with_tools(),
            client_info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: Capabilities,
    pub server_info: Implementation,
}

impl InitializeResult {
    pub fn new(server_info: Implementation) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Capabilities::with_tools(),
            server_info,
        }
    }

    pub fn supports_tools(&self) -> bool {
        self.capabilities.tools.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initialize_result_declares_tools() {
        let result = InitializeResult::new(Implementation::new("system-info-server", "1.0.0"));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(json["capabilities"], json!({ "tools": {} }));
        assert_eq!(json["serverInfo"]["name"], "system-info-server");
    }

    #[test]
    fn test_initialize_params_from_foreign_client() {
        let params: InitializeParams = serde_json::from_value(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "clientInfo": { "name": "fastapi-mcp-client", "version": "1.0.0" }
        }))
        .unwrap();

        assert_eq!(params.client_info.name, "fastapi-mcp-client");
        assert!(params.capabilities.tools.is_some());
    }
}
