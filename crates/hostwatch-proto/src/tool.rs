//! Tool descriptors and `tools/call` payloads.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One tool as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema of the accepted arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: None,
        }
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// The input schema, or an object schema with no properties.
    pub fn schema_or_empty(&self) -> Value {
        self.input_schema
            .clone()
            .unwrap_or_else(empty_object_schema)
    }
}

/// `{"type":"object","properties":{},"required":[]}`
pub fn empty_object_schema() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,

    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl CallToolParams {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// A content block in a tool result. Only text is produced here; other kinds
/// sent by foreign providers decode as `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
            Content::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    /// A single text content item.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
        }
    }

    /// Text of the first content item, if it is text.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(Content::as_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_wire_shape() {
        let tool = ToolDescriptor::new("get_system_info", "Host telemetry")
            .with_input_schema(empty_object_schema());

        let json = serde_json::to_value(&tool).unwrap();
        assert_eq!(json["name"], "get_system_info");
        assert_eq!(json["inputSchema"]["type"], "object");
    }

    #[test]
    fn test_missing_schema_defaults_to_empty_object() {
        let tool: ToolDescriptor =
            serde_json::from_value(json!({ "name": "ping", "description": "Ping" })).unwrap();
        assert!(tool.input_schema.is_none());
        assert_eq!(tool.schema_or_empty(), empty_object_schema());
    }

    #[test]
    fn test_call_params_ignore_non_object_arguments() {
        let params = CallToolParams::new("ping", Value::Null);
        assert!(params.arguments.is_empty());

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["arguments"], json!({}));
    }

    #[test]
    fn test_call_params_default_arguments() {
        let params: CallToolParams = serde_json::from_value(json!({ "name": "x" })).unwrap();
        assert!(params.arguments.is_empty());
    }

    #[test]
    fn test_result_text_shape() {
        let result = CallToolResult::text("{\"ok\":true}");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][0]["text"], "{\"ok\":true}");
        assert!(json.get("isError").is_none());
    }

    #[test]
    fn test_unknown_content_kind_decodes() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                { "type": "image", "data": "AAAA", "mimeType": "image/png" },
                { "type": "text", "text": "second" }
            ]
        }))
        .unwrap();

        assert_eq!(result.content[0], Content::Other);
        assert!(result.first_text().is_none());
        assert_eq!(result.content[1].as_text(), Some("second"));
    }
}
