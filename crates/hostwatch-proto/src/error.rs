//! JSON-RPC error objects and the standard error codes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: i32,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorData {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;

    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;

    /// The method (or tool) does not exist.
    pub const METHOD_NOT_FOUND: i32 = -32601;

    pub const INVALID_PARAMS: i32 = -32602;

    pub const INTERNAL_ERROR: i32 = -32603;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(Self::PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMS, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL_ERROR, message)
    }

    /// Unknown tool name in `tools/call`. Shares the method-not-found code.
    pub fn tool_not_found(name: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("Unknown tool: {}", name))
    }

    /// True for errors that mean "no such method or tool".
    pub fn is_not_found(&self) -> bool {
        self.code == Self::METHOD_NOT_FOUND
    }
}

impl std::fmt::Display for ErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorData {}
