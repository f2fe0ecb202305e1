//! hostwatch-proto - wire types for the hostwatch provider protocol
//!
//! The provider speaks a small subset of JSON-RPC 2.0 over a pair of byte
//! streams, one JSON object per line:
//!
//! - `initialize` - protocol version and capability negotiation
//! - `tools/list` - enumerate the tools the provider offers
//! - `tools/call` - invoke one tool by name
//!
//! ```rust
//! use hostwatch_proto::{decode_line, encode_line, JsonRpcRequest, JsonRpcResponse};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::with_params(1, "tools/list", json!({}));
//! let line = encode_line(&request).unwrap();
//! assert!(line.ends_with('\n'));
//!
//! let reply: JsonRpcResponse =
//!     decode_line(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#).unwrap();
//! assert_eq!(reply.id, request.id);
//! ```

pub mod error;
pub mod framing;
pub mod jsonrpc;
pub mod protocol;
pub mod tool;

pub use error::ErrorData;
pub use framing::{decode_line, encode_line, FrameError};
pub use jsonrpc::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, JsonRpcVersion, Outcome, RequestId};
pub use protocol::{
    methods, Capabilities, Implementation, InitializeParams, InitializeResult, ToolsCapability,
    PROTOCOL_VERSION, SYSTEM_INFO_TOOL,
};
pub use tool::{
    empty_object_schema, CallToolParams, CallToolResult, Content, ListToolsResult, ToolDescriptor,
};
