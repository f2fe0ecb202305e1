//! The provider side of the protocol.
//!
//! Reads one JSON-RPC message per line, answers requests in arrival order,
//! and never stops because of a single bad message. The only ways out of
//! [`Endpoint::serve`] are end of input and a failed write.

use hostwatch_proto::{
    decode_line, encode_line, methods, CallToolParams, CallToolResult, ErrorData, FrameError,
    Implementation, InitializeParams, InitializeResult, JsonRpcMessage, JsonRpcResponse,
    ListToolsResult,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::capability::{Capability, ToolTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Uninitialized,
    Initialized,
}

pub struct Endpoint {
    tools: ToolTable,
    server_info: Implementation,
    state: EndpointState,
}

impl Endpoint {
    pub fn new(tools: ToolTable) -> Self {
        Self {
            tools,
            server_info: Implementation::new("hostwatch-provider", env!("CARGO_PKG_VERSION")),
            state: EndpointState::Uninitialized,
        }
    }

    pub fn with_server_info(mut self, server_info: Implementation) -> Self {
        self.server_info = server_info;
        self
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    /// Serve until `reader` reaches end of input.
    pub async fn serve<R, W>(mut self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(tools = self.tools.len(), "Provider endpoint serving");

        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            // Invalid UTF-8 turns into replacement characters and then fails
            // JSON decoding like any other malformed line.
            let line = String::from_utf8_lossy(&buf);
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };

            let encoded = match encode_line(&response) {
                Ok(encoded) => encoded,
                Err(e) => {
                    error!(id = %response.id, error = %e, "Failed to encode response");
                    continue;
                }
            };

            writer.write_all(encoded.as_bytes()).await?;
            writer.flush().await?;
        }

        info!("Input closed, provider endpoint stopping");
        Ok(())
    }

    /// Handle one raw line. `None` means nothing should be written back.
    pub async fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        match decode_line::<JsonRpcMessage>(line) {
            Ok(message) => self.handle(message).await,
            Err(FrameError::Empty) => None,
            Err(e) => {
                debug!(error = %e, "Skipping malformed line");
                None
            }
        }
    }

    pub async fn handle(&mut self, message: JsonRpcMessage) -> Option<JsonRpcResponse> {
        let Some(id) = message.id else {
            debug!(method = %message.method, "Notification received");
            return None;
        };

        let params = message.params.unwrap_or_else(|| Value::Object(Map::new()));
        let response = match self.dispatch(&message.method, params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                warn!(method = %message.method, code = e.code, error = %e.message, "Request failed");
                JsonRpcResponse::error(id, e)
            }
        };
        Some(response)
    }

    async fn dispatch(&mut self, method: &str, params: Value) -> Result<Value, ErrorData> {
        match method {
            methods::INITIALIZE => self.initialize(params),
            _ if self.state == EndpointState::Uninitialized => Err(ErrorData::invalid_request(
                format!("Server not initialized: {} before initialize", method),
            )),
            methods::TOOLS_LIST => to_result(&ListToolsResult {
                tools: self.tools.descriptors(),
            }),
            methods::TOOLS_CALL => self.call_tool(params).await,
            other => Err(ErrorData::method_not_found(other)),
        }
    }

    fn initialize(&mut self, params: Value) -> Result<Value, ErrorData> {
        match serde_json::from_value::<InitializeParams>(params) {
            Ok(p) => info!(
                client = %p.client_info.name,
                client_version = %p.client_info.version,
                protocol = %p.protocol_version,
                "Client initialized"
            ),
            Err(e) => debug!(error = %e, "Initialize without recognizable client info"),
        }

        self.state = EndpointState::Initialized;
        to_result(&InitializeResult::new(self.server_info.clone()))
    }

    async fn call_tool(&self, params: Value) -> Result<Value, ErrorData> {
        let params: CallToolParams =
            serde_json::from_value(params).map_err(|e| ErrorData::invalid_params(e.to_string()))?;

        let tool = self
            .tools
            .get(&params.name)
            .ok_or_else(|| ErrorData::tool_not_found(&params.name))?;

        let payload = run_capability(tool, params.name.clone(), params.arguments).await;
        let text = serde_json::to_string_pretty(&payload)
            .map_err(|e| ErrorData::internal_error(e.to_string()))?;

        to_result(&CallToolResult::text(text))
    }
}

/// Run a capability on its own task so a panic is contained like any other
/// failure. Failures become `{"error": "..."}` payloads.
async fn run_capability(
    tool: Arc<dyn Capability>,
    name: String,
    arguments: Map<String, Value>,
) -> Value {
    let outcome = tokio::spawn(async move { tool.invoke(arguments).await }).await;

    match outcome {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!(tool = %name, error = %e, "Tool execution failed");
            json!({ "error": format!("{:#}", e) })
        }
        Err(e) => {
            error!(tool = %name, error = %e, "Tool task aborted");
            json!({ "error": format!("tool {} aborted: {}", name, e) })
        }
    }
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, ErrorData> {
    serde_json::to_value(value).map_err(|e| ErrorData::internal_error(e.to_string()))
}
