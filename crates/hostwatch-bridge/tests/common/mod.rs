//! Fake providers for bridge tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hostwatch_bridge::{ConversationTurn, ModelProvider, ModelReply, ProviderClient, SamplingParams, ToolSchema};
use hostwatch_proto::JsonRpcMessage;
use hostwatch_provider::{Capability, Endpoint, ToolTable};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// What a scripted provider does with one request.
pub enum Reply {
    /// Answer with this `result` and the request's id.
    Result(Value),
    /// Like `Result`, after a pause.
    Delayed(Duration, Value),
    /// Like `Result`, pausing halfway through writing the line.
    Stalled(Duration, Value),
    /// Write this line verbatim.
    Raw(String),
    /// Read the request and never answer.
    Silent,
    /// Close both streams.
    Hangup,
}

/// Answers the handshake like a provider with one telemetry tool.
pub fn handshake_reply(message: &JsonRpcMessage) -> Option<Reply> {
    match message.method.as_str() {
        "initialize" => Some(Reply::Result(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "scripted", "version": "0.0.0"}
        }))),
        "tools/list" => Some(Reply::Result(json!({
            "tools": [{
                "name": "get_system_info",
                "description": "Host metrics",
                "inputSchema": {"type": "object", "properties": {}, "required": []}
            }]
        }))),
        _ => None,
    }
}

/// Attach `client` to an in-memory provider driven by `respond`.
pub async fn attach_scripted<F>(client: &ProviderClient, mut respond: F) -> hostwatch_bridge::Result<()>
where
    F: FnMut(&JsonRpcMessage) -> Reply + Send + 'static,
{
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);

    tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(server_end);
        let mut lines = BufReader::new(read).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(message) = serde_json::from_str::<JsonRpcMessage>(&line) else {
                continue;
            };
            if message.id.is_none() {
                continue;
            }

            let reply_to = |result: Value| {
                format!(
                    "{}\n",
                    json!({"jsonrpc": "2.0", "id": message.id, "result": result})
                )
            };

            let (head, pause, tail) = match respond(&message) {
                Reply::Result(result) => (reply_to(result), None, String::new()),
                Reply::Delayed(pause, result) => {
                    tokio::time::sleep(pause).await;
                    (reply_to(result), None, String::new())
                }
                Reply::Stalled(pause, result) => {
                    let mut head = reply_to(result);
                    let tail = head.split_off(head.len() / 2);
                    (head, Some(pause), tail)
                }
                Reply::Raw(line) => (format!("{}\n", line), None, String::new()),
                Reply::Silent => continue,
                Reply::Hangup => return,
            };

            if write.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            if let Some(pause) = pause {
                tokio::time::sleep(pause).await;
            }
            if write.write_all(tail.as_bytes()).await.is_err() {
                return;
            }
        }
    });

    let (read, write) = tokio::io::split(client_end);
    client.attach(read, write).await
}

/// Attach `client` to a real provider endpoint serving `tools`.
pub async fn attach_endpoint(client: &ProviderClient, tools: ToolTable) -> hostwatch_bridge::Result<()> {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        let (read, write) = tokio::io::split(server_end);
        Endpoint::new(tools).serve(read, write).await
    });

    let (read, write) = tokio::io::split(client_end);
    client.attach(read, write).await
}

/// A `get_system_info` stand-in that returns a fixed snapshot and records
/// the arguments it was called with.
#[derive(Clone)]
pub struct FixedSnapshot {
    pub snapshot: Value,
    pub calls: Arc<Mutex<Vec<Map<String, Value>>>>,
}

impl FixedSnapshot {
    pub fn new(snapshot: Value) -> Self {
        Self {
            snapshot,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<Map<String, Value>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Capability for FixedSnapshot {
    fn descriptor(&self) -> hostwatch_proto::ToolDescriptor {
        hostwatch_proto::ToolDescriptor::new("get_system_info", "Host metrics")
            .with_input_schema(hostwatch_proto::empty_object_schema())
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> anyhow::Result<Value> {
        self.calls.lock().unwrap().push(arguments);
        Ok(self.snapshot.clone())
    }
}

/// One recorded model call.
#[derive(Debug, Clone)]
pub struct ModelCall {
    pub transcript: Vec<ConversationTurn>,
    pub tools: Option<Vec<ToolSchema>>,
}

/// A model that plays back canned replies in order.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<anyhow::Result<ModelReply>>>,
    calls: Mutex<Vec<ModelCall>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<anyhow::Result<ModelReply>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ModelCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedModel {
    async fn complete(
        &self,
        transcript: &[ConversationTurn],
        tools: Option<&[ToolSchema]>,
        _params: &SamplingParams,
    ) -> anyhow::Result<ModelReply> {
        self.calls.lock().unwrap().push(ModelCall {
            transcript: transcript.to_vec(),
            tools: tools.map(<[ToolSchema]>::to_vec),
        });

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
    }
}
