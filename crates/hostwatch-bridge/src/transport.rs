//! Client for a provider subprocess speaking line-delimited JSON-RPC.
//!
//! One request is in flight at a time: the connection mutex is held from
//! writing a request until its reply line has been read. Every reply must
//! carry the id of the request it answers. Late replies to requests that
//! already timed out are discarded; any other id means the stream is out of
//! step, which is reported as [`BridgeError::Protocol`] and clears
//! connectivity.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use hostwatch_conf::ProviderConfig;
use hostwatch_proto::{
    decode_line, encode_line, methods, CallToolParams, CallToolResult, Implementation,
    InitializeParams, InitializeResult, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, RequestId, ToolDescriptor, SYSTEM_INFO_TOOL,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::registry::ToolRegistry;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `close` waits for the child to exit after closing its stdin.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// How to launch the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl ProviderCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl From<&ProviderConfig> for ProviderCommand {
    fn from(config: &ProviderConfig) -> Self {
        ProviderCommand::new(config.program.clone()).args(config.args.iter().cloned())
    }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The byte streams to the provider, plus the child when we spawned it.
struct Connection {
    reader: BufReader<BoxedReader>,
    writer: BoxedWriter,
    /// Bytes of a line whose read was cut short by a timeout.
    partial: Vec<u8>,
    child: Option<Child>,
    stderr: Option<JoinHandle<()>>,
}

impl Connection {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(closed_or_io)?;
        self.writer.flush().await.map_err(closed_or_io)
    }

    /// Read one line before `deadline`. A timeout keeps whatever was
    /// already read so the next call resumes the same line.
    async fn read_line(&mut self, deadline: Instant, timeout: Duration) -> Result<String> {
        let read = tokio::time::timeout_at(
            deadline,
            self.reader.read_until(b'\n', &mut self.partial),
        )
        .await
        .map_err(|_| BridgeError::TransportTimeout(timeout))?
        .map_err(closed_or_io)?;

        if read == 0 {
            return Err(BridgeError::TransportClosed);
        }
        let line = std::mem::take(&mut self.partial);
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Close stdin, give the child a moment to exit, then kill it.
    async fn shutdown(self) {
        let Connection {
            reader,
            mut writer,
            child,
            stderr,
            ..
        } = self;

        if let Err(e) = writer.shutdown().await {
            debug!(error = %e, "Closing provider input failed");
        }
        drop(writer);
        drop(reader);

        if let Some(mut child) = child {
            match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => info!(%status, "Provider exited"),
                Ok(Err(e)) => warn!(error = %e, "Failed to wait for provider"),
                Err(_) => {
                    warn!("Provider did not exit after closing its input, killing");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill provider");
                    }
                }
            }
        }

        if let Some(task) = stderr {
            if tokio::time::timeout(Duration::from_millis(500), task).await.is_err() {
                debug!("Provider stderr still open after exit");
            }
        }
    }
}

fn closed_or_io(e: std::io::Error) -> BridgeError {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::UnexpectedEof => BridgeError::TransportClosed,
        _ => BridgeError::Io(e),
    }
}

/// Forward the child's stderr into our logs so the pipe never fills up.
fn drain_stderr(stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => debug!(target: "hostwatch::provider", "{}", line),
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "Stopped reading provider stderr");
                    break;
                }
            }
        }
    })
}

fn decode_result<T: DeserializeOwned>(what: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| BridgeError::Protocol(format!("malformed {} result: {}", what, e)))
}

/// Connection to one provider. Share it behind an `Arc`.
pub struct ProviderClient {
    command: Option<ProviderCommand>,
    request_timeout: Duration,
    connection: Mutex<Option<Connection>>,
    next_id: AtomicI64,
    connected: AtomicBool,
    registry: RwLock<Arc<ToolRegistry>>,
}

impl ProviderClient {
    pub fn new(command: ProviderCommand) -> Self {
        Self {
            command: Some(command),
            ..Self::detached()
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(ProviderCommand::from(config)).with_timeout(config.request_timeout())
    }

    /// A client with no command to spawn; connect it with [`attach`](Self::attach).
    pub fn detached() -> Self {
        Self {
            command: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connection: Mutex::new(None),
            next_id: AtomicI64::new(1),
            connected: AtomicBool::new(false),
            registry: RwLock::new(Arc::new(ToolRegistry::empty())),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Spawn the provider and run the handshake.
    ///
    /// On a handshake failure the child keeps running and the client stays
    /// disconnected.
    #[tracing::instrument(skip(self), fields(provider.program))]
    pub async fn start(&self) -> Result<()> {
        let Some(command) = &self.command else {
            return Err(BridgeError::ProcessSpawn {
                program: String::new(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no provider command configured",
                ),
            });
        };
        tracing::Span::current().record("provider.program", command.program.as_str());

        let spawn_error = |source: std::io::Error| BridgeError::ProcessSpawn {
            program: command.program.clone(),
            source,
        };
        let missing = |stream: &str| {
            spawn_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("child {} was not piped", stream),
            ))
        };

        let mut child = command.to_command().spawn().map_err(&spawn_error)?;
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().map(drain_stderr);

        info!(pid = ?child.id(), args = ?command.args, "Provider process started");

        self.install(Connection {
            reader: BufReader::new(Box::new(stdout)),
            writer: Box::new(stdin),
            partial: Vec::new(),
            child: Some(child),
            stderr,
        })
        .await;

        self.handshake().await
    }

    /// Use an already-connected pair of streams and run the handshake.
    pub async fn attach<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.install(Connection {
            reader: BufReader::new(Box::new(reader)),
            writer: Box::new(writer),
            partial: Vec::new(),
            child: None,
            stderr: None,
        })
        .await;

        self.handshake().await
    }

    async fn install(&self, connection: Connection) {
        self.connected.store(false, Ordering::SeqCst);
        let previous = self.connection.lock().await.replace(connection);
        if let Some(previous) = previous {
            debug!("Replacing existing provider connection");
            previous.shutdown().await;
        }
    }

    async fn handshake(&self) -> Result<()> {
        match self.negotiate().await {
            Ok(registry) => {
                info!(tools = registry.len(), "Provider connected");
                self.set_registry(registry);
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Provider handshake failed");
                self.connected.store(false, Ordering::SeqCst);
                Err(BridgeError::Handshake(Box::new(e)))
            }
        }
    }

    async fn negotiate(&self) -> Result<ToolRegistry> {
        let params = InitializeParams::new(Implementation::new(
            "hostwatch-bridge",
            env!("CARGO_PKG_VERSION"),
        ));
        let params = serde_json::to_value(params)
            .map_err(|e| BridgeError::Protocol(format!("failed to encode initialize: {}", e)))?;

        let init: InitializeResult =
            decode_result("initialize", self.send(methods::INITIALIZE, params).await?)?;
        debug!(
            server = %init.server_info.name,
            server_version = %init.server_info.version,
            protocol = %init.protocol_version,
            "Provider initialized"
        );

        self.notify(methods::INITIALIZED).await?;

        let listed: ListToolsResult =
            decode_result("tools/list", self.send(methods::TOOLS_LIST, json!({})).await?)?;
        Ok(ToolRegistry::new(listed.tools))
    }

    /// Send one request and wait for its reply.
    ///
    /// Returns the `result` value; an `error` reply becomes
    /// [`BridgeError::Rpc`]. Never retries.
    #[tracing::instrument(skip(self, params), fields(rpc.method = %method, rpc.id))]
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or(BridgeError::NotStarted)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::Span::current().record("rpc.id", id);

        let request = JsonRpcRequest::with_params(id, method, params);
        let line = encode_line(&request)
            .map_err(|e| BridgeError::Protocol(format!("failed to encode request: {}", e)))?;

        let reply = match connection.write_line(&line).await {
            Ok(()) => self.await_reply(connection, id).await,
            Err(e) => Err(e),
        };
        drop(guard);

        reply?.into_result().map_err(BridgeError::Rpc)
    }

    /// Read until the reply to `id` arrives, all within one request timeout.
    async fn await_reply(&self, connection: &mut Connection, id: i64) -> Result<JsonRpcResponse> {
        let deadline = Instant::now() + self.request_timeout;

        loop {
            let line = connection
                .read_line(deadline, self.request_timeout)
                .await
                .inspect_err(|e| {
                    if matches!(e, BridgeError::TransportClosed) {
                        self.connected.store(false, Ordering::SeqCst);
                    }
                })?;

            let response: JsonRpcResponse = decode_line(&line)
                .map_err(|e| BridgeError::Protocol(format!("undecodable response: {}", e)))?;

            match response.id.clone() {
                RequestId::Number(n) if n == id => return Ok(response),
                // ids only grow, so a smaller one answers a request that timed out
                RequestId::Number(n) if n < id => {
                    debug!(stale_id = n, id, "Discarding late reply");
                }
                other => {
                    warn!(response_id = %other, id, "Provider stream out of step");
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(BridgeError::Protocol(format!(
                        "response id {} does not match request id {}",
                        other, id
                    )));
                }
            }
        }
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let line = encode_line(&JsonRpcMessage::notification(method))
            .map_err(|e| BridgeError::Protocol(format!("failed to encode notification: {}", e)))?;

        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or(BridgeError::NotStarted)?;
        connection.write_line(&line).await
    }

    async fn invoke(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let params = serde_json::to_value(CallToolParams::new(name, arguments))
            .map_err(|e| BridgeError::Protocol(format!("failed to encode tools/call: {}", e)))?;
        decode_result("tools/call", self.send(methods::TOOLS_CALL, params).await?)
    }

    /// Call a tool and return the text of its first content item.
    ///
    /// A JSON-RPC error from the provider is returned as text, so the caller
    /// can hand it to the model. Transport failures are still errors.
    #[tracing::instrument(skip(self, arguments), fields(tool.name = %name))]
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        match self.invoke(name, arguments).await {
            Ok(result) => result.first_text().map(str::to_string).ok_or_else(|| {
                BridgeError::Protocol(format!("tool {} returned no text content", name))
            }),
            Err(BridgeError::Rpc(error)) => {
                warn!(code = error.code, error = %error.message, "Tool call rejected");
                Ok(format!("Error calling tool {}: {}", name, error))
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch and decode one host snapshot.
    pub async fn fetch_telemetry(&self) -> Result<Value> {
        if !self.is_connected() {
            return Err(BridgeError::TelemetryUnavailable(
                "provider not connected".to_string(),
            ));
        }

        let result = self
            .invoke(SYSTEM_INFO_TOOL, json!({}))
            .await
            .map_err(|e| BridgeError::TelemetryUnavailable(e.to_string()))?;

        let text = result.first_text().ok_or_else(|| {
            BridgeError::TelemetryUnavailable("snapshot has no text content".to_string())
        })?;

        let snapshot: Value = serde_json::from_str(text).map_err(|e| {
            BridgeError::TelemetryUnavailable(format!("snapshot is not JSON: {}", e))
        })?;

        if let Some(message) = snapshot.get("error").and_then(Value::as_str) {
            return Err(BridgeError::TelemetryUnavailable(message.to_string()));
        }

        Ok(snapshot)
    }

    /// Terminate the provider and wait for it. Safe to call repeatedly.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let connection = self.connection.lock().await.take();
        self.set_registry(ToolRegistry::empty());

        if let Some(connection) = connection {
            info!("Closing provider connection");
            connection.shutdown().await;
        }
    }

    /// `close` followed by `start`.
    pub async fn reconnect(&self) -> Result<()> {
        self.close().await;
        self.start().await
    }

    /// True only after both `initialize` and `tools/list` succeeded, and
    /// until the provider is closed, its stream ends, or a reply arrives for
    /// a request that was never sent. Timeouts leave it set.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        match self.registry.read() {
            Ok(registry) => registry.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.registry().descriptors().to_vec()
    }

    fn set_registry(&self, registry: ToolRegistry) {
        let registry = Arc::new(registry);
        match self.registry.write() {
            Ok(mut slot) => *slot = registry,
            Err(poisoned) => *poisoned.into_inner() = registry,
        }
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("command", &self.command)
            .field("request_timeout", &self.request_timeout)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostwatch_proto::ErrorData;

    #[test]
    fn test_command_from_config() {
        let config = ProviderConfig {
            program: "/usr/libexec/hostwatch-provider".to_string(),
            args: vec!["--quiet".to_string()],
            request_timeout_ms: 2500,
        };

        let command = ProviderCommand::from(&config);
        assert_eq!(command.program, "/usr/libexec/hostwatch-provider");
        assert_eq!(command.args, vec!["--quiet"]);

        let client = ProviderClient::from_config(&config);
        assert_eq!(client.request_timeout(), Duration::from_millis(2500));
        assert!(!client.is_connected());
    }

    #[test]
    fn test_pipe_errors_mean_closed() {
        let broken = std::io::Error::from(std::io::ErrorKind::BrokenPipe);
        assert!(matches!(closed_or_io(broken), BridgeError::TransportClosed));

        let other = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(matches!(closed_or_io(other), BridgeError::Io(_)));
    }

    #[tokio::test]
    async fn test_send_before_start() {
        let client = ProviderClient::detached();
        let err = client.send("tools/list", json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotStarted));
    }

    #[tokio::test]
    async fn test_detached_start_is_spawn_error() {
        let err = ProviderClient::detached().start().await.unwrap_err();
        assert!(matches!(err, BridgeError::ProcessSpawn { .. }));
    }

    #[tokio::test]
    async fn test_telemetry_requires_connection() {
        let client = ProviderClient::detached();
        let err = client.fetch_telemetry().await.unwrap_err();
        assert!(matches!(err, BridgeError::TelemetryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = ProviderClient::detached();
        client.close().await;
        client.close().await;
        assert!(!client.is_connected());
    }

    #[test]
    fn test_rpc_error_display_includes_code() {
        let err = BridgeError::Rpc(ErrorData::tool_not_found("nonexistent"));
        let text = err.to_string();
        assert!(text.contains("-32601"));
        assert!(text.contains("nonexistent"));
    }
}
