use std::time::Duration;

use hostwatch_proto::ErrorData;
use thiserror::Error;

/// Failures talking to the provider subprocess.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to spawn provider `{program}`: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The child is left running; the caller owns the decision to retry.
    #[error("provider handshake failed: {0}")]
    Handshake(#[source] Box<BridgeError>),

    #[error("no response from provider within {0:?}")]
    TransportTimeout(Duration),

    #[error("provider closed the connection")]
    TransportClosed,

    #[error("protocol error: {0}")]
    Protocol(String),

    /// The provider answered with a JSON-RPC error object.
    #[error("provider returned error {0}")]
    Rpc(ErrorData),

    #[error("telemetry unavailable: {0}")]
    TelemetryUnavailable(String),

    #[error("provider not started")]
    NotStarted,

    #[error("provider I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// True when the provider is gone and only a restart helps.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, BridgeError::TransportClosed | BridgeError::NotStarted)
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
