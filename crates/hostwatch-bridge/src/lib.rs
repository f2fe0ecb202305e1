//! hostwatch-bridge - chat model to telemetry provider bridge
//!
//! Owns the provider subprocess ([`ProviderClient`]), turns its tools into
//! function-calling schemas ([`ToolRegistry`]), runs chat turns that may call
//! those tools ([`ChatSession`]) and pushes periodic snapshots to
//! subscribers ([`TelemetryPoller`], [`SubscriberRegistry`]).

pub mod agent_loop;
pub mod broadcast;
pub mod error;
pub mod poller;
pub mod provider;
pub mod registry;
pub mod telemetry;
pub mod transport;
pub mod types;

pub use agent_loop::{ChatSession, APOLOGY, SYSTEM_PROMPT};
pub use broadcast::{SubscriberId, SubscriberRegistry};
pub use error::{BridgeError, Result};
pub use poller::{initial_snapshot, snapshot_message, TelemetryPoller, TickOutcome};
pub use provider::{FinishReason, ModelProvider, ModelReply, OpenAiProvider, SamplingParams};
pub use registry::{FunctionSchema, ToolRegistry, ToolSchema};
pub use transport::{ProviderClient, ProviderCommand, DEFAULT_REQUEST_TIMEOUT};
pub use types::{ConversationTurn, SessionId, ToolInvocation, Transcript};
