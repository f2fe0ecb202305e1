//! hostwatch-provider - host telemetry over line-delimited JSON-RPC
//!
//! The provider is spawned by the bridge with piped stdio. It answers
//! `initialize`, `tools/list` and `tools/call` and exposes a single tool,
//! `get_system_info`. Diagnostics go to stderr so stdout carries only
//! protocol traffic.

pub mod capability;
pub mod endpoint;
pub mod host;

pub use capability::{Capability, ToolTable};
pub use endpoint::{Endpoint, EndpointState};
pub use host::{collect, SystemInfoTool, SystemSnapshot, SYSTEM_INFO_TOOL};

/// The tools a stock provider serves.
pub fn default_tools() -> ToolTable {
    ToolTable::new().with(SystemInfoTool)
}
