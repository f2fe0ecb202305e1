//! Named capabilities and the table the endpoint dispatches through.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use hostwatch_proto::ToolDescriptor;
use serde_json::{Map, Value};

/// A callable tool.
///
/// `invoke` returns the structured result; the endpoint serializes it into a
/// single text content item. An `Err` is a failed run, not a protocol error.
#[async_trait]
pub trait Capability: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn invoke(&self, arguments: Map<String, Value>) -> anyhow::Result<Value>;
}

/// Tool name to capability. Names are unique; registering a name twice
/// replaces the earlier entry.
#[derive(Clone, Default)]
pub struct ToolTable {
    tools: BTreeMap<String, Arc<dyn Capability>>,
}

impl ToolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: impl Capability + 'static) -> &mut Self {
        let name = capability.descriptor().name;
        self.tools.insert(name, Arc::new(capability));
        self
    }

    pub fn with(mut self, capability: impl Capability + 'static) -> Self {
        self.register(capability);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.tools.get(name).cloned()
    }

    /// Descriptors in name order, so repeated listings are identical.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|c| c.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolTable")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}
