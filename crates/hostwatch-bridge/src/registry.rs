//! Provider tool descriptors in chat-completions function-calling shape.

use std::collections::HashSet;

use hostwatch_proto::ToolDescriptor;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// `{"type": "function", "function": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl From<&ToolDescriptor> for ToolSchema {
    fn from(tool: &ToolDescriptor) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionSchema {
                name: tool.name.clone(),
                description: tool.description.clone().unwrap_or_default(),
                parameters: tool.schema_or_empty(),
            },
        }
    }
}

/// Tools advertised at connect time. Immutable once built; a reconnect
/// builds a new one.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    descriptors: Vec<ToolDescriptor>,
    schemas: Vec<ToolSchema>,
}

impl ToolRegistry {
    /// Build from a `tools/list` result. A repeated name keeps its first
    /// descriptor.
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        let mut seen = HashSet::new();
        let descriptors: Vec<ToolDescriptor> = tools
            .into_iter()
            .filter(|t| {
                let fresh = seen.insert(t.name.clone());
                if !fresh {
                    warn!(tool = %t.name, "Provider advertised a tool twice, keeping the first");
                }
                fresh
            })
            .collect();

        let schemas = descriptors.iter().map(ToolSchema::from).collect();
        Self {
            descriptors,
            schemas,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn schemas(&self) -> &[ToolSchema] {
        &self.schemas
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.descriptors.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
