use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Chat session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// JSON text exactly as the model produced it.
    pub arguments: String,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Arguments as an object. Text that is not a JSON object yields `{}`.
    pub fn parsed_arguments(&self) -> Value {
        match serde_json::from_str::<Value>(&self.arguments) {
            Ok(Value::Object(map)) => Value::Object(map),
            _ => Value::Object(Map::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ConversationTurn {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolInvocation>,
    },
    #[serde(rename = "tool")]
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolResult { .. } => "tool",
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::System { content } | Self::User { content } => Some(content),
            Self::Assistant { content, .. } => content.as_deref(),
            Self::ToolResult { content, .. } => Some(content),
        }
    }
}

/// Ordered, append-only conversation log.
///
/// Tool results may only follow the assistant turn that requested them, one
/// per invocation id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![ConversationTurn::system(prompt)],
        }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::user(content));
    }

    pub fn push_assistant(&mut self, content: Option<String>, tool_calls: Vec<ToolInvocation>) {
        self.turns.push(ConversationTurn::Assistant {
            content,
            tool_calls,
        });
    }

    /// Answer one invocation of the most recent assistant turn.
    pub fn push_tool_result(
        &mut self,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<()> {
        let tool_call_id = tool_call_id.into();
        if !self.pending_invocations().iter().any(|i| i.id == tool_call_id) {
            bail!("no pending tool invocation with id {}", tool_call_id);
        }

        self.turns.push(ConversationTurn::ToolResult {
            tool_call_id,
            content: content.into(),
        });
        Ok(())
    }

    /// Invocations of the trailing assistant turn that have no result yet.
    pub fn pending_invocations(&self) -> Vec<&ToolInvocation> {
        let Some(assistant) = self
            .turns
            .iter()
            .rposition(|t| matches!(t, ConversationTurn::Assistant { .. }))
        else {
            return Vec::new();
        };

        let ConversationTurn::Assistant { tool_calls, .. } = &self.turns[assistant] else {
            return Vec::new();
        };

        // Only tool results may sit between the assistant turn and the end
        let answered: Vec<&str> = self.turns[assistant + 1..]
            .iter()
            .filter_map(|t| match t {
                ConversationTurn::ToolResult { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();
        if answered.len() != self.turns.len() - assistant - 1 {
            return Vec::new();
        }

        tool_calls
            .iter()
            .filter(|i| !answered.contains(&i.id.as_str()))
            .collect()
    }

    /// Drop everything after the leading system turn.
    pub fn reset(&mut self) {
        let keep = usize::from(matches!(
            self.turns.first(),
            Some(ConversationTurn::System { .. })
        ));
        self.turns.truncate(keep);
    }
}
