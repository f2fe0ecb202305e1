use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::provider::{ModelProvider, SamplingParams};
use crate::transport::ProviderClient;
use crate::types::{SessionId, Transcript};

/// What the user sees when a turn fails for any reason.
pub const APOLOGY: &str =
    "I'm sorry, I encountered an error processing your request. Please try again.";

pub const SYSTEM_PROMPT: &str = "You are a helpful system administrator assistant. You have access to real-time system information.

When users ask about system performance, hardware, or computer status, provide helpful interpretations including:
- Whether resource usage levels are normal or concerning
- Suggestions for optimization if needed
- Clear explanations of technical terms
- Actionable recommendations when appropriate

Be conversational, helpful, and technically accurate. Keep responses concise but informative.";

/// One conversation: its transcript plus the model and provider it uses.
///
/// The provider client may be shared with other sessions and the poller;
/// the transcript belongs to this session alone.
pub struct ChatSession {
    id: SessionId,
    transcript: Transcript,
    client: Arc<ProviderClient>,
    model: Arc<dyn ModelProvider>,
    params: SamplingParams,
}

impl ChatSession {
    pub fn new(client: Arc<ProviderClient>, model: Arc<dyn ModelProvider>) -> Self {
        Self {
            id: SessionId::new(),
            transcript: Transcript::with_system(SYSTEM_PROMPT),
            client,
            model,
            params: SamplingParams::default(),
        }
    }

    pub fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.transcript = Transcript::with_system(prompt);
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Forget the conversation, keeping the system prompt.
    pub fn reset(&mut self) {
        self.transcript.reset();
    }

    /// Run one user turn and return the assistant's reply.
    ///
    /// Never fails: any error is logged and answered with [`APOLOGY`].
    #[tracing::instrument(skip(self, message), fields(session.id = %self.id))]
    pub async fn chat(&mut self, message: &str) -> String {
        match self.run_turn(message).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Chat turn failed");
                self.abandon_turn(&e);
                APOLOGY.to_string()
            }
        }
    }

    async fn run_turn(&mut self, message: &str) -> Result<String> {
        self.transcript.push_user(message);

        let registry = self.client.registry();
        let reply = self
            .model
            .complete(
                self.transcript.turns(),
                Some(registry.schemas()),
                &self.params,
            )
            .await
            .context("first model call failed")?;

        if reply.tool_calls.is_empty() {
            let content = reply.content.unwrap_or_default();
            self.transcript.push_assistant(Some(content.clone()), Vec::new());
            return Ok(content);
        }

        let invocations = reply.tool_calls.clone();
        self.transcript.push_assistant(reply.content, reply.tool_calls);

        for invocation in &invocations {
            info!(tool = %invocation.name, call_id = %invocation.id, "Calling tool");
            let output = self
                .client
                .call_tool(&invocation.name, invocation.parsed_arguments())
                .await
                .with_context(|| format!("tool {} failed", invocation.name))?;
            self.transcript.push_tool_result(&invocation.id, output)?;
        }

        let reply = self
            .model
            .complete(self.transcript.turns(), None, &self.params)
            .await
            .context("follow-up model call failed")?;

        let content = reply.content.unwrap_or_default();
        self.transcript.push_assistant(Some(content.clone()), Vec::new());
        Ok(content)
    }

    /// Close out a failed turn so the transcript stays valid for the next
    /// request: unanswered invocations get an error result, then the apology
    /// is recorded as the assistant's reply.
    fn abandon_turn(&mut self, cause: &anyhow::Error) {
        let pending: Vec<String> = self
            .transcript
            .pending_invocations()
            .into_iter()
            .map(|i| i.id.clone())
            .collect();

        for id in pending {
            if let Err(e) = self
                .transcript
                .push_tool_result(&id, format!("Error: {:#}", cause))
            {
                error!(error = %e, call_id = %id, "Failed to close out invocation");
            }
        }

        self.transcript
            .push_assistant(Some(APOLOGY.to_string()), Vec::new());
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("turns", &self.transcript.len())
            .field("params", &self.params)
            .finish()
    }
}
