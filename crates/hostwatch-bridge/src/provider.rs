//! Chat completion backends.

use anyhow::{Context, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolChoiceOption,
    ChatCompletionToolType, CreateChatCompletionRequestArgs, FinishReason as ApiFinishReason,
    FunctionCall, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use hostwatch_conf::ModelConfig;

use crate::registry::ToolSchema;
use crate::types::{ConversationTurn, ToolInvocation};

/// Per-request generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for SamplingParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other,
}

impl From<Option<ApiFinishReason>> for FinishReason {
    fn from(reason: Option<ApiFinishReason>) -> Self {
        match reason {
            Some(ApiFinishReason::Stop) => Self::Stop,
            Some(ApiFinishReason::Length) => Self::Length,
            Some(ApiFinishReason::ToolCalls) => Self::ToolCalls,
            Some(ApiFinishReason::ContentFilter) => Self::ContentFilter,
            _ => Self::Other,
        }
    }
}

/// One model response: text, tool invocations, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolInvocation>,
    pub finish_reason: FinishReason,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolInvocation>) -> Self {
        Self {
            content: None,
            tool_calls,
            finish_reason: FinishReason::ToolCalls,
        }
    }
}

/// A chat model with function calling.
///
/// `tools`:
/// - `Some` with schemas offers them and lets the model choose.
/// - `Some(&[])` sends tool choice `"none"`.
/// - `None` sends no tool fields at all.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(
        &self,
        transcript: &[ConversationTurn],
        tools: Option<&[ToolSchema]>,
        params: &SamplingParams,
    ) -> Result<ModelReply>;
}

/// Any OpenAI-compatible chat completions endpoint.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_base(base_url.trim_end_matches('/'));
        if let Some(key) = api_key {
            config = config.with_api_key(key);
        }
        Self {
            client: Client::with_config(config),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(&config.base_url, config.api_key.as_deref())
    }

    pub fn convert_messages(turns: &[ConversationTurn]) -> Result<Vec<ChatCompletionRequestMessage>> {
        turns
            .iter()
            .map(|turn| -> Result<ChatCompletionRequestMessage> {
                let message: ChatCompletionRequestMessage = match turn {
                    ConversationTurn::System { content } => ChatCompletionRequestSystemMessageArgs::default()
                        .content(content.as_str())
                        .build()?
                        .into(),
                    ConversationTurn::User { content } => ChatCompletionRequestUserMessageArgs::default()
                        .content(content.as_str())
                        .build()?
                        .into(),
                    ConversationTurn::Assistant {
                        content,
                        tool_calls,
                    } => {
                        let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                        if let Some(content) = content {
                            args.content(content.as_str());
                        }
                        if !tool_calls.is_empty() {
                            args.tool_calls(
                                tool_calls
                                    .iter()
                                    .map(|tc| ChatCompletionMessageToolCall {
                                        id: tc.id.clone(),
                                        r#type: ChatCompletionToolType::Function,
                                        function: FunctionCall {
                                            name: tc.name.clone(),
                                            arguments: tc.arguments.clone(),
                                        },
                                    })
                                    .collect::<Vec<_>>(),
                            );
                        }
                        args.build()?.into()
                    }
                    ConversationTurn::ToolResult {
                        tool_call_id,
                        content,
                    } => ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(tool_call_id.as_str())
                        .content(content.as_str())
                        .build()?
                        .into(),
                };
                Ok(message)
            })
            .collect()
    }

    pub fn convert_tools(tools: &[ToolSchema]) -> Result<Vec<ChatCompletionTool>> {
        tools
            .iter()
            .map(|tool| -> Result<ChatCompletionTool> {
                let function = FunctionObjectArgs::default()
                    .name(tool.function.name.as_str())
                    .description(tool.function.description.as_str())
                    .parameters(tool.function.parameters.clone())
                    .build()?;
                Ok(ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(function)
                    .build()?)
            })
            .collect()
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    #[tracing::instrument(
        skip(self, transcript, tools, params),
        fields(
            model = %params.model,
            turns = transcript.len(),
            tools = tools.map(|t| t.len()).unwrap_or(0),
        )
    )]
    async fn complete(
        &self,
        transcript: &[ConversationTurn],
        tools: Option<&[ToolSchema]>,
        params: &SamplingParams,
    ) -> Result<ModelReply> {
        let mut request = CreateChatCompletionRequestArgs::default();
        request
            .model(params.model.as_str())
            .messages(Self::convert_messages(transcript)?)
            .temperature(params.temperature)
            .max_completion_tokens(params.max_tokens);

        match tools {
            Some([]) => {
                request.tool_choice(ChatCompletionToolChoiceOption::None);
            }
            Some(tools) => {
                request
                    .tools(Self::convert_tools(tools)?)
                    .tool_choice(ChatCompletionToolChoiceOption::Auto);
            }
            None => {}
        }

        let response = self
            .client
            .chat()
            .create(request.build()?)
            .await
            .context("Chat completion request failed")?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .context("Chat completion returned no choices")?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolInvocation::new(tc.id, tc.function.name, tc.function.arguments))
            .collect::<Vec<_>>();

        let reply = ModelReply {
            content: choice.message.content,
            tool_calls,
            finish_reason: choice.finish_reason.into(),
        };

        tracing::debug!(
            finish_reason = ?reply.finish_reason,
            tool_calls = reply.tool_calls.len(),
            "Model replied"
        );

        Ok(reply)
    }
}
