//! Chat-completions provider (OpenAI and compatible endpoints)

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponse, ChatResponseBlock, ChatRole,
    ChatUsage, LlmProvider, StopReason, ToolDefinition,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Provider for `/v1/chat/completions`
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens,
        })
    }

    /// Same endpoint and credentials, different model or token budget.
    /// The HTTP client is shared.
    pub fn with_overrides(&self, model: Option<&str>, max_tokens: Option<u32>) -> Self {
        let mut provider = self.clone();
        if let Some(model) = model {
            provider.model = model.to_string();
        }
        if let Some(max_tokens) = max_tokens {
            provider.max_tokens = max_tokens;
        }
        provider
    }

    fn request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        tools: &'a [ToolDefinition],
        system: &'a str,
    ) -> CompletionRequest<'a> {
        let mut wire = vec![WireMessage::System { content: system }];
        wire.extend(messages.iter().flat_map(wire_messages));

        CompletionRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: wire,
            tools: tools.iter().map(WireTool::from).collect(),
        }
    }
}

/// One conversation message as it goes over the wire. Tool results are split
/// out into their own `tool` messages ahead of any user text.
fn wire_messages(msg: &ChatMessage) -> Vec<WireMessage<'_>> {
    match (msg.role, &msg.content) {
        (ChatRole::System, _) => Vec::new(),
        (ChatRole::User, ChatMessageContent::Text(text)) => {
            vec![WireMessage::User {
                content: Cow::Borrowed(text.as_str()),
            }]
        }
        (ChatRole::Assistant, ChatMessageContent::Text(text)) => vec![WireMessage::Assistant {
            content: Some(text.clone()),
            tool_calls: Vec::new(),
        }],
        (ChatRole::Assistant, ChatMessageContent::Blocks(blocks)) => {
            let text = joined_text(blocks);
            let tool_calls = blocks
                .iter()
                .filter_map(|block| match block {
                    ChatBlock::ToolCall { id, name, input } => Some(OutgoingToolCall {
                        id: id.as_str(),
                        kind: "function",
                        function: OutgoingFunction {
                            name: name.as_str(),
                            arguments: input.to_string(),
                        },
                    }),
                    _ => None,
                })
                .collect();
            vec![WireMessage::Assistant {
                content: text,
                tool_calls,
            }]
        }
        (ChatRole::User, ChatMessageContent::Blocks(blocks)) => {
            let mut out: Vec<WireMessage<'_>> = blocks
                .iter()
                .filter_map(|block| match block {
                    ChatBlock::ToolResult {
                        tool_call_id,
                        content,
                    } => Some(WireMessage::Tool {
                        tool_call_id: tool_call_id.as_str(),
                        content: content.as_str(),
                    }),
                    _ => None,
                })
                .collect();
            if let Some(text) = joined_text(blocks) {
                out.push(WireMessage::User {
                    content: Cow::Owned(text),
                });
            }
            out
        }
    }
}

fn joined_text(blocks: &[ChatBlock]) -> Option<String> {
    let parts: Vec<&str> = blocks
        .iter()
        .filter_map(|block| match block {
            ChatBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n"))
}

fn stop_reason(finish_reason: Option<&str>) -> StopReason {
    match finish_reason {
        Some("tool_calls") | Some("function_call") => StopReason::ToolUse,
        Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        _ => StopReason::Unknown,
    }
}

/// Best-effort message from an error body such as `{"error": {"message": "..."}}`
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ChatResponse> {
        let request = self.request(messages, tools, system);
        debug!(
            "Chat request: model={}, messages={}, tools={}",
            request.model,
            request.messages.len(),
            request.tools.len()
        );

        let response = self
            .client
            .post(format!("{}{}", self.base_url, COMPLETIONS_PATH))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send chat completion request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Chat completion rejected with {}", status);
            return Err(anyhow!(
                "Chat completion failed with status {}: {}",
                status,
                api_error_message(&body)
            ));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        ChatResponse::try_from(completion)
    }
}

// ── request ──

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum WireMessage<'a> {
    System {
        content: &'a str,
    },
    User {
        content: Cow<'a, str>,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<OutgoingToolCall<'a>>,
    },
    Tool {
        tool_call_id: &'a str,
        content: &'a str,
    },
}

#[derive(Debug, Serialize)]
struct OutgoingToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: OutgoingFunction<'a>,
}

#[derive(Debug, Serialize)]
struct OutgoingFunction<'a> {
    name: &'a str,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolSpec<'a>,
}

#[derive(Debug, Serialize)]
struct WireToolSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolDefinition> for WireTool<'a> {
    fn from(tool: &'a ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: WireToolSpec {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.input_schema,
            },
        }
    }
}

// ── response ──

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<IncomingToolCall>,
}

#[derive(Debug, Deserialize)]
struct IncomingToolCall {
    id: String,
    function: IncomingFunction,
}

#[derive(Debug, Deserialize)]
struct IncomingFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl From<Usage> for ChatUsage {
    fn from(usage: Usage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }
    }
}

impl From<IncomingToolCall> for ChatResponseBlock {
    fn from(call: IncomingToolCall) -> Self {
        // Unparseable arguments reach the tool as an empty object
        let input = serde_json::from_str::<Value>(&call.function.arguments)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        Self::ToolCall {
            id: call.id,
            name: call.function.name,
            input,
        }
    }
}

impl TryFrom<CompletionResponse> for ChatResponse {
    type Error = anyhow::Error;

    fn try_from(completion: CompletionResponse) -> Result<Self> {
        let usage = completion.usage.map(ChatUsage::from).unwrap_or_default();
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Chat completion had no choices"))?;

        debug!("Chat response: finish_reason={:?}", choice.finish_reason);

        let text = choice
            .message
            .content
            .filter(|c| !c.is_empty())
            .map(|text| ChatResponseBlock::Text { text });
        let blocks = text
            .into_iter()
            .chain(choice.message.tool_calls.into_iter().map(ChatResponseBlock::from))
            .collect();

        Ok(Self {
            blocks,
            stop_reason: stop_reason(choice.finish_reason.as_deref()),
            usage,
        })
    }
}
