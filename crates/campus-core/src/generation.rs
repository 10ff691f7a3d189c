//! Reply generation: one responder, its instructions and its tools

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::conversation::generation_messages;
use crate::format::clean_response;
use crate::providers::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponseBlock, ChatRole, ChatUsage,
    LlmProvider, StopReason,
};
use crate::registry::ResponderProfile;
use crate::tools::{ToolExecutor, ToolRegistry};
use crate::types::{ResponderId, ToolInvocation, Turn};

const MAX_ITERATIONS: usize = 10;
const MAX_TOOL_OUTPUT: usize = 100_000;

/// Generated reply text plus the tools used to produce it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub text: String,
    pub tool_calls: Vec<ToolInvocation>,
    /// Tokens summed over every model call of the exchange
    pub usage: ChatUsage,
}

/// Produces a reply as a given responder
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(
        &self,
        profile: &ResponderProfile,
        history: &[Turn],
        query: &str,
    ) -> Result<Generation>;
}

/// [`ResponseGenerator`] backed by a chat model with a tool loop
pub struct LlmGenerator {
    provider: Arc<dyn LlmProvider>,
    per_responder: HashMap<ResponderId, Arc<dyn LlmProvider>>,
    tools: Arc<ToolRegistry>,
    timeout: Duration,
}

impl LlmGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            per_responder: HashMap::new(),
            tools,
            timeout: Duration::from_secs(120),
        }
    }

    /// Use a different provider for one responder (model override)
    pub fn with_responder_provider(
        mut self,
        id: ResponderId,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        self.per_responder.insert(id, provider);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn provider_for(&self, id: ResponderId) -> &Arc<dyn LlmProvider> {
        self.per_responder.get(&id).unwrap_or(&self.provider)
    }

    async fn run_tool_loop(
        &self,
        provider: &dyn LlmProvider,
        profile: &ResponderProfile,
        mut conversation: Vec<ChatMessage>,
    ) -> Result<Generation> {
        let executor = self.tools.scoped(profile);
        let tool_defs = executor.list_tools();
        let mut tool_calls = Vec::new();
        let mut usage = ChatUsage::default();

        for iteration in 1..=MAX_ITERATIONS {
            debug!("{}: tool loop iteration {}", profile.id, iteration);

            let response = provider
                .chat(&conversation, &tool_defs, &profile.instructions)
                .await?;
            usage.add(response.usage);

            if !response.stop_reason.is_tool_use() {
                if response.stop_reason == StopReason::MaxTokens {
                    warn!("{}: reply hit the token limit", profile.id);
                }
                let text = response.text();
                if text.trim().is_empty() {
                    return Err(anyhow!("No text response from {}", profile.id));
                }
                info!(
                    "{}: reply ready after {} iteration(s), {} tool call(s), {} input + {} output tokens",
                    profile.id,
                    iteration,
                    tool_calls.len(),
                    usage.input_tokens,
                    usage.output_tokens
                );
                return Ok(Generation {
                    text: clean_response(&text),
                    tool_calls,
                    usage,
                });
            }

            let mut assistant_blocks = Vec::new();
            let mut results = Vec::new();

            for block in &response.blocks {
                match block {
                    ChatResponseBlock::Text { text } => {
                        assistant_blocks.push(ChatBlock::Text { text: text.clone() });
                    }
                    ChatResponseBlock::ToolCall { id, name, input } => {
                        info!("{}: executing tool {}", profile.id, name);
                        assistant_blocks.push(ChatBlock::ToolCall {
                            id: id.clone(),
                            name: name.clone(),
                            input: input.clone(),
                        });

                        let output = match executor.execute(name, input.clone()).await {
                            Ok(output) => truncate_output(output),
                            Err(e) => {
                                warn!("Tool {} failed: {}", name, e);
                                format!("Error: {}", e)
                            }
                        };

                        tool_calls.push(ToolInvocation {
                            name: name.clone(),
                            input: input.clone(),
                            output: output.clone(),
                        });
                        results.push(ChatBlock::ToolResult {
                            tool_call_id: id.clone(),
                            content: output,
                        });
                    }
                }
            }

            if results.is_empty() {
                return Err(anyhow!("Stop reason was tool use but no tool calls found"));
            }

            conversation.push(ChatMessage {
                role: ChatRole::Assistant,
                content: ChatMessageContent::Blocks(assistant_blocks),
            });
            conversation.push(ChatMessage {
                role: ChatRole::User,
                content: ChatMessageContent::Blocks(results),
            });
        }

        warn!("Tool loop exceeded maximum iterations ({})", MAX_ITERATIONS);
        Err(anyhow!("Tool loop exceeded maximum iterations"))
    }
}

#[async_trait]
impl ResponseGenerator for LlmGenerator {
    async fn generate(
        &self,
        profile: &ResponderProfile,
        history: &[Turn],
        query: &str,
    ) -> Result<Generation> {
        let provider = self.provider_for(profile.id);
        debug!(
            "Generating as {} with {}/{}",
            profile.id,
            provider.provider_name(),
            provider.model()
        );
        let conversation = generation_messages(history, query);

        tokio::time::timeout(
            self.timeout,
            self.run_tool_loop(provider.as_ref(), profile, conversation),
        )
        .await
        .map_err(|_| anyhow!("Generation timed out after {}s", self.timeout.as_secs()))?
    }
}

fn truncate_output(mut output: String) -> String {
    if output.len() > MAX_TOOL_OUTPUT {
        let mut cut = MAX_TOOL_OUTPUT;
        while !output.is_char_boundary(cut) {
            cut -= 1;
        }
        output.truncate(cut);
        output.push_str("\n[Output truncated]");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeBase;
    use crate::providers::{ChatResponse, ToolDefinition};
    use crate::registry::ResponderRegistry;
    use crate::tools::{ACADEMIC_CALENDAR_TOOL, COURSE_LOOKUP_TOOL};
    use std::sync::Mutex;

    /// Replays canned responses and records what it was offered
    struct ScriptedProvider {
        responses: Mutex<Vec<ChatResponse>>,
        seen_tools: Mutex<Vec<Vec<String>>>,
        seen_system: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<ChatResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                seen_tools: Mutex::new(Vec::new()),
                seen_system: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            tools: &[ToolDefinition],
            system: &str,
        ) -> Result<ChatResponse> {
            self.seen_tools
                .lock()
                .unwrap()
                .push(tools.iter().map(|t| t.name.clone()).collect());
            self.seen_system.lock().unwrap().push(system.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow!("script exhausted"))
        }
    }

    fn text(text: &str) -> ChatResponse {
        ChatResponse {
            blocks: vec![ChatResponseBlock::Text {
                text: text.to_string(),
            }],
            stop_reason: StopReason::EndTurn,
            usage: ChatUsage {
                input_tokens: 40,
                output_tokens: 12,
            },
        }
    }

    fn tool_call(name: &str, input: serde_json::Value) -> ChatResponse {
        ChatResponse {
            blocks: vec![ChatResponseBlock::ToolCall {
                id: "call_1".to_string(),
                name: name.to_string(),
                input,
            }],
            stop_reason: StopReason::ToolUse,
            usage: ChatUsage {
                input_tokens: 30,
                output_tokens: 8,
            },
        }
    }

    fn generator(provider: Arc<ScriptedProvider>) -> LlmGenerator {
        let tools = Arc::new(ToolRegistry::with_knowledge(Arc::new(KnowledgeBase::default())));
        LlmGenerator::new(provider, tools)
    }

    #[tokio::test]
    async fn test_plain_reply_is_cleaned() {
        let provider = Arc::new(ScriptedProvider::new(vec![text(
            "\"Hello there. Would you like help?\"",
        )]));
        let registry = ResponderRegistry::builtin();
        let result = generator(provider.clone())
            .generate(registry.get(ResponderId::TriageAgent), &[], "hi")
            .await
            .unwrap();
        assert_eq!(result.text, "Hello there. \n\nWould you like help?");
        assert!(result.tool_calls.is_empty());
        assert!(provider.seen_tools.lock().unwrap()[0].is_empty());
        assert!(provider.seen_system.lock().unwrap()[0].contains("Triage Agent"));
    }

    #[tokio::test]
    async fn test_tool_loop_records_invocations() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call(COURSE_LOOKUP_TOOL, serde_json::json!({"topic": "data science"})),
            text("Take CS320 and STAT210."),
        ]));
        let registry = ResponderRegistry::builtin();
        let result = generator(provider.clone())
            .generate(
                registry.get(ResponderId::CourseAdvisor),
                &[],
                "data science courses?",
            )
            .await
            .unwrap();

        assert_eq!(result.text, "Take CS320 and STAT210.");
        assert_eq!(result.tool_calls.len(), 1);
        let call = &result.tool_calls[0];
        assert_eq!(call.name, COURSE_LOOKUP_TOOL);
        assert!(call.output.contains("CS320"));
        assert_eq!(
            result.usage,
            ChatUsage {
                input_tokens: 70,
                output_tokens: 20,
            }
        );
        assert_eq!(
            provider.seen_tools.lock().unwrap()[0],
            vec![COURSE_LOOKUP_TOOL.to_string()]
        );
    }

    #[tokio::test]
    async fn test_disallowed_tool_reports_error_to_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call(ACADEMIC_CALENDAR_TOOL, serde_json::json!({"query": "exams"})),
            text("I can only help with courses."),
        ]));
        let registry = ResponderRegistry::builtin();
        let result = generator(provider)
            .generate(registry.get(ResponderId::CourseAdvisor), &[], "exams?")
            .await
            .unwrap();
        assert!(result.tool_calls[0].output.starts_with("Error: Unknown tool"));
    }

    #[tokio::test]
    async fn test_empty_reply_is_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![text("   ")]));
        let registry = ResponderRegistry::builtin();
        let result = generator(provider)
            .generate(registry.get(ResponderId::UniversityPoet), &[], "haiku")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        let responses = (0..MAX_ITERATIONS + 1)
            .map(|_| tool_call(COURSE_LOOKUP_TOOL, serde_json::json!({})))
            .collect();
        let provider = Arc::new(ScriptedProvider::new(responses));
        let registry = ResponderRegistry::builtin();
        let err = generator(provider)
            .generate(registry.get(ResponderId::CourseAdvisor), &[], "loop")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("maximum iterations"));
    }

    #[tokio::test]
    async fn test_responder_provider_override() {
        let default = Arc::new(ScriptedProvider::new(vec![]));
        let poet = Arc::new(ScriptedProvider::new(vec![text("Leaves fall\nOn the quad\nSilence")]));
        let registry = ResponderRegistry::builtin();
        let result = generator(default)
            .with_responder_provider(ResponderId::UniversityPoet, poet.clone())
            .generate(registry.get(ResponderId::UniversityPoet), &[], "poem")
            .await
            .unwrap();
        assert_eq!(result.text, "Leaves fall\nOn the quad\nSilence");
        assert_eq!(poet.seen_system.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_truncate_output_on_char_boundary() {
        let long = "é".repeat(MAX_TOOL_OUTPUT);
        let out = truncate_output(long);
        assert!(out.ends_with("[Output truncated]"));
        assert!(out.len() <= MAX_TOOL_OUTPUT + 20);
    }
}
