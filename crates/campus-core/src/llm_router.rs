//! Optional model-based routing layered over the keyword router
//!
//! The model is asked for a bare responder name. Anything it says that is not
//! recognisably a name, and any provider error, falls back to [`Router`].

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::conversation::routing_messages;
use crate::providers::LlmProvider;
use crate::router::{RouteReason, Router, RoutingDecision};
use crate::types::{ResponderId, Turn};

/// Replies longer than this are explanations, not names
const MAX_NAME_REPLY: usize = 50;

const ROUTER_INSTRUCTIONS: &str = "You decide which assistant should handle the user's latest \
message. Reply with EXACTLY one of these names and nothing else:\n\
Course Advisor\n\
University Poet\n\
Scheduling Assistant\n\
Triage Agent\n\n\
Do not answer the question, give advice, add explanations, or use quotes or brackets.\n\n\
Rules:\n\
- Courses, classes, majors, degrees, credits, prerequisites, electives, programming, \
statistics, data science, machine learning -> Course Advisor\n\
- Haiku, poems, poetry, verse, creative writing about campus life -> University Poet\n\
- Schedules, exam dates, class times, deadlines, semester dates, registration -> \
Scheduling Assistant\n\
- Greetings, unclear or general requests -> Triage Agent\n\
- Short follow-ups ('tell me more', 'what about it') go to whichever assistant answered \
last, shown as [Name] in the history.";

/// Model-first router with the keyword [`Router`] as fallback
pub struct LlmRouter {
    provider: Arc<dyn LlmProvider>,
    fallback: Router,
    timeout: Duration,
}

impl LlmRouter {
    pub fn new(provider: Arc<dyn LlmProvider>, fallback: Router) -> Self {
        Self {
            provider,
            fallback,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn decide(&self, history: &[Turn], query: &str) -> RoutingDecision {
        let messages = routing_messages(history, query);
        let reply = tokio::time::timeout(
            self.timeout,
            self.provider.chat(&messages, &[], ROUTER_INSTRUCTIONS),
        )
        .await;

        let raw = match reply {
            Ok(Ok(response)) => response.text(),
            Ok(Err(e)) => {
                warn!("Routing model failed, using keyword router: {}", e);
                return self.fallback.decide(history, query);
            }
            Err(_) => {
                warn!(
                    "Routing model timed out after {}s, using keyword router",
                    self.timeout.as_secs()
                );
                return self.fallback.decide(history, query);
            }
        };

        match parse_routing_reply(&raw) {
            Some(responder) => {
                info!("Routing model chose {}", responder);
                RoutingDecision {
                    responder,
                    reason: RouteReason::Llm,
                }
            }
            None => {
                debug!("Unusable routing reply {:?}, using keyword router", raw);
                self.fallback.decide(history, query)
            }
        }
    }
}

/// Extract a responder name from a routing model reply
pub fn parse_routing_reply(raw: &str) -> Option<ResponderId> {
    let cleaned = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim_matches(|c| c == '[' || c == ']')
        .trim();

    if let Some(id) = ResponderId::from_name(cleaned) {
        return Some(id);
    }

    if cleaned.chars().count() > MAX_NAME_REPLY {
        return ResponderId::ALL
            .into_iter()
            .find(|id| cleaned.starts_with(id.as_str()));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        ChatMessage, ChatResponse, ChatResponseBlock, ChatUsage, StopReason, ToolDefinition,
    };
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;

    struct FixedReply(Option<String>);

    #[async_trait]
    impl LlmProvider for FixedReply {
        fn provider_name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed"
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            tools: &[ToolDefinition],
            _system: &str,
        ) -> Result<ChatResponse> {
            assert!(tools.is_empty());
            let text = self.0.clone().ok_or_else(|| anyhow!("provider down"))?;
            Ok(ChatResponse {
                blocks: vec![ChatResponseBlock::Text { text }],
                stop_reason: StopReason::EndTurn,
                usage: ChatUsage::default(),
            })
        }
    }

    fn router(reply: Option<&str>) -> LlmRouter {
        LlmRouter::new(
            Arc::new(FixedReply(reply.map(str::to_string))),
            Router::default(),
        )
    }

    #[test]
    fn test_parse_exact_and_decorated_names() {
        assert_eq!(
            parse_routing_reply("Course Advisor"),
            Some(ResponderId::CourseAdvisor)
        );
        assert_eq!(
            parse_routing_reply("  \"University Poet\"\n"),
            Some(ResponderId::UniversityPoet)
        );
        assert_eq!(
            parse_routing_reply("[Scheduling Assistant]"),
            Some(ResponderId::SchedulingAssistant)
        );
    }

    #[test]
    fn test_parse_long_reply_needs_leading_name() {
        assert_eq!(
            parse_routing_reply(
                "Course Advisor should take this because the user asks about electives."
            ),
            Some(ResponderId::CourseAdvisor)
        );
        assert_eq!(
            parse_routing_reply(
                "I think this is best handled by the Scheduling Assistant, given the dates."
            ),
            None
        );
    }

    #[test]
    fn test_parse_short_garbage() {
        assert_eq!(parse_routing_reply("Router Agent"), None);
        assert_eq!(parse_routing_reply("course advisor"), None);
        assert_eq!(parse_routing_reply(""), None);
    }

    #[tokio::test]
    async fn test_model_choice_wins() {
        let decision = router(Some("Triage Agent")).decide(&[], "haiku please").await;
        assert_eq!(decision.responder, ResponderId::TriageAgent);
        assert_eq!(decision.reason, RouteReason::Llm);
    }

    #[tokio::test]
    async fn test_unusable_reply_falls_back() {
        let decision = router(Some("Dean of Students")).decide(&[], "haiku please").await;
        assert_eq!(decision.responder, ResponderId::UniversityPoet);
        assert!(matches!(decision.reason, RouteReason::Keyword { .. }));
    }

    #[tokio::test]
    async fn test_provider_error_falls_back() {
        let decision = router(None).decide(&[], "When is the final exam?").await;
        assert_eq!(decision.responder, ResponderId::SchedulingAssistant);
    }
}
