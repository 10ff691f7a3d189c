//! Route a query, generate as the chosen responder, recover from failures

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::generation::ResponseGenerator;
use crate::llm_router::LlmRouter;
use crate::registry::ResponderRegistry;
use crate::router::{Router, RoutingDecision};
use crate::types::{Reply, ResponderId, Turn};

/// Reply used when no responder could produce one
pub const FALLBACK_REPLY: &str =
    "I'm here to help! How can I assist you with courses, schedules, or campus life?";

pub struct Dispatcher {
    router: Router,
    llm_router: Option<LlmRouter>,
    registry: ResponderRegistry,
    generator: Arc<dyn ResponseGenerator>,
}

impl Dispatcher {
    pub fn new(
        router: Router,
        registry: ResponderRegistry,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Self {
        Self {
            router,
            llm_router: None,
            registry,
            generator,
        }
    }

    /// Ask a model first; the keyword router stays as fallback
    pub fn with_llm_router(mut self, llm_router: LlmRouter) -> Self {
        self.llm_router = Some(llm_router);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn registry(&self) -> &ResponderRegistry {
        &self.registry
    }

    pub async fn route(&self, history: &[Turn], query: &str) -> RoutingDecision {
        match &self.llm_router {
            Some(llm) => llm.decide(history, query).await,
            None => self.router.decide(history, query),
        }
    }

    /// Produce a reply for `query` given the prior `history`.
    ///
    /// Always returns a reply. A failed generation is retried once with the
    /// keyword router's choice; if that fails too the Triage Agent answers with
    /// [`FALLBACK_REPLY`].
    pub async fn handle(&self, history: &[Turn], query: &str) -> Reply {
        let decision = self.route(history, query).await;
        info!(
            "Routing to {} ({:?})",
            decision.responder, decision.reason
        );

        let first_error = match self.generate(decision.responder, history, query).await {
            Ok(reply) => return reply,
            Err(e) => e,
        };
        warn!(
            "{} failed to respond: {:#}",
            decision.responder, first_error
        );

        let retry = self.router.classify(history, query);
        match self.generate(retry, history, query).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Retry with {} failed: {:#}", retry, e);
                Reply {
                    responder: ResponderId::TriageAgent,
                    text: FALLBACK_REPLY.to_string(),
                    tool_calls: Vec::new(),
                }
            }
        }
    }

    async fn generate(
        &self,
        responder: ResponderId,
        history: &[Turn],
        query: &str,
    ) -> anyhow::Result<Reply> {
        let profile = self.registry.get(responder);
        let generation = self.generator.generate(profile, history, query).await?;
        Ok(Reply {
            responder,
            text: generation.text,
            tool_calls: generation.tool_calls,
        })
    }
}
