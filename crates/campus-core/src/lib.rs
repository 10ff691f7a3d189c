//! campus-core - routing and responders for the campus helpdesk
//!
//! This crate provides:
//! - Deterministic keyword and context router over four responders
//! - Responder registry with instructions and tool sets
//! - Course catalog and academic calendar lookups exposed as tools
//! - Chat-completions provider with a tool loop for reply generation
//! - Optional model-based routing with keyword fallback

pub mod conversation;
pub mod dispatcher;
pub mod format;
pub mod generation;
pub mod knowledge;
pub mod llm_router;
pub mod providers;
pub mod registry;
pub mod router;
pub mod tools;
pub mod types;

// Re-export main types for convenience
pub use dispatcher::{Dispatcher, FALLBACK_REPLY};
pub use generation::{Generation, LlmGenerator, ResponseGenerator};
pub use knowledge::{CalendarFacts, CourseCatalog, CourseLookup, KnowledgeBase};
pub use llm_router::LlmRouter;
pub use providers::{LlmProvider, OpenAiProvider};
pub use registry::{ProfileOverride, ResponderProfile, ResponderRegistry};
pub use router::{RouteReason, Router, RoutingDecision, RoutingTables};
pub use tools::{ToolExecutor, ToolHandler, ToolRegistry};
pub use types::{Reply, ResponderId, SenderKind, ToolInvocation, Turn, TOOL_SENDER, USER_SENDER};
