//! LLM provider abstraction
//!
//! Generation and the optional routing override talk to models through
//! [`LlmProvider`]. [`OpenAiProvider`] covers OpenAI and any endpoint that speaks
//! the chat-completions format.

pub mod openai;
pub mod types;

pub use openai::OpenAiProvider;
pub use types::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponse, ChatResponseBlock, ChatRole,
    ChatUsage, LlmProvider, StopReason, ToolDefinition,
};
