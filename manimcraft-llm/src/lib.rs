//! # manimcraft LLM
//!
//! The oracle side of manimcraft: a conversation model and the providers
//! that send it to a chat completion endpoint.
//!
//! ## Core Concepts
//! - **ChatMessage**: one turn (system, user, assistant or tool result)
//! - **ToolDefinition / ToolCall**: function calling in both directions
//! - **LlmProvider**: trait-based LLM communication (Anthropic, OpenAI-compatible)
//! - **Provider**: runtime-selected provider built from a `ProviderConfig`

pub mod error;
pub mod provider;

pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use provider::{
    retry::{complete_with_retry, RetryPolicy},
    AnthropicProvider, ChatMessage, CompletionRequest, CompletionResponse, FinishReason,
    ImageAttachment, LlmProvider, OpenAIProvider, Provider, ProviderConfig, ProviderError,
    ProviderType, Role, ToolCall, ToolChoice, ToolDefinition, Usage, UsageTracker,
};
