//! LLM provider layer for agent-rs
//!
//! This crate provides:
//!
//! - Message and completion types for text generation
//! - The [`LLMProvider`] trait and a backoff-retrying completion helper
//! - Error classification feeding the retry logic of `agent-core`
//! - The OpenAI provider, including fine-tuning jobs exposed as a
//!   `RemoteJobService` (behind the `openai` feature)

pub mod completion;
pub mod error;
pub mod messages;
pub mod provider;

// Re-export main types
pub use completion::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
pub use error::{LLMError, Result};
pub use messages::{Message, Role};
pub use provider::{LLMProvider, complete_with_backoff};

// Provider implementations (feature-gated)
#[cfg(feature = "openai")]
pub mod providers;
