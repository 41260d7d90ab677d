//! LLM provider trait definition

use crate::{CompletionRequest, CompletionResponse, LLMError, Result};
use agent_core::{BackoffInvoker, RetryError, RetryPolicy};
use async_trait::async_trait;

/// Trait for LLM providers
///
/// A provider accepts a model identifier plus an ordered conversation and
/// returns generated text.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion from the LLM
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the provider name (e.g., "openai")
    fn name(&self) -> &str;
}

/// Run one completion through [`BackoffInvoker`]
///
/// Rate limiting and server errors are retried under `policy`; request and
/// authentication errors are returned at once.
pub async fn complete_with_backoff(
    provider: &dyn LLMProvider,
    request: &CompletionRequest,
    policy: &RetryPolicy,
) -> std::result::Result<CompletionResponse, RetryError<LLMError>> {
    let operation = format!("{} completion ({})", provider.name(), request.model);
    BackoffInvoker::new()
        .invoke(&operation, policy, || provider.complete(request.clone()))
        .await
}
