//! LLM provider adapters

pub mod chat_completions;

use async_trait::async_trait;

use crate::request::{AttemptResult, GenerationRequest};

// Re-export for convenience
pub use chat_completions::ChatCompletionsAdapter;

/// One vendor's call convention behind a uniform attempt.
///
/// Implementations never retry and never raise: every outcome,
/// including transport errors, comes back as an `AttemptResult`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync
{   /// Provider name reported in logs, traces and responses
    fn name(&self) -> &str;

    /// Try one model with one credential.
    async fn attempt(
      &self
    , request: &GenerationRequest
    , model: &str
    , credential: &str
    ) -> AttemptResult;
}
