//! LLM Provider implementations

pub mod openai;

use crate::{Completion, CompletionOptions, Context, Model, Result};
use async_trait::async_trait;

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Request a single (non-streaming) completion
    async fn complete(
        &self,
        model: &Model,
        context: &Context,
        options: &CompletionOptions,
    ) -> Result<Completion>;
}
