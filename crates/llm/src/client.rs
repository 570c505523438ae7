use async_trait::async_trait;

use crate::error::LlmError;

/// A completed model reply.
#[derive(Debug, Clone)]
pub struct LlmReply {
    /// The reply text.
    pub content: String,
    /// Model that produced the reply.
    pub model: String,
    /// Total tokens consumed, when the platform reports usage.
    pub tokens_used: Option<u32>,
}

/// Trait for submitting prompts to a language model.
///
/// Implementations must be `Send + Sync` to be shared across worker tasks.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Submit a system + user prompt pair and return the reply text.
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
    -> Result<LlmReply, LlmError>;
}
