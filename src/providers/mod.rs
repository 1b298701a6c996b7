//! LLM provider implementations

pub mod aimlapi;

use async_trait::async_trait;

// Re-export for convenience
pub use aimlapi::AimlApiLlm;

/// History-compression helper a provider hands its prompt to when the
/// conversation no longer fits the prompt window.
#[async_trait]
pub trait MessageCompressor: Send + Sync
{   async fn compress(
      &self
    , limits: crate::prompt::PromptLimits
    , messages: Vec<crate::request::ChatMessage>
    , raw_history: &[crate::prompt::HistoryMessage]
    ) -> Result<Vec<crate::request::ChatMessage>, crate::error::Error>;
}
