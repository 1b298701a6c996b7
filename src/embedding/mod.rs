//! Embedding engines

pub mod aimlapi;

use async_trait::async_trait;

pub use aimlapi::AimlApiEmbedder;

/// One vector per input text
pub type EmbeddingVector = Vec<f32>;

/// Capability a chat provider forwards its embedding calls to
#[async_trait]
pub trait Embedder: Send + Sync
{   /// Embed one text; empty vector when the engine returns nothing
    async fn embed_text_input(
      &self
    , text: &str
    ) -> Result<EmbeddingVector, crate::error::Error>;

    /// Embed many texts, preserving input order.
    /// `None` means the engine answered with unusable data.
    async fn embed_chunks(
      &self
    , texts: &[String]
    ) -> Result<Option<Vec<EmbeddingVector>>, crate::error::Error>;
}
