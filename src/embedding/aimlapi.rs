use std::collections::HashSet;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, error, trace};

use crate::config::AimlConfig;
use crate::embedding::{Embedder, EmbeddingVector};
use crate::error::Error;
use crate::request::{
  ApiErrorBody, EmbeddingData, EmbeddingRequest, EmbeddingResponse
};

/// Most texts sent in a single embedding request
pub const MAX_CONCURRENT_CHUNKS: usize = 500;

const FALLBACK_FAILURE_TYPE: &str = "failed_to_embed";

/// Split `items` into consecutive groups of at most `size`
pub fn to_chunks<T>(items: &[T], size: usize) -> std::slice::Chunks<'_, T>
{   items.chunks(size.max(1))
}

/// Why one batch request failed
#[derive(Debug, Clone, PartialEq, Eq)]
struct BatchFailure
{   kind: String
  , message: String
}

impl BatchFailure
{   fn transport(message: impl Into<String>) -> Self
    {   BatchFailure
        {   kind: FALLBACK_FAILURE_TYPE.to_string()
          , message: message.into()
        }
    }

    fn label(&self) -> String
    {   format!("[{}]: {}", self.kind, self.message)
    }
}

/// Embedding engine backed by the AI/ML API `/embeddings` endpoint
pub struct AimlApiEmbedder
{   config: AimlConfig
  , http_client: reqwest::Client
  , max_concurrent_chunks: usize
}

impl AimlApiEmbedder
{   pub fn new(config: AimlConfig) -> Result<Self, Error>
    {   config.validate()?;
        let http_client = config.http_client()?;
        debug!(
          "Creating AimlApiEmbedder for model: {}",
          config.embedding_model
        );
        Ok(AimlApiEmbedder
        {   config
          , http_client
          , max_concurrent_chunks: MAX_CONCURRENT_CHUNKS
        })
    }

    pub fn from_env() -> Result<Self, Error>
    {   Self::new(AimlConfig::from_env()?)
    }

    pub fn model(&self) -> &str
    {   &self.config.embedding_model
    }

    pub fn max_concurrent_chunks(&self) -> usize
    {   self.max_concurrent_chunks
    }

    pub fn embedding_max_chunk_length(&self) -> usize
    {   self.config.max_chunk_length
    }

    /// One request for one batch; failures are returned, never raised
    async fn embed_batch(
      &self
    , batch: &[String]
    ) -> Result<Vec<EmbeddingData>, BatchFailure>
    {   trace!("Embedding batch of {} texts", batch.len());

        let request = EmbeddingRequest
        {   model: &self.config.embedding_model
          , input: batch
        };

        let response = self.http_client
          .post(self.config.endpoint("embeddings"))
          .bearer_auth(&self.config.api_key)
          .json(&request)
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error: {}", e);
            BatchFailure::transport(e.to_string())
          })?;

        let status = response.status();
        if !status.is_success()
        {   let body = response.text().await.unwrap_or_default();
            let detail = ApiErrorBody::parse(&body).map(|b| b.error);
            let kind = detail.as_ref()
              .and_then(|d| d.code_string())
              .unwrap_or_else(|| status.as_u16().to_string());
            let message = detail
              .and_then(|d| d.message)
              .unwrap_or_else(|| {
                if body.trim().is_empty()
                {   status.to_string()
                } else
                {   body
                }
              });
            error!("Embedding API error [{}]: {}", kind, message);
            return Err(BatchFailure { kind, message });
        }

        let parsed: EmbeddingResponse
          = response.json().await.map_err(|e| {
            error!("Parse error: {}", e);
            BatchFailure::transport(e.to_string())
          })?;
        Ok(parsed.data)
    }
}

#[async_trait]
impl Embedder for AimlApiEmbedder
{   async fn embed_text_input(
      &self
    , text: &str
    ) -> Result<EmbeddingVector, Error>
    {   let input = [text.to_string()];
        let result = self.embed_chunks(&input).await?;
        Ok(result
          .and_then(|vectors| vectors.into_iter().next())
          .unwrap_or_default())
    }

    async fn embed_chunks(
      &self
    , texts: &[String]
    ) -> Result<Option<Vec<EmbeddingVector>>, Error>
    {   let requests = to_chunks(texts, self.max_concurrent_chunks)
          .map(|batch| self.embed_batch(batch));
        let results = join_all(requests).await;
        debug!(
          "Settled {} embedding requests for {} texts",
          results.len(), texts.len()
        );

        // Every batch has settled; any failure voids the whole call.
        let mut seen = HashSet::new();
        let mut failures = Vec::new();
        let mut data = Vec::with_capacity(texts.len());
        for result in results
        {   match result
            {   Ok(batch) => data.extend(batch)
              , Err(failure) => {
                  let label = failure.label();
                  if seen.insert(label.clone())
                  {   failures.push(label);
                  }
                }
            }
        }

        if !failures.is_empty()
        {   return Err(Error::EmbeddingFailed(failures.join(", ")));
        }
        if data.is_empty()
        {   return Ok(None);
        }

        Ok(data
          .into_iter()
          .map(|d| d.embedding)
          .collect::<Option<Vec<_>>>())
    }
}
