use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, trace};

use crate::config::AimlConfig;
use crate::embedding::{Embedder, EmbeddingVector};
use crate::error::Error;
use crate::metrics::{measure_async, CompletionMetrics, MeasuredStream};
use crate::prompt::{HistoryMessage, PromptArgs, PromptLimits};
use crate::providers::MessageCompressor;
use crate::request::{
  ApiErrorBody, ChatCompletionRequest, ChatCompletionResponse
, ChatMessage, ModelsResponse
};
use crate::{ChatOptions, CompletionResult};

const PROMPT_WINDOW_LIMIT: usize = 4096;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Chat provider for the AI/ML API
pub struct AimlApiLlm
{   config: AimlConfig
  , http_client: reqwest::Client
  , embedder: Arc<dyn Embedder>
  , limits: PromptLimits
}

impl AimlApiLlm
{   /// Create a provider; `embedder` serves every embedding call
    pub fn new(
      config: AimlConfig
    , embedder: Arc<dyn Embedder>
    ) -> Result<Self, Error>
    {   config.validate()?;
        let http_client = config.http_client()?;
        let provider = AimlApiLlm
        {   config
          , http_client
          , embedder
          , limits: PromptLimits::for_window(PROMPT_WINDOW_LIMIT)
        };
        provider.log(&format!(
          "Initialized {} with context window {}",
          provider.model(),
          provider.prompt_window_limit()
        ));
        Ok(provider)
    }

    pub fn from_env(embedder: Arc<dyn Embedder>) -> Result<Self, Error>
    {   Self::new(AimlConfig::from_env()?, embedder)
    }

    fn log(&self, text: &str)
    {   info!("[AimlApiLlm] {}", text);
    }

    pub fn model(&self) -> &str
    {   &self.config.chat_model
    }

    pub fn streaming_enabled(&self) -> bool
    {   true
    }

    pub fn prompt_window_limit(&self) -> usize
    {   PROMPT_WINDOW_LIMIT
    }

    pub fn limits(&self) -> PromptLimits
    {   self.limits
    }

    pub fn default_temperature(&self) -> f32
    {   DEFAULT_TEMPERATURE
    }

    pub fn construct_prompt(&self, args: &PromptArgs) -> Vec<ChatMessage>
    {   crate::prompt::construct_prompt(args)
    }

    /// Ids of every model in the remote catalog
    pub async fn get_available_models(&self) -> Result<Vec<String>, Error>
    {   debug!("Fetching model catalog");

        let response = self.http_client
          .get(self.config.endpoint("models"))
          .bearer_auth(&self.config.api_key)
          .send()
          .await
          .map_err(|e| {
            error!("Failed to fetch models: {}", e);
            Error::HttpError(e.to_string())
          })?;

        if !response.status().is_success()
        {   return Err(api_error(response).await);
        }

        let models: ModelsResponse
          = response.json().await.map_err(|e| {
            error!("Parse error: {}", e);
            Error::ParseError(e.to_string())
          })?;

        let model_names: Vec<String>
          = models.data.into_iter().map(|m| m.id).collect();
        debug!("Retrieved {} models", model_names.len());
        Ok(model_names)
    }

    /// Whether `model_name` is in the catalog; an unreachable catalog counts as empty
    pub async fn is_valid_chat_completion_model(
      &self
    , model_name: &str
    ) -> bool
    {   match self.get_available_models().await
        {   Ok(models) => models.iter().any(|m| m == model_name)
          , Err(e) => {
              debug!("Model catalog unavailable, treating as empty: {}", e);
              false
            }
        }
    }

    async fn ensure_valid_model(&self) -> Result<(), Error>
    {   if self.is_valid_chat_completion_model(self.model()).await
        {   Ok(())
        } else
        {   error!("Model not in catalog: {}", self.model());
            Err(Error::InvalidModel(self.model().to_string()))
        }
    }

    /// Single non-streaming completion; `None` when the reply has no choices
    pub async fn get_chat_completion(
      &self
    , messages: &[ChatMessage]
    , options: ChatOptions
    ) -> Result<Option<CompletionResult>, Error>
    {   self.ensure_valid_model().await?;

        let request = ChatCompletionRequest
        {   model: self.model()
          , messages
          , temperature: options.temperature
          , stream: None
        };
        trace!("Chat request: {:?}", request);

        let (response, duration)
          = measure_async(self.send_chat(&request)).await;
        let response = response?;

        let Some(choice) = response.choices.into_iter().next()
        else
        {   debug!("Completion carried no choices");
            return Ok(None);
        };

        Ok(Some(CompletionResult
        {   text_response: choice.message.content.unwrap_or_default()
          , metrics: CompletionMetrics::from_usage(
              response.usage.as_ref()
            , duration
            )
        }))
    }

    /// Streaming completion; the caller drains the returned stream
    pub async fn stream_get_chat_completion(
      &self
    , messages: &[ChatMessage]
    , options: ChatOptions
    ) -> Result<MeasuredStream, Error>
    {   self.ensure_valid_model().await?;

        let request = ChatCompletionRequest
        {   model: self.model()
          , messages
          , temperature: options.temperature
          , stream: Some(true)
        };
        trace!("Streaming chat request: {:?}", request);

        let started = Instant::now();
        let response = self.post_chat(&request).await?;
        Ok(MeasuredStream::from_response(response, started))
    }

    pub async fn embed_text_input(
      &self
    , text: &str
    ) -> Result<EmbeddingVector, Error>
    {   self.embedder.embed_text_input(text).await
    }

    pub async fn embed_chunks(
      &self
    , texts: &[String]
    ) -> Result<Option<Vec<EmbeddingVector>>, Error>
    {   self.embedder.embed_chunks(texts).await
    }

    /// Build the prompt and let `compressor` fit it into the window
    pub async fn compress_messages(
      &self
    , args: &PromptArgs
    , raw_history: &[HistoryMessage]
    , compressor: &dyn MessageCompressor
    ) -> Result<Vec<ChatMessage>, Error>
    {   let messages = self.construct_prompt(args);
        compressor.compress(self.limits, messages, raw_history).await
    }

    async fn post_chat(
      &self
    , request: &ChatCompletionRequest<'_>
    ) -> Result<reqwest::Response, Error>
    {   let response = self.http_client
          .post(self.config.endpoint("chat/completions"))
          .bearer_auth(&self.config.api_key)
          .json(request)
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error: {}", e);
            Error::HttpError(e.to_string())
          })?;

        let status = response.status();
        trace!("Chat response status: {}", status);
        if !status.is_success()
        {   return Err(api_error(response).await);
        }
        Ok(response)
    }

    async fn send_chat(
      &self
    , request: &ChatCompletionRequest<'_>
    ) -> Result<ChatCompletionResponse, Error>
    {   self.post_chat(request)
          .await?
          .json()
          .await
          .map_err(|e| {
            error!("Parse error: {}", e);
            Error::ParseError(e.to_string())
          })
    }
}

/// Turn a non-success response into `Error::ApiError`
async fn api_error(response: reqwest::Response) -> Error
{   let status = response.status().as_u16();
    let body = response.text().await
      .unwrap_or_else(|_| "Unknown error".to_string());
    let message = ApiErrorBody::parse(&body)
      .and_then(|b| b.error.message)
      .unwrap_or(body);
    error!("AI/ML API error ({}): {}", status, message);
    Error::ApiError { status, message }
}
