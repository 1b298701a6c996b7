//! Configuration for the AI/ML API adapters

use log::debug;
use serde::{Deserialize, Serialize};

pub const AIML_API_BASE: &str
  = "https://api.aimlapi.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 1_000;

pub const API_KEY_VAR: &str = "AIML_API_KEY";
pub const CHAT_MODEL_VAR: &str = "AIML_MODEL_PREF";
pub const EMBEDDING_MODEL_VAR: &str = "EMBEDDING_MODEL_PREF";
pub const MAX_CHUNK_LENGTH_VAR: &str = "EMBEDDING_MODEL_MAX_CHUNK_LENGTH";

const MISSING_KEY_MESSAGE: &str = "No AI/ML API key was set.";

/// Provider configuration, read once at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AimlConfig
{   /// Bearer key for every request
    pub api_key: String
  , /// API base URL
    pub api_base: String
  , /// Preferred chat completion model
    pub chat_model: String
  , /// Preferred embedding model
    pub embedding_model: String
  , /// Longest text (in characters) callers should hand the embedder
    pub max_chunk_length: usize
  , /// Request timeout in seconds, transport default when unset
    pub timeout_secs: Option<u64>
}

impl AimlConfig
{   /// Create a configuration with default models and endpoint
    pub fn new(api_key: impl Into<String>) -> Self
    {   AimlConfig
        {   api_key: api_key.into()
          , api_base: AIML_API_BASE.to_string()
          , chat_model: DEFAULT_CHAT_MODEL.to_string()
          , embedding_model: DEFAULT_EMBEDDING_MODEL.to_string()
          , max_chunk_length: DEFAULT_MAX_CHUNK_LENGTH
          , timeout_secs: None
        }
    }

    /// Read the configuration from process environment
    pub fn from_env() -> Result<Self, crate::error::Error>
    {   Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F)
      -> Result<Self, crate::error::Error>
    where F: Fn(&str) -> Option<String>
    {   let present = |name: &str| {
          lookup(name).filter(|v| !v.trim().is_empty())
        };

        let api_key = present(API_KEY_VAR)
          .ok_or_else(|| {
            crate::error::Error::MissingApiKey(
              MISSING_KEY_MESSAGE.to_string()
            )
          })?;

        let mut config = AimlConfig::new(api_key);
        if let Some(model) = present(CHAT_MODEL_VAR)
        {   config.chat_model = model;
        }
        if let Some(model) = present(EMBEDDING_MODEL_VAR)
        {   config.embedding_model = model;
        }
        if let Some(length) = present(MAX_CHUNK_LENGTH_VAR)
          .and_then(|v| v.trim().parse::<usize>().ok())
          .filter(|length| *length > 0)
        {   config.max_chunk_length = length;
        }

        debug!(
          "Loaded config: chat={}, embedding={}",
          config.chat_model, config.embedding_model
        );
        Ok(config)
    }

    /// Override the API base (e.g. a proxy or a local mock)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self
    {   self.api_base = api_base.into();
        self
    }

    /// Override the chat model for this instance
    pub fn with_model_preference(
      mut self
    , model: impl Into<String>
    ) -> Self
    {   self.chat_model = model.into();
        self
    }

    pub fn with_embedding_model(
      mut self
    , model: impl Into<String>
    ) -> Self
    {   self.embedding_model = model.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self
    {   self.timeout_secs = Some(secs);
        self
    }

    /// Fail if the key is empty
    pub fn validate(&self) -> Result<(), crate::error::Error>
    {   if self.api_key.trim().is_empty()
        {   return Err(crate::error::Error::MissingApiKey(
              MISSING_KEY_MESSAGE.to_string()
            ));
        }
        if self.api_base.trim().is_empty()
        {   return Err(crate::error::Error::InvalidConfiguration(
              "api_base is empty".to_string()
            ));
        }
        Ok(())
    }

    /// Join a path onto the API base
    pub fn endpoint(&self, path: &str) -> String
    {   format!(
          "{}/{}",
          self.api_base.trim_end_matches('/'),
          path.trim_start_matches('/')
        )
    }

    /// Build the HTTP client shared by every request of one adapter
    pub(crate) fn http_client(&self)
      -> Result<reqwest::Client, crate::error::Error>
    {   let mut builder = reqwest::Client::builder();
        if let Some(secs) = self.timeout_secs
        {   builder = builder.timeout(
              std::time::Duration::from_secs(secs)
            );
        }
        builder.build().map_err(|e| {
          crate::error::Error::InvalidConfiguration(e.to_string())
        })
    }
}
