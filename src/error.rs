use thiserror::Error as ThisError;

/// Custom error type for AI/ML API operations
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error
{   /// API key is missing from the configuration
    #[error("{0}")]
    MissingApiKey(String)
  , /// Configured model is absent from the remote catalog
    #[error("AI/ML API chat: {0} is not valid for chat completion!")]
    InvalidModel(String)
  , /// HTTP request error
    #[error("HTTP error: {0}")]
    HttpError(String)
  , /// API returned a non-success response
    #[error("API error ({status}): {message}")]
    ApiError
    {   status: u16
      , message: String
    }
  , /// Failed to parse API response
    #[error("Parse error: {0}")]
    ParseError(String)
  , /// Streaming response broke off or carried garbage
    #[error("Stream error: {0}")]
    StreamError(String)
  , /// One or more embedding batches failed
    #[error("AimlApi Failed to embed: {0}")]
    EmbeddingFailed(String)
  , /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String)
  , /// Generic error
    #[error("Error: {0}")]
    Other(String)
}

impl From<String> for Error
{   fn from(s: String) -> Self
    {   Error::Other(s)
    }
}

impl From<&str> for Error
{   fn from(s: &str) -> Self
    {   Error::Other(s.to_string())
    }
}
