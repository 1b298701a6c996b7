//! Wire types for the chat/embedding protocol spoken by the AI/ML API

use serde::{Deserialize, Serialize};

// ===== Message Types =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role
{   System
  , User
  , Assistant
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl
{   pub url: String
  , pub detail: String
}

/// One segment of a multi-part message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart
{   Text
    {   text: String
    }
  , ImageUrl
    {   image_url: ImageUrl
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent
{   Text(String)
  , Parts(Vec<ContentPart>)
}

impl MessageContent
{   /// Plain text, or the concatenated text parts
    pub fn text(&self) -> String
    {   match self
        {   MessageContent::Text(text) => text.clone()
          , MessageContent::Parts(parts) => parts
              .iter()
              .filter_map(|p| match p
              {   ContentPart::Text { text } => Some(text.as_str())
                , ContentPart::ImageUrl { .. } => None
              })
              .collect::<Vec<_>>()
              .join("")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: Role
  , pub content: MessageContent
}

impl ChatMessage
{   pub fn system(content: impl Into<String>) -> Self
    {   ChatMessage
        {   role: Role::System
          , content: MessageContent::Text(content.into())
        }
    }

    pub fn user(content: impl Into<String>) -> Self
    {   ChatMessage
        {   role: Role::User
          , content: MessageContent::Text(content.into())
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self
    {   ChatMessage
        {   role: Role::Assistant
          , content: MessageContent::Text(content.into())
        }
    }
}

// ===== Chat Completion =====

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest<'a>
{   pub model: &'a str
  , pub messages: &'a [ChatMessage]
  , pub temperature: f32
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse
{   #[serde(default)]
    pub choices: Vec<Choice>
  , #[serde(default)]
    pub usage: Option<Usage>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: AssistantMessage
  , #[serde(default)]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage
{   #[serde(default)]
    pub content: Option<String>
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage
{   #[serde(default)]
    pub prompt_tokens: Option<u64>
  , #[serde(default)]
    pub completion_tokens: Option<u64>
  , #[serde(default)]
    pub total_tokens: Option<u64>
}

/// One `data:` frame of a streamed completion
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk
{   #[serde(default)]
    pub choices: Vec<ChunkChoice>
  , #[serde(default)]
    pub usage: Option<Usage>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice
{   #[serde(default)]
    pub delta: Delta
  , #[serde(default)]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta
{   #[serde(default)]
    pub content: Option<String>
}

// ===== Model Catalog =====

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsResponse
{   #[serde(default)]
    pub data: Vec<ModelData>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelData
{   pub id: String
  , #[serde(default)]
    pub owned_by: Option<String>
}

// ===== Embeddings =====

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRequest<'a>
{   pub model: &'a str
  , pub input: &'a [String]
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingResponse
{   #[serde(default)]
    pub data: Vec<EmbeddingData>
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingData
{   #[serde(default)]
    pub embedding: Option<Vec<f32>>
}

// ===== Errors =====

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody
{   pub error: ApiErrorDetail
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail
{   /// Upstream sends either a string code or a number
    #[serde(default)]
    pub code: Option<serde_json::Value>
  , #[serde(default)]
    pub message: Option<String>
}

impl ApiErrorDetail
{   pub fn code_string(&self) -> Option<String>
    {   match self.code.as_ref()?
        {   serde_json::Value::Null => None
          , serde_json::Value::String(s) => Some(s.clone())
          , other => Some(other.to_string())
        }
    }
}

impl ApiErrorBody
{   pub fn parse(body: &str) -> Option<Self>
    {   serde_json::from_str(body).ok()
    }
}
