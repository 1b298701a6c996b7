//! Prompt assembly: system prompt plus retrieved context, history, user turn

use serde::{Deserialize, Serialize};

use crate::request::{ChatMessage, ContentPart, ImageUrl, MessageContent, Role};

const IMAGE_DETAIL: &str = "high";

/// An image handed in alongside a user turn, usually a data URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment
{   pub content_string: String
}

/// A prior turn as stored by the caller, before attachments are expanded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage
{   pub role: Role
  , pub content: String
  , #[serde(default)]
    pub attachments: Vec<Attachment>
}

impl HistoryMessage
{   pub fn new(role: Role, content: impl Into<String>) -> Self
    {   HistoryMessage
        {   role
          , content: content.into()
          , attachments: vec![]
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptArgs
{   #[serde(default)]
    pub system_prompt: String
  , #[serde(default)]
    pub context_texts: Vec<String>
  , #[serde(default)]
    pub chat_history: Vec<HistoryMessage>
  , #[serde(default)]
    pub user_prompt: String
  , #[serde(default)]
    pub attachments: Vec<Attachment>
}

/// Token budget split of a model's prompt window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromptLimits
{   pub history: f64
  , pub system: f64
  , pub user: f64
}

impl PromptLimits
{   pub fn for_window(window: usize) -> Self
    {   let window = window as f64;
        PromptLimits
        {   history: window * 0.15
          , system: window * 0.15
          , user: window * 0.7
        }
    }
}

/// Render retrieved passages as labelled blocks; empty when there are none
pub fn append_context(context_texts: &[String]) -> String
{   if context_texts.is_empty()
    {   return String::new();
    }

    let blocks: String = context_texts
      .iter()
      .enumerate()
      .map(|(i, text)| {
        format!("[CONTEXT {i}]:\n{text}\n[END CONTEXT {i}]\n\n")
      })
      .collect();
    format!("\nContext:\n{blocks}")
}

/// Text alone, or text followed by one image part per attachment
pub fn generate_content(
  user_prompt: &str
, attachments: &[Attachment]
) -> MessageContent
{   if attachments.is_empty()
    {   return MessageContent::Text(user_prompt.to_string());
    }

    let mut parts = Vec::with_capacity(attachments.len() + 1);
    parts.push(ContentPart::Text
    {   text: user_prompt.to_string()
    });
    for attachment in attachments
    {   parts.push(ContentPart::ImageUrl
        {   image_url: ImageUrl
            {   url: attachment.content_string.clone()
              , detail: IMAGE_DETAIL.to_string()
            }
        });
    }
    MessageContent::Parts(parts)
}

pub fn format_chat_history(
  history: &[HistoryMessage]
) -> Vec<ChatMessage>
{   history
      .iter()
      .map(|m| ChatMessage
      {   role: m.role
        , content: generate_content(&m.content, &m.attachments)
      })
      .collect()
}

/// System message first, then history, then the user turn
pub fn construct_prompt(args: &PromptArgs) -> Vec<ChatMessage>
{   let system = ChatMessage::system(format!(
      "{}{}",
      args.system_prompt,
      append_context(&args.context_texts)
    ));

    let mut messages
      = Vec::with_capacity(args.chat_history.len() + 2);
    messages.push(system);
    // Stray system turns in history would break the single-system-message shape.
    messages.extend(
      format_chat_history(&args.chat_history)
        .into_iter()
        .filter(|m| m.role != Role::System)
    );
    messages.push(ChatMessage
    {   role: Role::User
      , content: generate_content(&args.user_prompt, &args.attachments)
    });
    messages
}
