pub mod error;
pub mod config;
pub mod request;
pub mod prompt;
pub mod metrics;
pub mod embedding;
pub mod providers;
use serde::{Deserialize, Serialize};

/*

aimlapi: chat and embedding adapters for the AI/ML API
(https://api.aimlapi.com/v1), an OpenAI-compatible endpoint.

aimlapi/
├── Cargo.toml
├── src/
│   ├── lib.rs          # Re-exports and shared result types
│   ├── error.rs        # Error taxonomy
│   ├── config.rs       # Key, models, endpoint (env-style)
│   ├── request.rs      # Wire types
│   ├── prompt.rs       # Prompt assembly
│   ├── metrics.rs      # Latency/throughput measurement, measured stream
│   ├── providers/      # Chat providers
│   │   ├── mod.rs
│   │   └── aimlapi.rs
│   └── embedding/      # Embedding engines
│       ├── mod.rs
│       └── aimlapi.rs
└── tests/

*/

pub use config::AimlConfig;
pub use embedding::{AimlApiEmbedder, Embedder, EmbeddingVector};
pub use error::Error;
pub use metrics::{CompletionMetrics, MeasuredStream, StreamChunk};
pub use prompt::{Attachment, HistoryMessage, PromptArgs, PromptLimits};
pub use providers::{AimlApiLlm, MessageCompressor};
pub use request::{ChatMessage, ContentPart, MessageContent, Role};

/// Initialise the process-wide logger from `RUST_LOG` (default `info`).
/// Later calls do nothing.
pub fn init_logging()
{   let _ = env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).try_init();
}

/// Per-call completion options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions
{   pub temperature: f32
}

impl Default for ChatOptions
{   fn default() -> Self
    {   ChatOptions
        {   temperature: 0.7
        }
    }
}

/// Text of the first choice plus how long it took
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult
{   pub text_response: String
  , pub metrics: CompletionMetrics
}
