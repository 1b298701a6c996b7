use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use aimlapi::{
  AimlApiLlm, AimlConfig, ChatMessage, ChatOptions, Embedder
, EmbeddingVector, Error, HistoryMessage, MessageCompressor, PromptArgs
, PromptLimits, Role
};

/// Embedder that records what it was asked to embed
#[derive(Default)]
struct RecordingEmbedder
{   calls: Mutex<Vec<Vec<String>>>
}

#[async_trait]
impl Embedder for RecordingEmbedder
{   async fn embed_text_input(
      &self
    , text: &str
    ) -> Result<EmbeddingVector, Error>
    {   self.calls.lock().unwrap().push(vec![text.to_string()]);
        Ok(vec![1.0, 2.0])
    }

    async fn embed_chunks(
      &self
    , texts: &[String]
    ) -> Result<Option<Vec<EmbeddingVector>>, Error>
    {   self.calls.lock().unwrap().push(texts.to_vec());
        Ok(Some(texts.iter().map(|_| vec![0.5]).collect()))
    }
}

/// Keeps the system message and the final user turn only
struct KeepEnds;

#[async_trait]
impl MessageCompressor for KeepEnds
{   async fn compress(
      &self
    , limits: PromptLimits
    , messages: Vec<ChatMessage>
    , raw_history: &[HistoryMessage]
    ) -> Result<Vec<ChatMessage>, Error>
    {   assert!(limits.user > limits.history);
        assert_eq!(raw_history.len(), 2);
        let first = messages.first().cloned();
        let last = messages.last().cloned();
        Ok(first.into_iter().chain(last).collect())
    }
}

/// Refuses every prompt
struct AlwaysTooLong;

#[async_trait]
impl MessageCompressor for AlwaysTooLong
{   async fn compress(
      &self
    , _limits: PromptLimits
    , messages: Vec<ChatMessage>
    , _raw_history: &[HistoryMessage]
    ) -> Result<Vec<ChatMessage>, Error>
    {   Err(format!("{} messages do not fit", messages.len()).into())
    }
}

fn chat_completion_response() -> serde_json::Value
{   json!({
      "id": "chatcmpl-123",
      "object": "chat.completion",
      "model": "gpt-3.5-turbo",
      "choices": [{
        "index": 0,
        "message": {
          "role": "assistant",
          "content": "Hello! How can I help you today?"
        },
        "finish_reason": "stop"
      }],
      "usage": {
        "prompt_tokens": 9,
        "completion_tokens": 12,
        "total_tokens": 21
      }
    })
}

async fn mount_catalog(server: &MockServer, ids: &[&str])
{   let data: Vec<serde_json::Value>
      = ids.iter().map(|id| json!({ "id": id, "object": "model" })).collect();
    Mock::given(method("GET"))
      .and(path("/models"))
      .and(header("Authorization", "Bearer test-key"))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
      )
      .mount(server)
      .await;
}

fn provider(server: &MockServer) -> AimlApiLlm
{   aimlapi::init_logging();
    let config = AimlConfig::new("test-key")
      .with_api_base(server.uri());
    AimlApiLlm::new(config, Arc::new(RecordingEmbedder::default()))
      .unwrap()
}

fn messages() -> Vec<ChatMessage>
{   vec![ChatMessage::system("Be brief."), ChatMessage::user("Hello")]
}

#[test]
fn test_config_requires_api_key()
{   let err = AimlConfig::from_vars(|_| None);
    match err
    {   Err(Error::MissingApiKey(msg)) => {
          assert_eq!(msg, "No AI/ML API key was set.");
        }
      , other => panic!("unexpected: {:?}", other)
    }

    let blank = AimlConfig::from_vars(|name| {
      (name == "AIML_API_KEY").then(|| "   ".to_string())
    });
    assert!(blank.is_err());
}

#[test]
fn test_config_reads_preferences()
{   let config = AimlConfig::from_vars(|name| match name
    {   "AIML_API_KEY" => Some("k".to_string())
      , "AIML_MODEL_PREF" => Some("gpt-4o".to_string())
      , "EMBEDDING_MODEL_MAX_CHUNK_LENGTH" => Some("8192".to_string())
      , _ => None
    }).unwrap();

    assert_eq!(config.api_key, "k");
    assert_eq!(config.chat_model, "gpt-4o");
    assert_eq!(config.embedding_model, "text-embedding-ada-002");
    assert_eq!(config.max_chunk_length, 8192);
    assert_eq!(config.api_base, "https://api.aimlapi.com/v1");
    assert_eq!(
      config.endpoint("/chat/completions"),
      "https://api.aimlapi.com/v1/chat/completions"
    );
}

#[test]
fn test_provider_rejects_empty_key()
{   let result = AimlApiLlm::new(
      AimlConfig::new(""),
      Arc::new(RecordingEmbedder::default())
    );
    assert!(matches!(result, Err(Error::MissingApiKey(_))));
}

#[tokio::test]
async fn test_provider_defaults()
{   let server = MockServer::start().await;
    let llm = provider(&server);
    assert_eq!(llm.model(), "gpt-3.5-turbo");
    assert!(llm.streaming_enabled());
    assert_eq!(llm.prompt_window_limit(), 4096);
    assert_eq!(llm.default_temperature(), ChatOptions::default().temperature);
}

#[tokio::test]
async fn test_valid_model_lookup()
{   let server = MockServer::start().await;
    mount_catalog(&server, &["gpt-4o", "gpt-3.5-turbo"]).await;
    let llm = provider(&server);

    assert!(llm.is_valid_chat_completion_model("gpt-4o").await);
    assert!(!llm.is_valid_chat_completion_model("gpt-9").await);
    assert_eq!(
      assert_ok!(llm.get_available_models().await),
      vec!["gpt-4o".to_string(), "gpt-3.5-turbo".to_string()]
    );
}

#[tokio::test]
async fn test_catalog_failure_means_invalid_not_error()
{   let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/models"))
      .respond_with(ResponseTemplate::new(503).set_body_string("down"))
      .mount(&server)
      .await;
    let llm = provider(&server);

    assert!(!llm.is_valid_chat_completion_model("gpt-3.5-turbo").await);
    let err = assert_err!(llm.get_available_models().await);
    assert_eq!(
      err,
      Error::ApiError { status: 503, message: "down".to_string() }
    );
}

#[tokio::test]
async fn test_get_chat_completion_well_formed()
{   let server = MockServer::start().await;
    mount_catalog(&server, &["gpt-3.5-turbo"]).await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .and(header("Authorization", "Bearer test-key"))
      .and(body_partial_json(json!({
        "model": "gpt-3.5-turbo",
        "messages": [
          { "role": "system", "content": "Be brief." },
          { "role": "user", "content": "Hello" }
        ]
      })))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(chat_completion_response())
      )
      .expect(1)
      .mount(&server)
      .await;

    let llm = provider(&server);
    let result = assert_ok!(
      llm.get_chat_completion(&messages(), ChatOptions::default()).await
    ).expect("completion");

    assert_eq!(result.text_response, "Hello! How can I help you today?");
    let metrics = result.metrics;
    assert_eq!(metrics.prompt_tokens, 9);
    assert_eq!(metrics.completion_tokens, 12);
    assert_eq!(
      metrics.total_tokens,
      metrics.prompt_tokens + metrics.completion_tokens
    );
    assert!(metrics.duration > 0.0);
    assert!(metrics.output_tps > 0.0);

    let sent = server.received_requests().await.unwrap();
    let chat = sent.iter()
      .find(|r| r.url.path() == "/chat/completions")
      .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&chat.body).unwrap();
    assert!(body.get("stream").is_none());
    assert!(body["temperature"].as_f64().is_some());
}

#[tokio::test]
async fn test_get_chat_completion_without_choices_is_none()
{   let server = MockServer::start().await;
    mount_catalog(&server, &["gpt-3.5-turbo"]).await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "choices": [],
        "usage": { "prompt_tokens": 3, "completion_tokens": 0, "total_tokens": 3 }
      })))
      .mount(&server)
      .await;

    let llm = provider(&server);
    let result
      = llm.get_chat_completion(&messages(), ChatOptions::default()).await;
    assert_eq!(assert_ok!(result), None);
}

#[tokio::test]
async fn test_invalid_model_is_rejected_before_request()
{   let server = MockServer::start().await;
    mount_catalog(&server, &["gpt-4o"]).await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(chat_completion_response())
      )
      .expect(0)
      .mount(&server)
      .await;

    let llm = provider(&server);
    let err = assert_err!(
      llm.get_chat_completion(&messages(), ChatOptions::default()).await
    );
    assert_eq!(
      err.to_string(),
      "AI/ML API chat: gpt-3.5-turbo is not valid for chat completion!"
    );

    let err = assert_err!(
      llm.stream_get_chat_completion(&messages(), ChatOptions::default()).await
    );
    assert_eq!(err, Error::InvalidModel("gpt-3.5-turbo".to_string()));
}

#[tokio::test]
async fn test_api_error_surfaces()
{   let server = MockServer::start().await;
    mount_catalog(&server, &["gpt-3.5-turbo"]).await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(ResponseTemplate::new(401).set_body_json(json!({
        "error": {
          "message": "Incorrect API key provided",
          "type": "invalid_request_error",
          "code": "invalid_api_key"
        }
      })))
      .mount(&server)
      .await;

    let llm = provider(&server);
    let err = assert_err!(
      llm.get_chat_completion(&messages(), ChatOptions::default()).await
    );
    assert_eq!(
      err,
      Error::ApiError
      {   status: 401
        , message: "Incorrect API key provided".to_string()
      }
    );
}

#[tokio::test]
async fn test_stream_get_chat_completion()
{   let server = MockServer::start().await;
    mount_catalog(&server, &["gpt-3.5-turbo"]).await;

    let frames = [
      json!({ "choices": [{ "index": 0, "delta": { "role": "assistant" } }] }),
      json!({ "choices": [{ "index": 0, "delta": { "content": "Hello" } }] }),
      json!({ "choices": [{ "index": 0, "delta": { "content": " world" } }] }),
      json!({ "choices": [{ "index": 0, "delta": {}, "finish_reason": "stop" }] }),
    ];
    let mut body = String::new();
    for frame in frames.iter()
    {   body.push_str(&format!("data: {}\n\n", frame));
    }
    body.push_str("data: [DONE]\n\n");

    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .and(body_partial_json(json!({ "stream": true })))
      .respond_with(
        ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
      )
      .expect(1)
      .mount(&server)
      .await;

    let llm = provider(&server);
    let mut stream = assert_ok!(
      llm.stream_get_chat_completion(&messages(), ChatOptions::default()).await
    );

    let mut text = String::new();
    let mut finish = None;
    while let Some(chunk) = stream.next().await
    {   let chunk = assert_ok!(chunk);
        text.push_str(&chunk.text);
        if chunk.finish_reason.is_some()
        {   finish = chunk.finish_reason;
        }
    }

    assert_eq!(text, "Hello world");
    assert_eq!(finish.as_deref(), Some("stop"));
    assert!(stream.is_finished());

    let metrics = stream.end_measurement();
    assert_eq!(metrics.completion_tokens, 2);
    assert_eq!(metrics.total_tokens, 2);
    assert!(metrics.duration > 0.0);
}

#[tokio::test]
async fn test_stream_prefers_upstream_usage()
{   let server = MockServer::start().await;
    mount_catalog(&server, &["gpt-3.5-turbo"]).await;

    let body = format!(
      "data: {}\n\ndata: {}\n\ndata: [DONE]\n\n",
      json!({ "choices": [{ "index": 0, "delta": { "content": "Hi there" } }] }),
      json!({
        "choices": [],
        "usage": { "prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8 }
      })
    );
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(
        ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
      )
      .mount(&server)
      .await;

    let llm = provider(&server);
    let stream = assert_ok!(
      llm.stream_get_chat_completion(&messages(), ChatOptions::default()).await
    );
    let (text, metrics) = assert_ok!(stream.collect_text().await);

    assert_eq!(text, "Hi there");
    assert_eq!(metrics.prompt_tokens, 5);
    assert_eq!(metrics.completion_tokens, 3);
    assert_eq!(metrics.total_tokens, 8);
}

#[tokio::test]
async fn test_embedding_calls_are_delegated()
{   let server = MockServer::start().await;
    let embedder = Arc::new(RecordingEmbedder::default());
    let llm = AimlApiLlm::new(
      AimlConfig::new("test-key").with_api_base(server.uri()),
      embedder.clone()
    ).unwrap();

    let single = assert_ok!(llm.embed_text_input("one").await);
    assert_eq!(single, vec![1.0, 2.0]);

    let texts = vec!["a".to_string(), "b".to_string()];
    let many = assert_ok!(llm.embed_chunks(&texts).await);
    assert_eq!(many, Some(vec![vec![0.5], vec![0.5]]));

    let calls = embedder.calls.lock().unwrap().clone();
    assert_eq!(calls, vec![vec!["one".to_string()], texts]);
}

#[tokio::test]
async fn test_compress_messages_delegates_to_compressor()
{   let server = MockServer::start().await;
    let llm = provider(&server);
    let history = vec![
      HistoryMessage::new(Role::User, "old question")
    , HistoryMessage::new(Role::Assistant, "old answer")
    ];
    let args = PromptArgs
    {   system_prompt: "sys".to_string()
      , context_texts: vec!["ctx".to_string()]
      , chat_history: history.clone()
      , user_prompt: "new question".to_string()
      , ..Default::default()
    };

    let compressed = assert_ok!(
      llm.compress_messages(&args, &history, &KeepEnds).await
    );
    assert_eq!(compressed.len(), 2);
    assert_eq!(compressed[0].role, Role::System);
    assert!(compressed[0].content.text().contains("[CONTEXT 0]:\nctx\n"));
    assert_eq!(compressed[1].content.text(), "new question");
}

#[tokio::test]
async fn test_compressor_errors_propagate()
{   let server = MockServer::start().await;
    let llm = provider(&server);
    let args = PromptArgs
    {   user_prompt: "q".to_string()
      , ..Default::default()
    };

    let err = assert_err!(
      llm.compress_messages(&args, &[], &AlwaysTooLong).await
    );
    assert_eq!(err, Error::Other("2 messages do not fit".to_string()));
    assert_eq!(Error::from("x"), Error::Other("x".to_string()));
}
