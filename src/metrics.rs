//! Latency and throughput measurement around completion calls

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use eventsource_stream::{Event, Eventsource};
use futures::{ready, Stream, StreamExt};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::request::{ChatCompletionChunk, Usage};

const DONE_MARKER: &str = "[DONE]";

type EventStream
  = Pin<Box<dyn Stream<Item = Result<Event, Error>> + Send>>;

/// Token accounting and timing for one completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMetrics
{   pub prompt_tokens: u64
  , pub completion_tokens: u64
  , pub total_tokens: u64
  , /// Output tokens per second of wall-clock time
    pub output_tps: f64
  , /// Seconds
    pub duration: f64
}

impl CompletionMetrics
{   pub fn from_counts(
      prompt_tokens: u64
    , completion_tokens: u64
    , total_tokens: Option<u64>
    , duration: f64
    ) -> Self
    {   let output_tps = if duration > 0.0
        {   completion_tokens as f64 / duration
        } else
        {   0.0
        };
        CompletionMetrics
        {   prompt_tokens
          , completion_tokens
          , total_tokens: total_tokens
              .unwrap_or(prompt_tokens + completion_tokens)
          , output_tps
          , duration
        }
    }

    pub fn from_usage(usage: Option<&Usage>, duration: f64) -> Self
    {   let usage = usage.cloned().unwrap_or_default();
        Self::from_counts(
          usage.prompt_tokens.unwrap_or(0)
        , usage.completion_tokens.unwrap_or(0)
        , usage.total_tokens
        , duration
        )
    }
}

/// Await `fut`, returning its output and the elapsed seconds
pub async fn measure_async<F, T>(fut: F) -> (T, f64)
where F: Future<Output = T>
{   let started = Instant::now();
    let output = fut.await;
    let duration = started.elapsed().as_secs_f64();
    trace!("Measured call took {:.3}s", duration);
    (output, duration)
}

/// One content delta of a streamed completion
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk
{   pub text: String
  , pub finish_reason: Option<String>
}

/// Streamed completion that keeps timing as deltas arrive.
///
/// Each non-empty delta counts as one output token until the upstream
/// sends its own `usage`, which then wins.
pub struct MeasuredStream
{   events: EventStream
  , started: Instant
  , finished_at: Option<Instant>
  , completion_tokens: u64
  , upstream_usage: Option<Usage>
}

impl MeasuredStream
{   /// Wrap an SSE response body
    pub fn from_response(
      response: reqwest::Response
    , started: Instant
    ) -> Self
    {   Self::from_byte_stream(response.bytes_stream(), started)
    }

    /// Wrap any SSE byte stream
    pub fn from_byte_stream<S, B, E>(bytes: S, started: Instant) -> Self
    where S: Stream<Item = Result<B, E>> + Send + 'static
        , B: AsRef<[u8]> + 'static
        , E: std::fmt::Display + 'static
    {   let events = bytes
          .eventsource()
          .map(|event| {
            event.map_err(|e| Error::StreamError(e.to_string()))
          });
        MeasuredStream
        {   events: Box::pin(events)
          , started
          , finished_at: None
          , completion_tokens: 0
          , upstream_usage: None
        }
    }

    pub fn is_finished(&self) -> bool
    {   self.finished_at.is_some()
    }

    /// Metrics so far; duration keeps growing until the stream ends
    pub fn metrics(&self) -> CompletionMetrics
    {   let end = self.finished_at.unwrap_or_else(Instant::now);
        let duration
          = end.duration_since(self.started).as_secs_f64();

        match self.upstream_usage.as_ref()
        {   Some(usage) => CompletionMetrics::from_counts(
              usage.prompt_tokens.unwrap_or(0)
            , usage.completion_tokens.unwrap_or(self.completion_tokens)
            , usage.total_tokens
            , duration
            )
          , None => CompletionMetrics::from_counts(
              0
            , self.completion_tokens
            , None
            , duration
            )
        }
    }

    /// Stop the clock, e.g. when the consumer abandons the stream early
    pub fn end_measurement(&mut self) -> CompletionMetrics
    {   self.finish();
        self.metrics()
    }

    /// Drain the stream into its full text
    pub async fn collect_text(
      mut self
    ) -> Result<(String, CompletionMetrics), Error>
    {   let mut text = String::new();
        while let Some(chunk) = self.next().await
        {   text.push_str(&chunk?.text);
        }
        Ok((text, self.end_measurement()))
    }

    fn finish(&mut self)
    {   if self.finished_at.is_none()
        {   self.finished_at = Some(Instant::now());
            debug!(
              "Stream finished after {} output tokens",
              self.completion_tokens
            );
        }
    }
}

impl fmt::Debug for MeasuredStream
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.debug_struct("MeasuredStream")
          .field("completion_tokens", &self.completion_tokens)
          .field("finished", &self.is_finished())
          .finish_non_exhaustive()
    }
}

impl Stream for MeasuredStream
{   type Item = Result<StreamChunk, Error>;

    fn poll_next(
      self: Pin<&mut Self>
    , cx: &mut Context<'_>
    ) -> Poll<Option<Self::Item>>
    {   let this = self.get_mut();
        if this.finished_at.is_some()
        {   return Poll::Ready(None);
        }

        loop
        {   let event = match ready!(this.events.poll_next_unpin(cx))
            {   Some(Ok(event)) => event
              , Some(Err(e)) => {
                  this.finish();
                  return Poll::Ready(Some(Err(e)));
                }
              , None => {
                  this.finish();
                  return Poll::Ready(None);
                }
            };

            let data = event.data.trim();
            if data.is_empty()
            {   continue;
            }
            if data == DONE_MARKER
            {   this.finish();
                return Poll::Ready(None);
            }

            let chunk: ChatCompletionChunk
              = match serde_json::from_str(data)
              {   Ok(chunk) => chunk
                , Err(e) => {
                    this.finish();
                    return Poll::Ready(Some(Err(
                      Error::ParseError(e.to_string())
                    )));
                  }
              };

            if chunk.usage.is_some()
            {   this.upstream_usage = chunk.usage;
            }

            let Some(choice) = chunk.choices.into_iter().next()
            else
            {   continue;
            };
            let text = choice.delta.content.unwrap_or_default();
            if text.is_empty() && choice.finish_reason.is_none()
            {   continue;
            }
            if !text.is_empty()
            {   this.completion_tokens += 1;
            }

            return Poll::Ready(Some(Ok(StreamChunk
            {   text
              , finish_reason: choice.finish_reason
            })));
        }
    }
}
