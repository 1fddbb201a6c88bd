//! OpenAI-compatible streaming chat completions client.
//!
//! Speaks the `/chat/completions` wire format with `stream: true` and
//! decodes the SSE response incrementally: each `data:` event carries one
//! JSON chunk whose first choice delta may hold a content fragment, and
//! `[DONE]` ends the stream.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::credentials::EndpointAuth;
use crate::llm::{CompletionBackend, CompletionRequest, FragmentStream};

/// Dial timeout for reaching an endpoint. Streams have no overall
/// deadline; a completion runs as long as the model produces.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Streaming client for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new() -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn open_stream(
        &self,
        base_url: &str,
        auth: &EndpointAuth,
        request: CompletionRequest,
    ) -> Result<FragmentStream, LlmError> {
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &request.model,
            messages: [ChatMessage {
                role: &request.role,
                content: &request.content,
            }],
            stream: true,
            temperature: request.temperature,
            top_p: request.top_p,
        };

        tracing::debug!(%url, model = %request.model, "opening completion stream");
        let response = self
            .http
            .post(&url)
            .bearer_auth(auth.bearer_token())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                endpoint: base_url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthFailed {
                    endpoint: base_url.to_string(),
                },
                429 => LlmError::RateLimited {
                    endpoint: base_url.to_string(),
                },
                _ => LlmError::RequestFailed {
                    endpoint: base_url.to_string(),
                    reason: format!("HTTP {status}: {text}"),
                },
            });
        }

        Ok(Box::pin(fragment_stream(
            base_url.to_string(),
            response.bytes_stream(),
        )))
    }
}

/// Adapt a raw byte stream into a fragment stream.
///
/// A transport error ends the stream: the error is yielded once and no
/// further chunks are decoded.
fn fragment_stream<S, B, E>(
    endpoint: String,
    bytes: S,
) -> impl Stream<Item = Result<String, LlmError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = (
        Box::pin(bytes),
        SseDecoder::default(),
        VecDeque::new(),
        endpoint,
    );
    futures::stream::unfold(state, |(mut bytes, mut decoder, mut pending, endpoint)| {
        async move {
            loop {
                if let Some(fragment) = pending.pop_front() {
                    return Some((Ok(fragment), (bytes, decoder, pending, endpoint)));
                }
                if decoder.is_done() {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.feed(chunk.as_ref())),
                    Some(Err(error)) => {
                        decoder.finish();
                        let failed = LlmError::RequestFailed {
                            endpoint: endpoint.clone(),
                            reason: error.to_string(),
                        };
                        return Some((Err(failed), (bytes, decoder, pending, endpoint)));
                    }
                    None => return None,
                }
            }
        }
    })
}

/// Incremental decoder for an OpenAI-style SSE stream.
///
/// The buffer holds raw bytes and only complete lines are decoded as text,
/// so a multi-byte character split across two network chunks never tears.
/// Event blocks end at a blank line; `event:`, `id:` and comment lines are
/// ignored.
#[derive(Debug, Default)]
struct SseDecoder {
    buf: Vec<u8>,
    /// Data lines of the event currently being assembled.
    data_parts: Vec<String>,
    done: bool,
}

impl SseDecoder {
    /// Feed one network chunk, returning the fragments it completed.
    fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        self.buf.extend_from_slice(chunk);
        let mut fragments = Vec::new();
        while !self.done {
            let Some(line) = self.pop_line() else { break };
            if let Some(fragment) = self.take_line(&line) {
                fragments.push(fragment);
            }
        }
        fragments
    }

    fn is_done(&self) -> bool {
        self.done
    }

    /// Stop decoding; later feeds are discarded.
    fn finish(&mut self) {
        self.done = true;
    }

    /// Remove one complete line from the buffer, without its terminator.
    fn pop_line(&mut self) -> Option<Vec<u8>> {
        let end = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }

    /// Process one line; a blank line closes the current event and may
    /// yield its fragment.
    fn take_line(&mut self, line: &[u8]) -> Option<String> {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line,
            Err(error) => {
                tracing::trace!(%error, "skipping non-UTF-8 SSE line");
                return None;
            }
        };

        if line.is_empty() {
            return self.close_event();
        }
        if let Some(data) = line.strip_prefix("data: ") {
            self.data_parts.push(data.to_string());
        } else if let Some(data) = line.strip_prefix("data:") {
            self.data_parts.push(data.to_string());
        }
        None
    }

    /// Decode the assembled event into a content fragment, if it has one.
    fn close_event(&mut self) -> Option<String> {
        if self.data_parts.is_empty() {
            return None;
        }
        let json = self.data_parts.join("\n");
        self.data_parts.clear();

        if json.trim() == "[DONE]" {
            self.done = true;
            return None;
        }

        match serde_json::from_str::<StreamChunk>(&json) {
            Ok(chunk) => chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|content| !content.is_empty()),
            Err(error) => {
                tracing::trace!(%error, json = %json, "skipping unparseable SSE event");
                None
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
    temperature: f64,
    top_p: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// The parts of a streamed chunk the bot reads; the rest of the payload is
/// ignored.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
