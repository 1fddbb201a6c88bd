//! Streaming update coalescer.
//!
//! Turns an unbounded stream of text fragments into a bounded sequence of
//! surface edits: one create when the first fragment arrives, intermediate
//! replaces at most once per flush interval while fragments keep coming,
//! and one unconditional final replace when the stream ends. The final
//! content is always the exact concatenation of every fragment, in order.

use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};

use crate::channels::surface::{MessageHandle, MessageSurface, ReplyTarget};
use crate::error::{Error, LlmError};

/// Flush timing and progress-marker settings for a relay session.
#[derive(Debug, Clone)]
pub struct CoalescerConfig {
    /// Appended to every in-progress render and absent from the final one.
    pub progress_marker: String,
    /// Minimum elapsed time between intermediate replaces.
    pub flush_interval: Duration,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            progress_marker: ":keyboard:".to_string(),
            flush_interval: Duration::from_secs(1),
        }
    }
}

/// How a relay session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// At least one fragment arrived and the final content is rendered.
    Posted { handle: MessageHandle, text: String },
    /// The production ended without a single fragment. Nothing was posted;
    /// the caller decides whether a placeholder is warranted.
    Empty,
}

/// Drive `fragments` to completion against `surface`.
///
/// A mid-stream production failure still flushes the partial buffer as the
/// final message state before the error is returned. Intermediate and final
/// replace failures are logged and skipped; a create failure is fatal since
/// without a handle there is nothing to edit.
pub async fn relay_stream<S>(
    surface: &S,
    target: &ReplyTarget,
    broadcast: bool,
    mut fragments: impl Stream<Item = Result<String, LlmError>> + Unpin + Send,
    config: &CoalescerConfig,
) -> Result<StreamOutcome, Error>
where
    S: MessageSurface + ?Sized,
{
    let mut buffer = match fragments.next().await {
        None => return Ok(StreamOutcome::Empty),
        // No message exists yet, so there is no partial state to flush.
        Some(Err(error)) => return Err(Error::Llm(error)),
        Some(Ok(fragment)) => fragment,
    };

    let handle = surface
        .create(
            target,
            &format!("{buffer}{}", config.progress_marker),
            broadcast,
        )
        .await
        .map_err(Error::from)?;
    let mut last_flush = Instant::now();
    tracing::debug!(
        channel = %target.channel,
        handle = handle.as_str(),
        "streaming reply started"
    );

    let mut failure: Option<LlmError> = None;
    while let Some(item) = fragments.next().await {
        match item {
            Ok(fragment) => {
                buffer.push_str(&fragment);
                if last_flush.elapsed() > config.flush_interval {
                    let rendered = format!("{buffer}{}", config.progress_marker);
                    if let Err(error) = surface.replace(target, &handle, &rendered).await {
                        tracing::warn!(error = %error, "intermediate replace failed");
                    }
                    last_flush = Instant::now();
                }
            }
            Err(error) => {
                failure = Some(error);
                break;
            }
        }
    }

    // Final state: the full buffer without the marker. Unconditional, and
    // on a mid-stream failure it lands before the error is reported.
    if let Err(error) = surface.replace(target, &handle, &buffer).await {
        tracing::warn!(error = %error, "final replace failed");
    }
    tracing::debug!(
        channel = %target.channel,
        chars = buffer.len(),
        failed = failure.is_some(),
        "streaming reply finished"
    );

    match failure {
        Some(error) => Err(Error::Llm(error)),
        None => Ok(StreamOutcome::Posted {
            handle,
            text: buffer,
        }),
    }
}
