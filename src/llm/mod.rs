//! Completions backends.
//!
//! [`CompletionBackend`] is the seam between the orchestrator and whatever
//! OpenAI-compatible endpoint a channel points at. A backend opens a
//! [`FragmentStream`]; the streaming relay on the other side decides how
//! the fragments reach Slack.

pub mod credentials;
pub mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::LlmError;

pub use credentials::{CredentialTable, EndpointAuth};
pub use openai::OpenAiBackend;

/// Lazily produced completion fragments, in production order.
///
/// An `Err` item means production failed after the stream opened; whatever
/// was yielded before it still counts.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// One completion request with every option already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub role: String,
    pub content: String,
    pub temperature: f64,
    pub top_p: f64,
}

/// A streaming chat completions backend.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Open a fragment stream against `base_url`.
    ///
    /// An error here means the stream never started and nothing was
    /// produced; errors after the first fragment arrive inside the stream.
    async fn open_stream(
        &self,
        base_url: &str,
        auth: &EndpointAuth,
        request: CompletionRequest,
    ) -> Result<FragmentStream, LlmError>;
}
