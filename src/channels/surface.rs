//! Abstract outbound message surface.

use async_trait::async_trait;

use crate::error::SurfaceError;

/// Handle to a message created on the surface, used to edit it later.
///
/// For Slack this is the message `ts`, unique within its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle(pub String);

impl MessageHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Where replies to one inbound request go: the channel plus the thread
/// anchor, which is the mention's own timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub channel: String,
    pub thread_ts: String,
}

/// The two operations the streaming relay needs from a messaging surface.
///
/// Implementations do not retry; a failure surfaces to the caller, which
/// decides whether the operation was load-bearing.
#[async_trait]
pub trait MessageSurface: Send + Sync {
    /// Post a new threaded message, returning its handle.
    async fn create(
        &self,
        target: &ReplyTarget,
        text: &str,
        broadcast: bool,
    ) -> Result<MessageHandle, SurfaceError>;

    /// Replace the full content of an existing message.
    async fn replace(
        &self,
        target: &ReplyTarget,
        handle: &MessageHandle,
        text: &str,
    ) -> Result<(), SurfaceError>;
}
