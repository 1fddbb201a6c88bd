//! Per-mention request dispatch.
//!
//! One mention maps to one worker task. The orchestrator parses the
//! command, folds the option tiers, and either persists the channel's new
//! defaults or relays a completion stream into the thread. Every failure
//! becomes exactly one non-broadcast threaded reply; nothing here retries,
//! and nothing propagates to the listener loop.

use std::sync::Arc;

use crate::channels::{
    CoalescerConfig, MentionCommand, MentionEvent, MessageSurface, ReplyTarget, StreamOutcome,
    parse_mention, relay_stream, usage,
};
use crate::error::Error;
use crate::llm::{CompletionBackend, CompletionRequest, CredentialTable};
use crate::options::{OptionsPatch, resolve};
use crate::store::ChannelOptionStore;

/// Placeholder posted when a completion produces zero fragments.
const EMPTY_PRODUCTION_REPLY: &str = "(no response content)";

/// Shared per-process wiring for mention handling.
pub struct Orchestrator {
    surface: Arc<dyn MessageSurface>,
    backend: Arc<dyn CompletionBackend>,
    store: ChannelOptionStore,
    process_defaults: OptionsPatch,
    credentials: CredentialTable,
    coalescer: CoalescerConfig,
}

impl Orchestrator {
    pub fn new(
        surface: Arc<dyn MessageSurface>,
        backend: Arc<dyn CompletionBackend>,
        store: ChannelOptionStore,
        process_defaults: OptionsPatch,
        credentials: CredentialTable,
        coalescer: CoalescerConfig,
    ) -> Self {
        Self {
            surface,
            backend,
            store,
            process_defaults,
            credentials,
            coalescer,
        }
    }

    /// Handle one mention to completion. Never fails; every error is
    /// converted into a threaded diagnostic reply.
    pub async fn handle_mention(&self, event: MentionEvent) {
        let target = ReplyTarget {
            channel: event.channel.clone(),
            thread_ts: event.ts.clone(),
        };
        let command = match parse_mention(&event.text) {
            Ok(command) => command,
            Err(error) => {
                tracing::debug!(%error, channel = %event.channel, "rejected mention");
                self.respond(&target, &error.to_string()).await;
                return;
            }
        };

        match command {
            MentionCommand::Help => self.respond(&target, &usage()).await,
            MentionCommand::SetChannelDefaults { overrides } => {
                self.set_channel_defaults(&target, overrides).await;
            }
            MentionCommand::Complete { content, overrides } => {
                self.complete(&target, content, overrides).await;
            }
        }
    }

    async fn set_channel_defaults(&self, target: &ReplyTarget, overrides: OptionsPatch) {
        match self.write_defaults(target, &overrides).await {
            Ok(stored) => {
                // The confirmation broadcasts so the whole channel sees its
                // new defaults, not just the thread.
                if let Err(error) = self.surface.create(target, &render(&stored), true).await {
                    tracing::error!(%error, channel = %target.channel, "defaults confirmation failed");
                }
            }
            Err(error) => {
                tracing::warn!(%error, channel = %target.channel, "defaults update failed");
                self.respond(target, &describe(&error)).await;
            }
        }
    }

    /// Resolve the request against every tier and persist the full snapshot
    /// as the channel's new defaults.
    async fn write_defaults(
        &self,
        target: &ReplyTarget,
        overrides: &OptionsPatch,
    ) -> Result<OptionsPatch, Error> {
        let channel = self.store.get(&target.channel).await?;
        let effective = resolve(overrides, &channel, &self.process_defaults)?;
        let stored = self
            .store
            .upsert(&target.channel, &effective.to_patch())
            .await?;
        tracing::info!(channel = %target.channel, "channel defaults updated");
        Ok(stored)
    }

    async fn complete(&self, target: &ReplyTarget, content: String, overrides: OptionsPatch) {
        if let Err(error) = self.try_complete(target, content, overrides).await {
            tracing::warn!(%error, channel = %target.channel, "completion failed");
            self.respond(target, &describe(&error)).await;
        }
    }

    async fn try_complete(
        &self,
        target: &ReplyTarget,
        content: String,
        overrides: OptionsPatch,
    ) -> Result<(), Error> {
        let channel = self.store.get(&target.channel).await?;
        let effective = resolve(&overrides, &channel, &self.process_defaults)?;
        let auth = self.credentials.resolve(&effective.base_url)?;
        let request = CompletionRequest {
            model: effective.model.clone(),
            role: effective.role.clone(),
            content,
            temperature: effective.temperature,
            top_p: effective.top_p,
        };

        let stream = self
            .backend
            .open_stream(&effective.base_url, &auth, request)
            .await?;
        let outcome = relay_stream(
            self.surface.as_ref(),
            target,
            effective.broadcast_reply,
            stream,
            &self.coalescer,
        )
        .await?;

        if outcome == StreamOutcome::Empty {
            self.respond(target, EMPTY_PRODUCTION_REPLY).await;
        }
        Ok(())
    }

    /// Post a non-broadcast threaded diagnostic. Diagnostics are never
    /// edited, so the handle is dropped.
    async fn respond(&self, target: &ReplyTarget, text: &str) {
        if let Err(error) = self.surface.create(target, text, false).await {
            tracing::error!(%error, channel = %target.channel, "reply failed");
        }
    }
}

/// Reply text for a failed request. Storage internals stay out of the
/// channel; every other error shows its own description.
fn describe(error: &Error) -> String {
    match error {
        Error::Store(_) => "internal storage error, try again later".to_string(),
        other => other.to_string(),
    }
}

fn render(record: &OptionsPatch) -> String {
    serde_json::to_string(record).unwrap_or_else(|_| format!("{record:?}"))
}
