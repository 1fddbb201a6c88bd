//! Slack Socket Mode listener.
//!
//! Opens a WebSocket via `apps.connections.open` (app-level token) and
//! forwards every `app_mention` event into an mpsc channel. Envelopes are
//! acked immediately on receipt; Slack redelivers anything not acked within
//! its window, and a late ack after a slow completion would count as one.
//!
//! The listener runs until the event consumer goes away. Slack refreshes
//! links periodically with `disconnect` frames, so dropping the connection
//! and dialing again is the normal steady state, not an error.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::SocketError;

/// Delay before redialing after a failed or closed link.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// One `app_mention` event, reduced to what the orchestrator needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionEvent {
    pub channel: String,
    /// Timestamp of the mention itself; replies thread under it.
    pub ts: String,
    pub text: String,
}

/// One Socket Mode frame. Slack sends more fields than these; serde drops
/// the rest.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    envelope_id: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
    reason: Option<String>,
}

/// Why one Socket Mode link ended.
enum LinkEnd {
    /// Slack closed or asked us to reconnect; dial again.
    Reconnect,
    /// The event consumer went away; stop listening.
    Stop,
}

/// Long-lived Socket Mode connection maintainer.
#[derive(Debug)]
pub struct SocketModeListener {
    http: reqwest::Client,
    api_base: String,
    app_token: SecretString,
}

impl SocketModeListener {
    pub fn new(api_base: &str, app_token: SecretString) -> Result<Self, SocketError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            app_token,
        })
    }

    /// Run until the receiving side of `tx` is dropped, reconnecting
    /// whenever Slack drops the link.
    pub async fn run(self, tx: mpsc::Sender<MentionEvent>) {
        loop {
            match self.connect_once(&tx).await {
                Ok(LinkEnd::Stop) => {
                    tracing::info!("mention consumer dropped, stopping Socket Mode listener");
                    return;
                }
                Ok(LinkEnd::Reconnect) => {
                    tracing::info!("Socket Mode link ended, reconnecting");
                }
                Err(error) => {
                    tracing::warn!(%error, "Socket Mode connection failed, retrying");
                }
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    /// Ask Slack for a fresh WebSocket URL.
    async fn open_connection(&self) -> Result<String, SocketError> {
        let response = self
            .http
            .post(format!("{}/apps.connections.open", self.api_base))
            .bearer_auth(self.app_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SocketError::OpenRefused {
                reason: format!("HTTP {status}: {text}"),
            });
        }

        let body: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
        if body.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
            let reason = body
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            return Err(SocketError::OpenRefused { reason });
        }
        body.get("url")
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .ok_or_else(|| SocketError::Protocol {
                reason: "apps.connections.open response missing url".to_string(),
            })
    }

    /// Hold one WebSocket link until it ends.
    async fn connect_once(&self, tx: &mpsc::Sender<MentionEvent>) -> Result<LinkEnd, SocketError> {
        let url = self.open_connection().await?;
        let (ws, _response) = tokio_tungstenite::connect_async(&url).await?;
        let (mut write, mut read) = ws.split();
        tracing::info!("Socket Mode connected");

        while let Some(frame) = read.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Ping(payload)) => {
                    write.send(Message::Pong(payload)).await?;
                    continue;
                }
                Ok(Message::Close(_)) => return Ok(LinkEnd::Reconnect),
                Ok(_) => continue,
                Err(error) => return Err(SocketError::WebSocket(error)),
            };

            let envelope: Envelope = match serde_json::from_str(text.as_str()) {
                Ok(envelope) => envelope,
                Err(error) => {
                    tracing::trace!(%error, "skipping unparseable Socket Mode frame");
                    continue;
                }
            };

            match envelope.kind.as_str() {
                "hello" => tracing::info!("Socket Mode link established"),
                "disconnect" => {
                    tracing::info!(
                        reason = envelope.reason.as_deref().unwrap_or("unspecified"),
                        "Slack requested reconnect"
                    );
                    return Ok(LinkEnd::Reconnect);
                }
                "events_api" => {
                    // Ack before doing anything with the payload.
                    if let Some(envelope_id) = &envelope.envelope_id {
                        let ack = serde_json::json!({ "envelope_id": envelope_id });
                        write.send(Message::Text(ack.to_string().into())).await?;
                    }
                    if let Some(event) = extract_mention(&envelope.payload) {
                        if tx.send(event).await.is_err() {
                            return Ok(LinkEnd::Stop);
                        }
                    }
                }
                other => tracing::trace!(kind = other, "ignoring Socket Mode frame"),
            }
        }

        Ok(LinkEnd::Reconnect)
    }
}

/// Pull an `app_mention` out of an `events_api` payload. Any other event
/// type, and any mention missing a field we need, is `None`.
fn extract_mention(payload: &serde_json::Value) -> Option<MentionEvent> {
    let event = payload.get("event")?;
    if event.get("type").and_then(serde_json::Value::as_str) != Some("app_mention") {
        return None;
    }
    Some(MentionEvent {
        channel: event.get("channel")?.as_str()?.to_string(),
        ts: event.get("ts")?.as_str()?.to_string(),
        text: event.get("text")?.as_str()?.to_string(),
    })
}
