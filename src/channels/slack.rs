//! Slack Web API client.
//!
//! Hand-rolled over reqwest: every method is a POST of a JSON body to
//! `{api_base}/{method}` with the bot token as a bearer. Slack reports most
//! application-level failures inside a 200 response, so [`SlackClient::call`]
//! checks the HTTP status first and the body's `ok` field second.
//!
//! [`SlackClient`] is also the production [`MessageSurface`]: `create` is
//! `chat.postMessage` into a thread and `replace` is `chat.update`.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::channels::surface::{MessageHandle, MessageSurface, ReplyTarget};
use crate::error::SurfaceError;

/// Identity of the authenticated bot, from `auth.test`.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub user_id: String,
    pub team: String,
}

/// Minimal Slack Web API client scoped to what the bot needs.
#[derive(Debug, Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: SecretString,
}

impl SlackClient {
    pub fn new(api_base: &str, bot_token: SecretString) -> Result<Self, SurfaceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
        })
    }

    /// Call one Web API method and return the parsed response body.
    async fn call(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, SurfaceError> {
        tracing::debug!(method, "calling Slack Web API");
        let response = self
            .http
            .post(format!("{}/{}", self.api_base, method))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SurfaceError::Api {
                method: method.to_string(),
                reason: format!("HTTP {status}: {text}"),
            });
        }

        // Slack returns 200 for most app-level errors; the body's "ok"
        // field is the real verdict.
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
        if parsed.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
            let reason = parsed
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown");
            return Err(SurfaceError::Api {
                method: method.to_string(),
                reason: reason.to_string(),
            });
        }
        Ok(parsed)
    }

    /// Verify the bot token and report who we are connected as.
    pub async fn auth_test(&self) -> Result<BotIdentity, SurfaceError> {
        let response = self.call("auth.test", serde_json::json!({})).await?;
        Ok(BotIdentity {
            user_id: string_field(&response, "auth.test", "user_id")?,
            team: response
                .get("team")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

#[async_trait]
impl MessageSurface for SlackClient {
    async fn create(
        &self,
        target: &ReplyTarget,
        text: &str,
        broadcast: bool,
    ) -> Result<MessageHandle, SurfaceError> {
        let body = serde_json::json!({
            "channel": target.channel,
            "thread_ts": target.thread_ts,
            "reply_broadcast": broadcast,
            "text": text,
        });
        let response = self.call("chat.postMessage", body).await?;
        let ts = string_field(&response, "chat.postMessage", "ts")?;
        Ok(MessageHandle(ts))
    }

    async fn replace(
        &self,
        target: &ReplyTarget,
        handle: &MessageHandle,
        text: &str,
    ) -> Result<(), SurfaceError> {
        let body = serde_json::json!({
            "channel": target.channel,
            "ts": handle.as_str(),
            "text": text,
        });
        self.call("chat.update", body).await?;
        Ok(())
    }
}

/// Extract a required string field from a Web API response.
fn string_field(
    response: &serde_json::Value,
    method: &str,
    field: &str,
) -> Result<String, SurfaceError> {
    response
        .get(field)
        .and_then(serde_json::Value::as_str)
        .map(String::from)
        .ok_or_else(|| SurfaceError::MissingField {
            method: method.to_string(),
            field: field.to_string(),
        })
}
