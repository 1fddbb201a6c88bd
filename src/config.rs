//! Runtime configuration from command-line flags and environment.
//!
//! Every flag can also be set through a `CHATRELAY_*` environment
//! variable; the flag wins when both are present. Slack tokens are only
//! checked at startup so `--help` and parse errors never require them.

use std::path::PathBuf;

use clap::Parser;
use secrecy::SecretString;

use crate::channels::CoalescerConfig;
use crate::error::ConfigError;
use crate::llm::CredentialTable;
use crate::options::OptionsPatch;

#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(about = "Slack bot that streams chat completions into threads")]
#[command(version)]
pub struct Config {
    /// Process-level default completion endpoint, e.g. http://localhost:8000/v1
    #[arg(long, env = "CHATRELAY_BASE_URL")]
    pub base_url: Option<String>,

    /// Process-level default model name
    #[arg(long, env = "CHATRELAY_MODEL")]
    pub model: Option<String>,

    /// Process-level default message role
    #[arg(long, env = "CHATRELAY_ROLE")]
    pub role: Option<String>,

    /// Process-level default sampling temperature
    #[arg(long, env = "CHATRELAY_TEMPERATURE")]
    pub temperature: Option<f64>,

    /// Process-level default nucleus sampling cutoff
    #[arg(long, env = "CHATRELAY_TOP_P")]
    pub top_p: Option<f64>,

    /// Process-level default for broadcasting final replies to the channel
    #[arg(long, env = "CHATRELAY_BROADCAST_REPLY")]
    pub broadcast_reply: Option<bool>,

    /// Endpoint credential mapping as URL=ENV_VAR, repeatable.
    /// In the environment, separate entries with commas.
    #[arg(
        long = "api-key-env",
        env = "CHATRELAY_API_KEY_ENV",
        value_parser = parse_key_env,
        value_delimiter = ','
    )]
    pub api_key_env: Vec<(String, String)>,

    /// Emoji appended to in-progress replies
    #[arg(long, env = "CHATRELAY_TYPING_EMOJI", default_value = ":keyboard:")]
    pub typing_emoji: String,

    /// SQLite database file holding per-channel defaults
    #[arg(long, env = "CHATRELAY_DB_PATH", default_value = "chatrelay.db")]
    pub db_path: PathBuf,

    /// Slack Web API base URL
    #[arg(
        long,
        env = "CHATRELAY_SLACK_API_BASE",
        default_value = "https://slack.com/api"
    )]
    pub slack_api_base: String,

    /// Slack bot token (xoxb-...) for the Web API
    #[arg(long, env = "CHATRELAY_SLACK_BOT_TOKEN", hide_env_values = true)]
    slack_bot_token: Option<String>,

    /// Slack app-level token (xapp-...) for Socket Mode
    #[arg(long, env = "CHATRELAY_SLACK_APP_TOKEN", hide_env_values = true)]
    slack_app_token: Option<String>,
}

impl Config {
    /// Bot token for the Web API, required to start.
    pub fn slack_bot_token(&self) -> Result<SecretString, ConfigError> {
        secret(self.slack_bot_token.as_deref(), "CHATRELAY_SLACK_BOT_TOKEN")
    }

    /// App-level token for Socket Mode, required to start.
    pub fn slack_app_token(&self) -> Result<SecretString, ConfigError> {
        secret(self.slack_app_token.as_deref(), "CHATRELAY_SLACK_APP_TOKEN")
    }

    /// The defaults this process contributes to option resolution.
    pub fn process_defaults(&self) -> OptionsPatch {
        OptionsPatch {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            role: self.role.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            broadcast_reply: self.broadcast_reply,
        }
    }

    /// Endpoint-to-credential mapping for the completions backend.
    pub fn credential_table(&self) -> CredentialTable {
        CredentialTable::new(self.api_key_env.iter().cloned())
    }

    /// Streaming relay tuning.
    pub fn coalescer_config(&self) -> CoalescerConfig {
        CoalescerConfig {
            progress_marker: self.typing_emoji.clone(),
            ..CoalescerConfig::default()
        }
    }
}

fn secret(value: Option<&str>, env_var: &str) -> Result<SecretString, ConfigError> {
    value
        .map(|token| SecretString::from(token.to_string()))
        .ok_or_else(|| ConfigError::MissingEnvVar(env_var.to_string()))
}

/// Split one `URL=ENV_VAR` entry. The split is on the last `=` so URLs
/// with query strings stay intact.
fn parse_key_env(raw: &str) -> Result<(String, String), String> {
    let parts = raw
        .rsplit_once('=')
        .map(|(url, var)| (url.trim(), var.trim()));
    match parts {
        Some((url, var)) if !url.is_empty() && !var.is_empty() => {
            Ok((url.to_string(), var.to_string()))
        }
        _ => Err(format!("\"{raw}\" is not formatted like URL=ENV_VAR")),
    }
}
