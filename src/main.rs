use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt};

use chatrelay::channels::{SlackClient, SocketModeListener};
use chatrelay::config::Config;
use chatrelay::llm::OpenAiBackend;
use chatrelay::options::schema;
use chatrelay::orchestrator::Orchestrator;
use chatrelay::store::ChannelOptionStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::parse();

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    schema::verify().context("option schema is inconsistent")?;

    let store = ChannelOptionStore::open(&config.db_path)
        .await
        .context("opening channel option store")?;

    let slack = SlackClient::new(&config.slack_api_base, config.slack_bot_token()?)
        .context("building Slack client")?;
    let identity = slack.auth_test().await.context("Slack auth test failed")?;
    tracing::info!(user_id = %identity.user_id, team = %identity.team, "connected to Slack");

    let backend = OpenAiBackend::new().context("building completions client")?;

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(slack),
        Arc::new(backend),
        store,
        config.process_defaults(),
        config.credential_table(),
        config.coalescer_config(),
    ));

    let listener = SocketModeListener::new(&config.slack_api_base, config.slack_app_token()?)
        .context("building Socket Mode listener")?;
    let (tx, mut rx) = mpsc::channel(64);
    tokio::spawn(listener.run(tx));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
            event = rx.recv() => match event {
                Some(event) => {
                    let orchestrator = orchestrator.clone();
                    tokio::spawn(async move { orchestrator.handle_mention(event).await });
                }
                None => {
                    tracing::warn!("socket mode listener stopped");
                    break;
                }
            },
        }
    }

    Ok(())
}
