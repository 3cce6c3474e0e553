//! Keyword Reply Bot - Main Entry Point
//!
//! Wires the account store, authentication flow and message router
//! together and runs the dispatch loop. The chat transport attaches via
//! the inbound/outbound channel pair.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use keyword_reply_bot::auth::Authenticator;
use keyword_reply_bot::config::BotConfig;
use keyword_reply_bot::router::{InboundMessage, MessageRouter, OutboundMessage, SessionManager};
use keyword_reply_bot::store::AccountStore;
use keyword_reply_bot::telegram::GrammersConnector;

/// Telegram keyword auto-reply bot.
#[derive(Parser, Debug)]
#[command(name = "keyword_reply_bot")]
#[command(about = "Let users log in and manage keyword-triggered auto-replies")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let config = BotConfig::from_env().context("Failed to load configuration from environment")?;

    let store = Arc::new(
        AccountStore::open(&config.data_path).context("Failed to open the account store")?,
    );
    info!("Account store loaded from {}", config.data_path.display());

    let connector =
        Arc::new(GrammersConnector::new(&config).context("Failed to set up the Telegram connector")?);

    let sessions = Arc::new(SessionManager::new());
    let auth = Authenticator::new(
        connector,
        Arc::clone(&store),
        sessions.registry(),
        config.channel_owner.clone(),
    );
    let router = Arc::new(MessageRouter::new(Arc::clone(&sessions), store, auth));

    // The transport binding feeds inbound messages and drains outbound
    // replies through these channels.
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(64);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(64);

    let dispatcher = tokio::spawn(dispatch(Arc::clone(&router), inbound_rx, outbound_tx));

    let drain = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            debug!("Reply queued for user {}", message.user_id);
        }
    });

    info!("Bot is running. Use Ctrl+C to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Received shutdown signal, shutting down...");

    // Closing the inbound side ends the dispatcher; then release any
    // login attempts still holding a live connection.
    drop(inbound_tx);
    let _ = dispatcher.await;
    sessions.shutdown().await;
    drain.abort();

    Ok(())
}

/// Routes inbound messages, one task per message.
///
/// Per-user ordering is enforced inside the router; unrelated users are
/// handled concurrently.
async fn dispatch(
    router: Arc<MessageRouter>,
    mut inbound: mpsc::Receiver<InboundMessage>,
    outbound: mpsc::Sender<OutboundMessage>,
) {
    while let Some(message) = inbound.recv().await {
        let router = Arc::clone(&router);
        let outbound = outbound.clone();

        tokio::spawn(async move {
            let replies = router.handle_message(&message.user_id, &message.text).await;
            for text in replies {
                let reply = OutboundMessage {
                    user_id: message.user_id.clone(),
                    text,
                };
                if let Err(e) = outbound.send(reply).await {
                    warn!("Dropping reply for user {}: {}", message.user_id, e);
                }
            }
        });
    }
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
