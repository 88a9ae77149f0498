//! Feedsync watcher
//!
//! Command-line watcher for decentralized price-oracle feeds. Synchronizes
//! one feed's on-chain aggregator state (current round, per-oracle answers,
//! published aggregate) and logs every projection update as it lands.
//! Read-only: no keys, no transactions.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedsync_chain::ChainClient;
use feedsync_core::{FeedsConfig, StoreEvent, SyncOrchestrator};

/// Environment variable names.
mod env {
    pub const HTTP_URL: &str = "FEEDSYNC_HTTP_URL";
    pub const WS_URL: &str = "FEEDSYNC_WS_URL";
    pub const FEEDS_FILE: &str = "FEEDSYNC_FEEDS";
    pub const FEED_NAME: &str = "FEEDSYNC_FEED";
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,feedsync_core=debug,feedsync_chain=debug")),
        )
        .init();

    let config = load_config()?;

    info!(feed = %config.feed.name.as_deref().unwrap_or("unnamed"), "Starting feedsync watcher");

    // Chain client (verifies the HTTP endpoint answers)
    let client = Arc::new(ChainClient::connect(&config.http_url, &config.ws_url).await?);

    // Orchestrator and session
    let orchestrator = SyncOrchestrator::new(client);
    let session = orchestrator.init_contract(config.feed).await?;
    let store = session.store();
    let mut events = store.subscribe();

    info!("Session live; watching for updates (ctrl-c to stop)");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => log_update(event, &store),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Update log lagged behind the store");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    orchestrator.dispose();
    Ok(())
}

/// Configuration loaded from environment + feeds file.
struct Config {
    http_url: String,
    ws_url: String,
    feed: feedsync_core::FeedConfig,
}

fn load_config() -> Result<Config> {
    let get_env = |name: &str| -> Result<String> {
        std::env::var(name).map_err(|_| anyhow::anyhow!("Missing env var: {}", name))
    };

    let feeds_file =
        get_env(env::FEEDS_FILE).unwrap_or_else(|_| "feeds.toml".to_string());
    let feeds = FeedsConfig::from_file(&feeds_file)?;

    let feed = match std::env::var(env::FEED_NAME) {
        Ok(name) => feeds
            .get(&name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No feed named '{}' in {}", name, feeds_file))?,
        Err(_) => feeds
            .feeds
            .first()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No feeds configured in {}", feeds_file))?,
    };

    Ok(Config {
        http_url: get_env(env::HTTP_URL)?,
        ws_url: get_env(env::WS_URL)?,
        feed,
    })
}

/// Log the field group an update event names.
fn log_update(event: StoreEvent, store: &feedsync_core::AnswerStore) {
    let snapshot = store.snapshot();
    match event {
        StoreEvent::LatestAnswer => info!(
            answer = snapshot.latest_formatted_answer.as_deref().unwrap_or("?"),
            "Aggregate updated"
        ),
        StoreEvent::LatestAnswerTimestamp => {
            if let Some(ts) = snapshot.latest_answer_timestamp {
                info!(at = %format_time(ts), "Aggregate timestamp updated");
            }
        }
        StoreEvent::OracleAnswers => info!(
            answers = snapshot.oracle_answers.len(),
            minimum = snapshot.minimum_answers.unwrap_or(0),
            "Answer set updated"
        ),
        StoreEvent::PendingRound => info!(
            round = snapshot.pending_round_id.unwrap_or(0),
            "Reporting round advanced"
        ),
        StoreEvent::LatestRound => info!(
            round = snapshot.latest_round_id.unwrap_or(0),
            "Round finalized"
        ),
        StoreEvent::OracleList => info!(
            oracles = snapshot.oracle_list.len(),
            "Oracle roster updated"
        ),
        StoreEvent::MinimumAnswers => info!(
            minimum = snapshot.minimum_answers.unwrap_or(0),
            "Quorum threshold updated"
        ),
        StoreEvent::RequestTimestamp => {
            if let Some(ts) = snapshot.latest_request_timestamp {
                info!(at = %format_time(ts), "Round started");
            }
        }
        StoreEvent::History => info!(
            entries = snapshot.answer_history.len(),
            "Answer history loaded"
        ),
        StoreEvent::Description => info!(
            description = snapshot.description.as_deref().unwrap_or(""),
            "Feed description loaded"
        ),
    }
}

fn format_time(unix_secs: u64) -> String {
    chrono::DateTime::from_timestamp(unix_secs as i64, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| unix_secs.to_string())
}

/// Print startup banner.
fn print_banner() {
    println!(
        r#"
    ┌─┐┌─┐┌─┐┌┬┐┌─┐┬ ┬┌┐┌┌─┐
    ├┤ ├┤ ├┤  ││└─┐└┬┘│││├─┘
    └  └─┘└─┘─┴┘└─┘ ┴ ┘└┘└─┘
    Oracle Feed Watcher v0.1.0
    "#
    );
}
