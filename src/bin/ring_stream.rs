//! ring-stream-server binary
//!
//! Runs the streaming engine over stdin/stdout: one JSON command per input
//! line, one `{subject} {json}` event per output line.
//!
//! ## Configuration (flags / env / TOML via `config` crate)
//!
//! | Flag / key                 | Default             | Description                    |
//! |----------------------------|---------------------|--------------------------------|
//! | `--config` `RING_STREAM_CONFIG` | *(none)*       | Optional TOML settings file    |
//! | `--session` `RING_STREAM_SESSION` | `default`    | Session stamped on events      |
//! | `--log-filter` `RING_STREAM_LOG_FILTER` | `ring_stream=debug` | Log directive |
//!
//! Streaming limits (`[streaming]` table, `RING_STREAM_STREAMING__*`) come
//! from the settings file and environment only.

use anyhow::{Context, Result};
use clap::Parser;
use ring_stream::{
    agent::{StreamAgent, StreamAgentConfig},
    chunk::ChunkCatalog,
    service::{SubscriptionManager, SubscriptionStore},
    settings::Settings,
    zones::InMemoryZoneStore,
};
use std::path::PathBuf;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "ring-stream-server", about = "Ring spatial streaming engine", version)]
struct Args {
    /// TOML settings file
    #[arg(long, env = "RING_STREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Session name (overrides settings)
    #[arg(long, env = "RING_STREAM_SESSION")]
    session: Option<String>,

    /// Log filter directive (overrides settings)
    #[arg(long, env = "RING_STREAM_LOG_FILTER")]
    log_filter: Option<String>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(session) = args.session {
        settings.session = session;
    }
    if let Some(filter) = args.log_filter {
        settings.log_filter = filter;
    }

    // Logs go to stderr; stdout carries events.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                settings
                    .log_filter
                    .parse()
                    .context("invalid log filter")?,
            ),
        )
        .init();

    log::info!(
        "Starting ring-stream-server (session='{}', floors={:?}, default width={} m)",
        settings.session,
        settings.streaming.floor_range(),
        settings.streaming.default_width_meters,
    );

    let store = Arc::new(SubscriptionStore::new());
    let manager = Arc::new(SubscriptionManager::new(settings.streaming.clone(), store));
    let zones = Arc::new(InMemoryZoneStore::new(settings.streaming.clone()));
    let chunks = Arc::new(ChunkCatalog::new(settings.streaming.floor_range()));

    let agent = StreamAgent::new(
        StreamAgentConfig {
            session: settings.session,
        },
        manager,
        zones,
        chunks,
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    agent.run(stdin, stdout, shutdown).await
}
