//! Blink a remote board: call `ledOn`, wait, call `ledOff`, end.
//!
//! Run with: cargo run -p blink-demo
//!
//! Configuration comes from the environment:
//! - `BLINK_AGENT` - agent identifier (required)
//! - `BLINK_DOMAIN` - namespace (default: `public`)
//! - `BLINK_BROKER` - broker URI (default: `mqtt://localhost:1883`)
//! - `BLINK_TOKEN` - access token, when the broker requires one

use std::time::Duration;

use anyhow::Context as _;
use remote_call_client::{ClientConfig, RemoteClient};
use remote_call_core::call::CallRequest;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let agent =
        std::env::var("BLINK_AGENT").context("BLINK_AGENT must name the target agent")?;
    let broker =
        std::env::var("BLINK_BROKER").unwrap_or_else(|_| "mqtt://localhost:1883".to_string());

    let mut config = ClientConfig::new(agent, broker);
    if let Ok(domain) = std::env::var("BLINK_DOMAIN") {
        config = config.with_domain(domain);
    }
    if let Ok(token) = std::env::var("BLINK_TOKEN") {
        config = config.with_token(token);
    }

    let client = RemoteClient::connect(config).await?;
    tracing::info!(agent = %client.agent(), status = ?client.agent_status(), "connected");

    client.call_static(CallRequest::global("ledOn")).await?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    client.call_static(CallRequest::global("ledOff")).await?;

    client.end().await;
    Ok(())
}
