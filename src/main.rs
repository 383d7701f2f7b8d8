// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Cares Hub Service
//!
//! Serves the blog's PubSubHubbub hub (`POST /hub`) and RSS-Cloud endpoint
//! (`POST /rssCloud`). Subscriptions are held in memory; a deployment that
//! needs them to survive restarts supplies its own store.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `PUBLIC_HOST`: Host used in canonical feed URLs (default: request `Host`)
//! - `HUB_CHALLENGE`: Fixed verification challenge (default: random)
//! - `REQUEST_TIMEOUT_SECS`: Outbound request timeout (default: 30)
//! - `CLOUD_LEASE_HOURS`: RSS-Cloud registration lease (default: 25)
//! - `METRICS_ENABLED`: Serve `/metrics` (default: true)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cares_hub::{
    config::Config,
    handlers::{router, AppState},
    http::http_client,
    hub::Hub,
    metrics::Metrics,
    rsscloud::RssCloudHub,
    store::MemoryStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let config = load_config();
    info!(
        bind_addr = %config.bind_addr,
        public_host = ?config.site.public_host,
        fixed_challenge = config.hub.challenge.is_some(),
        cloud_lease_hours = config.cloud.lease_hours,
        "Starting notification hub"
    );

    let store = Arc::new(MemoryStore::new());
    let client = http_client(config.hub.request_timeout())?;
    let metrics = Metrics::new()?;

    let state = Arc::new(AppState {
        hub: Hub::new(
            store.clone(),
            client,
            config.site.clone(),
            config.hub.challenge.clone(),
        ),
        cloud: RssCloudHub::new(store, config.site.clone(), config.cloud.clone()),
        metrics,
        config: config.clone(),
    });

    let app = router(state);

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Load configuration from environment variables.
fn load_config() -> Config {
    let mut config = Config {
        bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        ..Default::default()
    };
    config.site.public_host = std::env::var("PUBLIC_HOST").ok().filter(|h| !h.is_empty());
    config.hub.challenge = std::env::var("HUB_CHALLENGE").ok().filter(|c| !c.is_empty());
    if let Some(secs) = std::env::var("REQUEST_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        config.hub.request_timeout_secs = secs;
    }
    if let Some(hours) = std::env::var("CLOUD_LEASE_HOURS")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        config.cloud.lease_hours = hours;
    }
    if let Some(enabled) = std::env::var("METRICS_ENABLED")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        config.metrics.enabled = enabled;
    }
    config
}
