// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cabnetd: HTTP/JSON control plane over the cabnet fleet core.

pub mod config;
pub mod error;
pub mod state;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::state::AppState;
use crate::transport::build_router;

/// Run the server until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    // Configuration errors at startup are fatal.
    let system = cabnet::SystemConfig::load(&config.config)?;
    let state = Arc::new(AppState::from_config(system)?);

    let heartbeat = state.manager.spawn_heartbeat();
    let router = build_router(Arc::clone(&state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("cabnetd listening on {addr}");

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    axum::serve(listener, router)
        .with_graceful_shutdown(state.shutdown.clone().cancelled_owned())
        .await?;

    state.manager.shutdown();
    heartbeat.abort();
    Ok(())
}
