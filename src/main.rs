// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Relay server.
//!
//! Point a Twilio number's voice webhook at `https://<host>/incoming-call`.
//! Configuration comes from the environment (or a `.env` file); see
//! [`callrelay::config::RelayConfig::from_env`].

use callrelay::config::RelayConfig;
use callrelay::server::{router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = RelayConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,callrelay=debug")),
        )
        .init();

    let app = router(AppState::from_config(&config)?);

    let addr = config.bind_addr();
    tracing::info!(
        %addr,
        model = %config.session.model,
        format = %config.session.audio_format,
        "Relay server starting"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
