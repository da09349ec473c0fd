//! Invest Scanner Library
//!
//! Market data service over interchangeable providers, plus a low-price
//! volume-pattern stock scanner.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    invest-scanner (Rust Service)                    │
//! │                              :4440                                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐     │
//! │  │  HTTP Routes    │─▶│  VolumeScanner  │─▶│ Pattern         │     │
//! │  │  (axum)         │  │  (batches)      │  │ Evaluator       │     │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────────┘     │
//! │           │                    │                                    │
//! │           ▼                    ▼                                    │
//! │  ┌──────────────────────────────────────────────────────────┐      │
//! │  │ SeriesProvider: tiger (HTTP) | yfinance | twelvedata      │      │
//! │  │                 (+ optional series cache)                  │      │
//! │  └──────────────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Volume pattern
//! With `v0` the latest daily volume, the trailing averages of the six
//! sessions before it must strictly increase as the window grows, and the
//! shortest one must exceed `v0`.
//!
//! ## Scan
//! Candidates come from the provider's market scanner (price band, ranked by
//! volume). Their series are fetched in paced batches and evaluated until
//! enough matches are found.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod error;
pub mod routes;
pub mod screener;

pub use error::ApiError;
pub use routes::{build_router, AppState};

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};

use invest_common::Config;

use crate::data::build_provider;

/// Main scanner service
pub struct ScannerService {
    state: AppState,
}

impl ScannerService {
    /// Create the service, building the configured provider.
    ///
    /// Fails on an unknown provider or missing credentials.
    pub fn new(config: Config) -> Result<Self> {
        let provider = build_provider(&config.provider).context("Failed to build market data provider")?;
        Ok(Self {
            state: AppState::new(config, provider),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Start the HTTP server
    pub async fn start(self) -> Result<()> {
        let provider = self.state.provider.clone();
        tokio::spawn(async move {
            match provider.health_check().await {
                Ok(()) => tracing::info!(provider = provider.name(), "Provider health check passed"),
                Err(e) => tracing::warn!(
                    provider = provider.name(),
                    error = %e,
                    "Provider health check failed, requests may fail until it recovers"
                ),
            }
        });

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = build_router(self.state.clone()).layer(cors);

        let addr: SocketAddr = self
            .state
            .config
            .listen_address()
            .parse()
            .context("Invalid listen address")?;
        tracing::info!(address = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
