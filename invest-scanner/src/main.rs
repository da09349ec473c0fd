//! Invest Scanner - market data API and low-price volume-pattern scanner.

use anyhow::{Context, Result};
use invest_common::config::Config;
use invest_common::logging::init_from_config;
use invest_scanner::ScannerService;

#[tokio::main]
async fn main() -> Result<()> {
    // Start timing immediately for cold-start measurement
    let startup_start = std::time::Instant::now();

    let config = Config::load_with_env()?;

    init_from_config(&config.observability);

    tracing::info!("Invest Scanner v{}", env!("CARGO_PKG_VERSION"));

    config.validate().context("Invalid configuration")?;

    let service = ScannerService::new(config)?;

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        provider = service.state().provider.name(),
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}
