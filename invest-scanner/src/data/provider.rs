//! Series provider abstraction for multi-source market data.
//!
//! Defines the `SeriesProvider` trait that every backend implements, so the
//! scanner and HTTP layer never see upstream formats or transport details.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::raw::BarError;
use super::{Market, Period, Quote, ScannerCategory, Series};

/// Bars requested when a quote is derived from the daily series.
const QUOTE_LOOKBACK_DAYS: u32 = 5;

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network error (connection failed, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Authentication error (invalid credentials, expired)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Rate limit exceeded
    #[error("Rate limited{}", .retry_after_secs.map(|s| format!(", retry after {} seconds", s)).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// Data not available for the requested symbol
    #[error("Data not available: {0}")]
    DataNotAvailable(String),

    /// Provider is unavailable (process failed to start or exited non-zero, HTTP 5xx)
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Call did not complete in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Upstream returned data that could not be normalized
    #[error("Malformed data: {0}")]
    Malformed(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream reported an error payload
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Internal provider error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Check if the error is recoverable (worth retrying later)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Unavailable(_) | Self::Timeout(_)
        )
    }
}

impl From<BarError> for ProviderError {
    fn from(err: BarError) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Fatal problems building a provider at startup.
#[derive(Debug, Error)]
pub enum ProviderInitError {
    #[error("Unknown provider '{0}', expected one of: tiger, yfinance, twelvedata")]
    UnknownProvider(String),

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),
}

// ============================================================================
// Candidate Query
// ============================================================================

/// Parameters for a provider's market scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateQuery {
    pub market: Market,
    pub category: ScannerCategory,
    pub limit: usize,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl CandidateQuery {
    pub fn new(market: Market, limit: usize) -> Self {
        Self {
            market,
            limit,
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: ScannerCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_price_band(mut self, min_price: Option<f64>, max_price: Option<f64>) -> Self {
        self.min_price = min_price;
        self.max_price = max_price;
        self
    }
}

impl Default for CandidateQuery {
    fn default() -> Self {
        Self {
            market: Market::US,
            category: ScannerCategory::TopVolume,
            limit: 20,
            min_price: None,
            max_price: None,
        }
    }
}

// ============================================================================
// Series Provider Trait
// ============================================================================

/// Trait for market data providers.
///
/// Implementations normalize upstream records into [`Series`] at their own
/// boundary: bars are always returned most-recent-first.
#[async_trait]
pub trait SeriesProvider: Send + Sync {
    /// Provider name (e.g., "tiger", "yfinance")
    fn name(&self) -> &'static str;

    /// Lightweight availability check.
    async fn health_check(&self) -> Result<(), ProviderError>;

    /// Fetch up to `lookback_days` of the most recent daily bars for a symbol.
    ///
    /// A symbol with no data yields an empty series rather than an error.
    async fn fetch_daily_series(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Series, ProviderError>;

    /// Ranked symbol list from the provider's market scanner.
    async fn scan_candidates(&self, query: &CandidateQuery) -> Result<Vec<String>, ProviderError>;

    /// Latest quote for a symbol.
    ///
    /// Default implementation derives it from the newest daily bar.
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        let series = self.fetch_daily_series(symbol, QUOTE_LOOKBACK_DAYS).await?;
        series
            .latest()
            .map(Quote::from_bar)
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("no bars for {}", symbol)))
    }

    /// Fetch series for several symbols at once.
    ///
    /// Default implementation loops over `fetch_daily_series` and skips
    /// symbols that fail. Only daily bars are supported by the default.
    async fn fetch_batch_series(
        &self,
        symbols: &[String],
        period: Period,
        count: usize,
    ) -> Result<Vec<Series>, ProviderError> {
        if period != Period::Day {
            return Err(ProviderError::InvalidRequest(format!(
                "{} does not support {} bars",
                self.name(),
                period
            )));
        }

        let mut result = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.fetch_daily_series(symbol, count as u32).await {
                Ok(series) => result.push(series),
                Err(e) => warn!(provider = self.name(), symbol = %symbol, error = %e, "Skipping symbol in batch"),
            }
        }
        Ok(result)
    }

    /// All symbols the provider knows about.
    ///
    /// Default implementation runs the scanner with the default query.
    async fn list_symbols(&self) -> Result<Vec<String>, ProviderError> {
        self.scan_candidates(&CandidateQuery::default()).await
    }
}

// ============================================================================
// Tests
// ============================================================================
