//! Scan configuration.
//!
//! [`ScanPolicy`] holds the operator-tuned knobs (batching, pacing,
//! concurrency); [`ScanRequest`] holds what a single caller asks for.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use invest_common::config::ScannerConfig;

use super::pattern::PATTERN_WINDOW;
use crate::data::{CandidateQuery, Market, ProviderError, ScannerCategory};

// ============================================================================
// Scan Policy
// ============================================================================

/// How a scan is executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPolicy {
    /// Candidates requested per wanted match
    pub overfetch_factor: usize,
    /// Symbols per batch
    pub batch_size: usize,
    /// Pause between consecutive batches
    pub batch_delay: Duration,
    /// Concurrent series fetches inside a batch (1 = sequential)
    pub concurrency: usize,
    /// Minimum bars before a series is evaluated
    pub min_bars: usize,
    /// Daily bars requested per symbol
    pub lookback_days: u32,
    /// Overall deadline; partial results are returned when it elapses
    pub scan_timeout: Option<Duration>,
    /// Candidate-fetch failure becomes an error instead of an empty result
    pub strict_candidates: bool,
    /// Drop repeated candidate symbols
    pub dedupe_candidates: bool,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self::from(&ScannerConfig::default())
    }
}

impl From<&ScannerConfig> for ScanPolicy {
    fn from(config: &ScannerConfig) -> Self {
        let min_bars = config.min_bars.max(PATTERN_WINDOW);
        Self {
            overfetch_factor: config.overfetch_factor.max(1),
            batch_size: config.batch_size.max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            concurrency: config.concurrency.max(1),
            min_bars,
            lookback_days: config.lookback_days.max(min_bars as u32),
            scan_timeout: config.scan_timeout_secs.map(Duration::from_secs),
            strict_candidates: config.strict_candidates,
            dedupe_candidates: config.dedupe_candidates,
        }
    }
}

impl ScanPolicy {
    /// Disable inter-batch pacing.
    pub fn without_delay(mut self) -> Self {
        self.batch_delay = Duration::ZERO;
        self
    }

    /// Candidate list size for a wanted match count.
    pub fn candidate_count(&self, limit: usize) -> usize {
        limit.saturating_mul(self.overfetch_factor)
    }
}

// ============================================================================
// Scan Request
// ============================================================================

/// A single low-price volume-pattern scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub market: Market,
    /// Matches wanted; the scan stops once this many are found
    pub limit: usize,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            market: Market::US,
            limit: 20,
            min_price: Some(0.05),
            max_price: Some(0.2),
        }
    }
}

impl ScanRequest {
    /// Build a request from the configured defaults.
    pub fn from_config(config: &ScannerConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            market: config.market.parse()?,
            limit: config.default_limit,
            min_price: Some(config.min_price),
            max_price: Some(config.max_price),
        })
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Scanner query for `count` candidates ranked by volume.
    pub fn candidate_query(&self, count: usize) -> CandidateQuery {
        CandidateQuery::new(self.market, count)
            .with_category(ScannerCategory::TopVolume)
            .with_price_band(self.min_price, self.max_price)
    }
}
