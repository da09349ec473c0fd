//! Market data module.
//!
//! Provides a uniform view over interchangeable market data backends.
//! Every adapter normalizes its upstream format into [`Bar`] records and
//! hands out [`Series`] ordered most-recent-first.
//!
//! # Data Sources
//! - **tiger**: Tiger brokerage open API over HTTP
//! - **yfinance**: Yahoo Finance through an external helper script
//! - **twelvedata**: Twelve Data through an external helper script

mod cache;
mod factory;
mod provider;
mod rate_limiter;
mod raw;
mod script;
mod tiger;

pub use cache::{CacheStats, CachingProvider, SeriesCache};
pub use factory::build_provider;
pub use provider::{CandidateQuery, ProviderError, ProviderInitError, SeriesProvider};
pub use rate_limiter::{shared_limiter, RateLimiter, SharedRateLimiter};
pub use raw::{BarError, RawBar};
pub use script::{ScriptFlavor, ScriptProvider, ScriptRunner};
pub use tiger::TigerAdapter;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Market / Category / Period
// ============================================================================

/// Exchange region a symbol trades in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Market {
    #[default]
    US,
    HK,
    CN,
}

impl Market {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::US => "US",
            Self::HK => "HK",
            Self::CN => "CN",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "US" => Ok(Self::US),
            "HK" => Ok(Self::HK),
            "CN" => Ok(Self::CN),
            other => Err(ProviderError::InvalidRequest(format!(
                "unsupported market '{}'",
                other
            ))),
        }
    }
}

/// Ranking used by a provider's market scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScannerCategory {
    #[default]
    TopVolume,
    TopGainer,
    TopLoser,
    TopMarketcap,
    TopDividend,
    Custom,
}

impl ScannerCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TopVolume => "TOP_VOLUME",
            Self::TopGainer => "TOP_GAINER",
            Self::TopLoser => "TOP_LOSER",
            Self::TopMarketcap => "TOP_MARKETCAP",
            Self::TopDividend => "TOP_DIVIDEND",
            Self::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for ScannerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScannerCategory {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "TOP_VOLUME" => Ok(Self::TopVolume),
            "TOP_GAINER" => Ok(Self::TopGainer),
            "TOP_LOSER" => Ok(Self::TopLoser),
            "TOP_MARKETCAP" | "TOP_MARKET_CAP" => Ok(Self::TopMarketcap),
            "TOP_DIVIDEND" => Ok(Self::TopDividend),
            "CUSTOM" => Ok(Self::Custom),
            other => Err(ProviderError::InvalidRequest(format!(
                "unsupported scanner category '{}'",
                other
            ))),
        }
    }
}

/// Bar period for batch requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Day,
    Week,
    Month,
}

impl Period {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "d" | "daily" | "1d" => Ok(Self::Day),
            "week" | "w" | "weekly" | "1w" => Ok(Self::Week),
            "month" | "m" | "monthly" | "1mo" => Ok(Self::Month),
            other => Err(ProviderError::InvalidRequest(format!(
                "unsupported period '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// Bar
// ============================================================================

/// A single daily OHLCV observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Symbol/ticker
    pub symbol: String,
    /// Bar open time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Shares traded
    pub volume: u64,
    /// Turnover in currency
    pub amount: f64,
}

impl Bar {
    /// Build a bar whose turnover is derived as `close * volume`.
    pub fn new(
        symbol: impl Into<String>,
        time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            time,
            open,
            high,
            low,
            close,
            volume,
            amount: close * volume as f64,
        }
    }

    /// Price change over the session.
    pub fn change(&self) -> f64 {
        self.close - self.open
    }

    /// Price change in percent of the open; 0 when the open is 0.
    pub fn change_percent(&self) -> f64 {
        if self.open == 0.0 {
            0.0
        } else {
            self.change() / self.open * 100.0
        }
    }
}

// ============================================================================
// Series
// ============================================================================

/// Daily bars for one symbol, ordered most-recent-first.
///
/// Index 0 is always the latest bar. The ordering is established by the
/// constructor, so adapters may hand in bars in any order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SeriesParts")]
pub struct Series {
    symbol: String,
    bars: Vec<Bar>,
}

#[derive(Deserialize)]
struct SeriesParts {
    symbol: String,
    #[serde(default)]
    bars: Vec<Bar>,
}

impl From<SeriesParts> for Series {
    fn from(parts: SeriesParts) -> Self {
        Self::new(parts.symbol, parts.bars)
    }
}

impl Series {
    pub fn new(symbol: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        bars.sort_by(|a, b| b.time.cmp(&a.time));
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn empty(symbol: impl Into<String>) -> Self {
        Self::new(symbol, Vec::new())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Most recent bar, if any.
    pub fn latest(&self) -> Option<&Bar> {
        self.bars.first()
    }

    /// Volumes in series order (most recent first).
    pub fn volumes(&self) -> Vec<u64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    /// Keep only the `n` most recent bars.
    pub fn truncate(&mut self, n: usize) {
        self.bars.truncate(n);
    }
}

// ============================================================================
// Quote
// ============================================================================

/// Latest price snapshot for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    pub current_price: f64,
    #[serde(default)]
    pub open_price: f64,
    #[serde(default)]
    pub high_price: f64,
    #[serde(default)]
    pub low_price: f64,
    #[serde(default)]
    pub volume: u64,
    #[serde(default)]
    pub change: f64,
    #[serde(default)]
    pub change_percent: f64,
}

impl Quote {
    /// Derive a quote from a daily bar.
    pub fn from_bar(bar: &Bar) -> Self {
        Self {
            symbol: bar.symbol.clone(),
            name: None,
            current_price: bar.close,
            open_price: bar.open,
            high_price: bar.high,
            low_price: bar.low,
            volume: bar.volume,
            change: bar.change(),
            change_percent: bar.change_percent(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar_on(day: u32, volume: u64) -> Bar {
        let time = Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap();
        Bar::new("SNDL", time, 0.10, 0.12, 0.09, 0.11, volume)
    }

    #[test]
    fn test_bar_amount_derived() {
        let bar = bar_on(1, 1000);
        assert!((bar.amount - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_bar_change_percent() {
        let bar = bar_on(1, 1000);
        assert!((bar.change() - 0.01).abs() < 1e-9);
        assert!((bar.change_percent() - 10.0).abs() < 1e-6);

        let flat = Bar::new("X", Utc::now(), 0.0, 0.0, 0.0, 0.0, 0);
        assert_eq!(flat.change_percent(), 0.0);
    }

    #[test]
    fn test_series_sorted_most_recent_first() {
        let series = Series::new("SNDL", vec![bar_on(1, 10), bar_on(3, 30), bar_on(2, 20)]);
        assert_eq!(series.volumes(), vec![30, 20, 10]);
        assert_eq!(series.latest().unwrap().volume, 30);
    }

    #[test]
    fn test_series_truncate_keeps_recent() {
        let mut series = Series::new("SNDL", (1..=10).map(|d| bar_on(d, d as u64)).collect());
        series.truncate(3);
        assert_eq!(series.volumes(), vec![10, 9, 8]);
    }

    #[test]
    fn test_series_deserialize_reorders() {
        let json = r#"{"symbol":"SNDL","bars":[
            {"symbol":"SNDL","time":1709251200000,"open":1,"high":1,"low":1,"close":1,"volume":5,"amount":5},
            {"symbol":"SNDL","time":1709337600000,"open":1,"high":1,"low":1,"close":1,"volume":6,"amount":6}
        ]}"#;
        let series: Series = serde_json::from_str(json).unwrap();
        assert_eq!(series.volumes(), vec![6, 5]);
    }

    #[test]
    fn test_market_parse() {
        assert_eq!("us".parse::<Market>().unwrap(), Market::US);
        assert_eq!(" HK ".parse::<Market>().unwrap(), Market::HK);
        assert!(matches!(
            "JP".parse::<Market>(),
            Err(ProviderError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_category_parse_and_serde() {
        assert_eq!(
            "top_gainer".parse::<ScannerCategory>().unwrap(),
            ScannerCategory::TopGainer
        );
        assert_eq!(
            "TOP-MARKETCAP".parse::<ScannerCategory>().unwrap(),
            ScannerCategory::TopMarketcap
        );
        assert!("TOP_PE".parse::<ScannerCategory>().is_err());
        assert_eq!(
            serde_json::to_string(&ScannerCategory::TopDividend).unwrap(),
            "\"TOP_DIVIDEND\""
        );
    }

    #[test]
    fn test_period_parse() {
        assert_eq!("day".parse::<Period>().unwrap(), Period::Day);
        assert_eq!("Weekly".parse::<Period>().unwrap(), Period::Week);
        assert_eq!("1mo".parse::<Period>().unwrap(), Period::Month);
        assert!("hour".parse::<Period>().is_err());
    }

    #[test]
    fn test_quote_from_bar() {
        let quote = Quote::from_bar(&bar_on(5, 4200));
        assert_eq!(quote.symbol, "SNDL");
        assert_eq!(quote.current_price, 0.11);
        assert_eq!(quote.volume, 4200);
        assert!(quote.name.is_none());

        let json = serde_json::to_value(&quote).unwrap();
        assert!(json.get("currentPrice").is_some());
        assert!(json.get("changePercent").is_some());
    }
}
