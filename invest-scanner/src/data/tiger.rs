//! Tiger brokerage open API adapter.
//!
//! # Protocol
//! Every call is a JSON `POST` to the configured gateway:
//!
//! ```text
//! {"tiger_id", "account", "method", "version", "timestamp", "biz_content"}
//! ```
//!
//! `biz_content` is itself a JSON string. Responses use the envelope
//! `{"code": 0, "message": "...", "data": ...}`; any non-zero code is an
//! upstream error.
//!
//! # Methods used
//! - `kline`: daily (or weekly/monthly) bars for one or more symbols
//! - `market_scanner`: ranked symbol list with an optional price filter
//!
//! Request signing is handled by the gateway in front of the open API; this
//! adapter only needs the account identifiers.
//!
//! # Rate Limits
//! Proactive token bucket limiting, 60 requests/minute by default.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use invest_common::config::TigerConfig;

use super::provider::{CandidateQuery, ProviderError, ProviderInitError, SeriesProvider};
use super::rate_limiter::{RateLimiter, SharedRateLimiter};
use super::raw::RawBar;
use super::{Period, ScannerCategory, Series};

// ============================================================================
// Constants
// ============================================================================

/// Open API protocol version
const API_VERSION: &str = "2.0";

const METHOD_KLINE: &str = "kline";

const METHOD_MARKET_SCANNER: &str = "market_scanner";

/// Retry hint after an HTTP 429
const RATE_LIMIT_RETRY_SECS: u64 = 2;

/// Symbol used by the health check
const HEALTH_CHECK_SYMBOL: &str = "AAPL";

// ============================================================================
// Category Mapping
// ============================================================================

/// Scanner sort field and direction for a category.
fn category_sort(category: ScannerCategory) -> Option<(&'static str, &'static str)> {
    match category {
        ScannerCategory::TopVolume => Some(("Volume", "SortDir_Descend")),
        ScannerCategory::TopGainer => Some(("ChangeRate", "SortDir_Descend")),
        ScannerCategory::TopLoser => Some(("ChangeRate", "SortDir_Ascend")),
        ScannerCategory::TopMarketcap => Some(("MarketValue", "SortDir_Descend")),
        ScannerCategory::TopDividend => Some(("DivideRate", "SortDir_Descend")),
        ScannerCategory::Custom => None,
    }
}

// ============================================================================
// Tiger Adapter
// ============================================================================

/// Tiger open API adapter.
pub struct TigerAdapter {
    endpoint: String,
    tiger_id: String,
    account: String,
    client: reqwest::Client,
    rate_limiter: SharedRateLimiter,
    /// Symbols returned when the market scanner fails
    fallback_symbols: Vec<String>,
}

impl TigerAdapter {
    pub fn new(
        endpoint: impl Into<String>,
        tiger_id: impl Into<String>,
        account: impl Into<String>,
        rate_limit_rpm: u32,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            endpoint: endpoint.into(),
            tiger_id: tiger_id.into(),
            account: account.into(),
            client,
            rate_limiter: Arc::new(RateLimiter::new("tiger", rate_limit_rpm)),
            fallback_symbols: Vec::new(),
        }
    }

    /// Create from config. Missing credentials are a fatal init error.
    pub fn from_config(config: &TigerConfig) -> Result<Self, ProviderInitError> {
        fn credential(
            value: &Option<String>,
            name: &'static str,
        ) -> Result<String, ProviderInitError> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
                .ok_or(ProviderInitError::MissingCredential(name))
        }

        let tiger_id = credential(&config.tiger_id, "tiger_id")?;
        let account = credential(&config.account, "account")?;
        credential(&config.private_key, "private_key")?;

        if config.endpoint.trim().is_empty() {
            return Err(ProviderInitError::InvalidConfig(
                "tiger endpoint is empty".into(),
            ));
        }

        Ok(Self::new(
            config.endpoint.clone(),
            tiger_id,
            account,
            config.rate_limit_rpm,
            Duration::from_secs(config.timeout_secs),
        )
        .with_fallback_symbols(config.fallback_symbols.clone()))
    }

    pub fn with_fallback_symbols(mut self, symbols: Vec<String>) -> Self {
        self.fallback_symbols = symbols;
        self
    }

    /// Call an open API method and return the `data` field.
    async fn call(&self, method: &str, biz_content: Value) -> Result<Value, ProviderError> {
        let body = json!({
            "tiger_id": self.tiger_id,
            "account": self.account,
            "method": method,
            "version": API_VERSION,
            "timestamp": Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            "biz_content": biz_content.to_string(),
        });

        self.rate_limiter.acquire().await;

        debug!(method, endpoint = %self.endpoint, "Calling Tiger open API");

        let response = self
            .client
            .post(&self.endpoint)
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(format!("tiger {}", method))
                } else if e.is_connect() {
                    ProviderError::Network("Connection failed".into())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::Auth(format!("HTTP {}", status)));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
            });
        }

        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!("HTTP {}: {}", status, body)));
        }

        let envelope: TigerResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Failed to parse response: {}", e)))?;

        if envelope.code != 0 {
            let message = envelope.message.unwrap_or_else(|| "Unknown error".to_string());
            return Err(ProviderError::Upstream(format!(
                "code {}: {}",
                envelope.code, message
            )));
        }

        Ok(envelope.data.unwrap_or(Value::Null))
    }

    /// Fetch bars for several symbols in one call.
    async fn fetch_kline(
        &self,
        symbols: &[String],
        period: Period,
        limit: usize,
    ) -> Result<Vec<Series>, ProviderError> {
        let data = self
            .call(
                METHOD_KLINE,
                json!({
                    "symbols": symbols,
                    "period": period.as_str(),
                    "limit": limit,
                }),
            )
            .await?;

        let items: Vec<TigerKline> = match data {
            Value::Null => Vec::new(),
            other => serde_json::from_value(other)
                .map_err(|e| ProviderError::Malformed(format!("kline data: {}", e)))?,
        };

        items
            .into_iter()
            .map(|kline| {
                let bars = kline
                    .items
                    .iter()
                    .map(|raw| raw.normalize(&kline.symbol))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut series = Series::new(kline.symbol, bars);
                series.truncate(limit);
                Ok(series)
            })
            .collect()
    }

    async fn market_scanner(&self, query: &CandidateQuery) -> Result<Vec<String>, ProviderError> {
        let mut biz = json!({
            "market": query.market.as_str(),
            "page": 0,
            "page_size": query.limit,
        });

        if let Some((field, direction)) = category_sort(query.category) {
            biz["sort_field_data"] = json!({
                "field_name": field,
                "sort_dir": direction,
            });
        }

        if query.min_price.is_some() || query.max_price.is_some() {
            let mut filter = json!({ "field_name": "CurPrice" });
            if let Some(min) = query.min_price {
                filter["filter_min"] = json!(min);
            }
            if let Some(max) = query.max_price {
                filter["filter_max"] = json!(max);
            }
            biz["base_filter_list"] = json!([filter]);
        }

        let data = self.call(METHOD_MARKET_SCANNER, biz).await?;

        let items = match data {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("items") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        let mut symbols: Vec<String> = items
            .iter()
            .filter_map(|item| item.get("symbol").and_then(Value::as_str))
            .map(String::from)
            .collect();
        symbols.truncate(query.limit);
        Ok(symbols)
    }
}

// ============================================================================
// SeriesProvider Implementation
// ============================================================================

#[async_trait]
impl SeriesProvider for TigerAdapter {
    fn name(&self) -> &'static str {
        "tiger"
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let series = self
            .fetch_kline(&[HEALTH_CHECK_SYMBOL.to_string()], Period::Day, 1)
            .await?;

        if series.iter().all(|s| s.is_empty()) {
            return Err(ProviderError::Unavailable(
                "Health check returned no data".into(),
            ));
        }

        Ok(())
    }

    async fn fetch_daily_series(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Series, ProviderError> {
        let series = self
            .fetch_kline(&[symbol.to_string()], Period::Day, lookback_days as usize)
            .await?;

        Ok(series
            .into_iter()
            .find(|s| s.symbol().eq_ignore_ascii_case(symbol))
            .unwrap_or_else(|| Series::empty(symbol)))
    }

    async fn scan_candidates(&self, query: &CandidateQuery) -> Result<Vec<String>, ProviderError> {
        match self.market_scanner(query).await {
            Ok(symbols) => Ok(symbols),
            Err(e) if !self.fallback_symbols.is_empty() => {
                warn!(
                    error = %e,
                    fallback = self.fallback_symbols.len(),
                    "Market scanner failed, using fallback symbol list"
                );
                Ok(self
                    .fallback_symbols
                    .iter()
                    .take(query.limit)
                    .cloned()
                    .collect())
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_batch_series(
        &self,
        symbols: &[String],
        period: Period,
        count: usize,
    ) -> Result<Vec<Series>, ProviderError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_kline(symbols, period, count).await
    }
}

// ============================================================================
// API Response Types
// ============================================================================

/// Open API response envelope
#[derive(Debug, Deserialize)]
struct TigerResponse {
    /// Response code (0 = success)
    code: i64,
    #[serde(default, alias = "msg")]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Bars for one symbol
#[derive(Debug, Deserialize)]
struct TigerKline {
    symbol: String,
    #[serde(default)]
    items: Vec<RawBar>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> TigerConfig {
        TigerConfig {
            tiger_id: Some("20150001".into()),
            account: Some("DU575569".into()),
            private_key: Some("MIIEvQ".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_category_sort() {
        assert_eq!(
            category_sort(ScannerCategory::TopVolume),
            Some(("Volume", "SortDir_Descend"))
        );
        assert_eq!(
            category_sort(ScannerCategory::TopLoser),
            Some(("ChangeRate", "SortDir_Ascend"))
        );
        assert_eq!(category_sort(ScannerCategory::Custom), None);
    }

    #[test]
    fn test_from_config() {
        let adapter = TigerAdapter::from_config(&credentials()).unwrap();
        assert_eq!(adapter.name(), "tiger");
        assert_eq!(adapter.tiger_id, "20150001");
        assert!(adapter.fallback_symbols.is_empty());
    }

    #[test]
    fn test_from_config_missing_credentials() {
        let mut config = credentials();
        config.private_key = None;
        assert!(matches!(
            TigerAdapter::from_config(&config),
            Err(ProviderInitError::MissingCredential("private_key"))
        ));

        let mut config = credentials();
        config.tiger_id = Some("   ".into());
        assert!(matches!(
            TigerAdapter::from_config(&config),
            Err(ProviderInitError::MissingCredential("tiger_id"))
        ));
    }

    #[test]
    fn test_envelope_accepts_msg_alias() {
        let envelope: TigerResponse =
            serde_json::from_str(r#"{"code": 1000, "msg": "common param error"}"#).unwrap();
        assert_eq!(envelope.code, 1000);
        assert_eq!(envelope.message.as_deref(), Some("common param error"));
        assert!(envelope.data.is_none());
    }
}
