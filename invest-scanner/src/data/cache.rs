//! Series cache for market data.
//!
//! In-memory TTL cache for daily series, plus a [`CachingProvider`]
//! decorator that puts it in front of any [`SeriesProvider`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::provider::{CandidateQuery, ProviderError, SeriesProvider};
use super::{Period, Quote, Series};

/// Cache entry with TTL
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn new(data: T, ttl_secs: i64) -> Self {
        Self {
            data,
            expires_at: Utc::now() + Duration::seconds(ttl_secs),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Daily series cache keyed by "symbol:lookback".
///
/// Expired entries are swept on insert, at most once per TTL period.
pub struct SeriesCache {
    series: RwLock<HashMap<String, CacheEntry<Series>>>,
    ttl_secs: i64,
    last_sweep: RwLock<DateTime<Utc>>,
}

impl SeriesCache {
    pub fn with_ttl(ttl_secs: i64) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            ttl_secs,
            last_sweep: RwLock::new(Utc::now()),
        }
    }

    fn key(symbol: &str, lookback_days: u32) -> String {
        format!("{}:{}", symbol.to_uppercase(), lookback_days)
    }

    /// Get a cached series if present and not expired
    pub fn get(&self, symbol: &str, lookback_days: u32) -> Option<Series> {
        let key = Self::key(symbol, lookback_days);
        let cache = self.series.read().ok()?;

        cache
            .get(&key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.data.clone())
    }

    pub fn insert(&self, symbol: &str, lookback_days: u32, series: Series) {
        let key = Self::key(symbol, lookback_days);
        let entry = CacheEntry::new(series, self.ttl_secs);

        if self.sweep_due() {
            self.clear_expired();
        }

        if let Ok(mut cache) = self.series.write() {
            cache.insert(key, entry);
        }
    }

    fn sweep_due(&self) -> bool {
        let now = Utc::now();
        match self.last_sweep.write() {
            Ok(mut last) if now - *last >= Duration::seconds(self.ttl_secs) => {
                *last = now;
                true
            }
            _ => false,
        }
    }

    /// Drop every cached lookback for a symbol
    pub fn invalidate(&self, symbol: &str) {
        let prefix = format!("{}:", symbol.to_uppercase());
        if let Ok(mut cache) = self.series.write() {
            cache.retain(|k, _| !k.starts_with(&prefix));
        }
    }

    pub fn clear_expired(&self) {
        if let Ok(mut cache) = self.series.write() {
            cache.retain(|_, entry| !entry.is_expired());
        }
    }

    pub fn stats(&self) -> CacheStats {
        let (total, expired) = self
            .series
            .read()
            .map(|c| (c.len(), c.values().filter(|e| e.is_expired()).count()))
            .unwrap_or((0, 0));

        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}

// ============================================================================
// Caching Provider
// ============================================================================

/// Provider decorator caching successful daily series fetches.
///
/// Scanner candidates and quotes always go to the inner provider.
pub struct CachingProvider {
    inner: Arc<dyn SeriesProvider>,
    cache: SeriesCache,
}

impl CachingProvider {
    pub fn new(inner: Arc<dyn SeriesProvider>, ttl_secs: u64) -> Self {
        Self {
            inner,
            cache: SeriesCache::with_ttl(ttl_secs.min(i64::MAX as u64) as i64),
        }
    }

    pub fn cache(&self) -> &SeriesCache {
        &self.cache
    }
}

#[async_trait]
impl SeriesProvider for CachingProvider {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.inner.health_check().await
    }

    async fn fetch_daily_series(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Series, ProviderError> {
        if let Some(series) = self.cache.get(symbol, lookback_days) {
            debug!(symbol, lookback_days, "Series cache hit");
            return Ok(series);
        }

        let series = self.inner.fetch_daily_series(symbol, lookback_days).await?;
        self.cache.insert(symbol, lookback_days, series.clone());
        Ok(series)
    }

    async fn scan_candidates(&self, query: &CandidateQuery) -> Result<Vec<String>, ProviderError> {
        self.inner.scan_candidates(query).await
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        self.inner.fetch_quote(symbol).await
    }

    async fn fetch_batch_series(
        &self,
        symbols: &[String],
        period: Period,
        count: usize,
    ) -> Result<Vec<Series>, ProviderError> {
        self.inner.fetch_batch_series(symbols, period, count).await
    }

    async fn list_symbols(&self) -> Result<Vec<String>, ProviderError> {
        self.inner.list_symbols().await
    }
}

// ============================================================================
// Tests
// ============================================================================
