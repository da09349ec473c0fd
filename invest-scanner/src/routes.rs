//! HTTP API routes.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::Uri,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use invest_common::Config;

use crate::data::{CandidateQuery, Market, Period, ScannerCategory, SeriesProvider};
use crate::error::ApiError;
use crate::screener::{ScanPolicy, ScanRequest, VolumeScanner};

/// Limit used by the fixed-size scan endpoint.
const FIXSTOCK_LIMIT: usize = 20;

/// Bars returned by the batch endpoint when the request omits a count.
const DEFAULT_BATCH_COUNT: usize = 30;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub provider: Arc<dyn SeriesProvider>,
    pub scanner: Arc<VolumeScanner>,
}

impl AppState {
    pub fn new(config: Config, provider: Arc<dyn SeriesProvider>) -> Self {
        let scanner = VolumeScanner::new(Arc::clone(&provider), ScanPolicy::from(&config.scanner));
        Self::with_scanner(config, provider, scanner)
    }

    pub fn with_scanner(
        config: Config,
        provider: Arc<dyn SeriesProvider>,
        scanner: VolumeScanner,
    ) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            scanner: Arc::new(scanner),
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Volume pattern scans
        .route("/scan/low-price-volume-pattern", get(scan_volume_pattern))
        .route("/scan/low-price-volume-pattern/fixstock", get(scan_volume_pattern_fixed))
        // Provider scanner passthrough
        .route("/scanner/custom", post(custom_scan))
        // Market data
        .route("/kline/daily/:symbol", get(daily_kline))
        .route("/kline/batch", post(batch_kline))
        .route("/quote/:symbol", get(quote))
        .route("/stocks", get(list_stocks))
        .fallback(not_found)
        .with_state(state)
}

// ============ Health Check ============

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "invest-scanner",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": state.provider.name()
    }))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("no route for {}", uri.path()))
}

// ============ Scans ============

#[derive(Debug, Deserialize)]
struct ScanQuery {
    limit: Option<usize>,
}

async fn scan_volume_pattern(
    State(state): State<AppState>,
    query: Result<Query<ScanQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(state.config.scanner.default_limit);
    run_scan(&state, limit).await
}

async fn scan_volume_pattern_fixed(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    run_scan(&state, FIXSTOCK_LIMIT).await
}

async fn run_scan(state: &AppState, limit: usize) -> Result<impl IntoResponse, ApiError> {
    let request = ScanRequest::from_config(&state.config.scanner)
        .map_err(|e| invest_common::Error::Config(e.to_string()).with_context("scanner.market"))?
        .with_limit(limit);
    let outcome = state.scanner.run(&request).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomScanRequest {
    market: Option<String>,
    category: Option<String>,
    limit: Option<usize>,
    min_price: Option<f64>,
    max_price: Option<f64>,
}

async fn custom_scan(
    State(state): State<AppState>,
    request: Result<Json<CustomScanRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let market = match request.market.as_deref() {
        Some(market) => market.parse::<Market>()?,
        None => Market::default(),
    };
    let category = match request.category.as_deref() {
        Some(category) => category.parse::<ScannerCategory>()?,
        None => ScannerCategory::default(),
    };

    let query = CandidateQuery::new(market, request.limit.unwrap_or(20))
        .with_category(category)
        .with_price_band(request.min_price, request.max_price);

    tracing::info!(
        market = %query.market,
        category = %query.category,
        limit = query.limit,
        min_price = ?query.min_price,
        max_price = ?query.max_price,
        "Custom stock scan"
    );

    let symbols = state.provider.scan_candidates(&query).await?;
    Ok(Json(symbols))
}

// ============ Market Data ============

#[derive(Debug, Deserialize)]
struct KlineQuery {
    days: Option<u32>,
}

async fn daily_kline(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    query: Result<Query<KlineQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let days = query.days.unwrap_or(state.config.scanner.lookback_days);
    if days == 0 {
        return Err(ApiError::invalid("days must be greater than 0"));
    }

    let series = state.provider.fetch_daily_series(&symbol, days).await?;
    Ok(Json(series))
}

async fn quote(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let quote = state.provider.fetch_quote(&symbol).await?;
    Ok(Json(quote))
}

#[derive(Debug, Deserialize)]
struct BatchKlineRequest {
    symbols: Vec<String>,
    period: Option<String>,
    count: Option<usize>,
}

async fn batch_kline(
    State(state): State<AppState>,
    request: Result<Json<BatchKlineRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;
    let symbols: Vec<String> = request
        .symbols
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if symbols.is_empty() {
        return Err(ApiError::invalid("symbols must not be empty"));
    }

    let period = match request.period.as_deref() {
        Some(period) => period.parse::<Period>()?,
        None => Period::default(),
    };
    let count = request.count.unwrap_or(DEFAULT_BATCH_COUNT);
    if count == 0 {
        return Err(ApiError::invalid("count must be greater than 0"));
    }

    let series = state
        .provider
        .fetch_batch_series(&symbols, period, count)
        .await?;
    Ok(Json(series))
}

async fn list_stocks(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let symbols = state.provider.list_symbols().await?;
    Ok(Json(symbols))
}
