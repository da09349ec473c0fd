//! Integration tests for the Tiger open API adapter against a mock gateway.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use invest_scanner::data::{
    CandidateQuery, Market, Period, ProviderError, ScannerCategory, SeriesProvider, TigerAdapter,
};

/// 2024-03-11T00:00:00Z in epoch milliseconds
const LATEST_MS: i64 = 1_710_115_200_000;
const DAY_MS: i64 = 86_400_000;

fn adapter(server: &MockServer) -> TigerAdapter {
    TigerAdapter::new(
        format!("{}/gateway", server.uri()),
        "20150001",
        "DU575569",
        6000,
        Duration::from_secs(5),
    )
}

/// Kline items oldest-first, the way the gateway returns them.
fn kline_items(volumes: &[u64]) -> Vec<serde_json::Value> {
    let n = volumes.len() as i64;
    volumes
        .iter()
        .enumerate()
        .map(|(i, v)| {
            json!({
                "time": LATEST_MS - (n - 1 - i as i64) * DAY_MS,
                "open": 0.1,
                "high": 0.12,
                "low": 0.09,
                "close": 0.11,
                "volume": v,
            })
        })
        .collect()
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": 0,
        "message": "success",
        "data": data,
    }))
}

#[tokio::test]
async fn test_daily_series_is_normalized_descending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gateway"))
        .and(body_partial_json(json!({
            "method": "kline",
            "tiger_id": "20150001",
            "account": "DU575569",
            "version": "2.0",
        })))
        .and(body_string_contains("SNDL"))
        .respond_with(ok(json!([
            {"symbol": "SNDL", "items": kline_items(&[140, 95, 65, 45, 30, 20, 10])}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let series = adapter(&server).fetch_daily_series("SNDL", 30).await.unwrap();

    assert_eq!(series.symbol(), "SNDL");
    assert_eq!(series.volumes(), vec![10, 20, 30, 45, 65, 95, 140]);
    assert_eq!(series.latest().unwrap().time.timestamp_millis(), LATEST_MS);
}

#[tokio::test]
async fn test_unknown_symbol_yields_empty_series() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;

    let series = adapter(&server).fetch_daily_series("NOPE", 30).await.unwrap();
    assert!(series.is_empty());
    assert_eq!(series.symbol(), "NOPE");
}

#[tokio::test]
async fn test_malformed_bar_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok(json!([
            {"symbol": "SNDL", "items": [{"time": LATEST_MS, "open": 0.1, "high": 0.1, "low": 0.1, "close": 0.1}]}
        ])))
        .mount(&server)
        .await;

    let err = adapter(&server).fetch_daily_series("SNDL", 30).await.unwrap_err();
    assert!(matches!(err, ProviderError::Malformed(ref m) if m.contains("volume")));
}

#[tokio::test]
async fn test_scan_candidates_sends_filter_and_sort() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "market_scanner"})))
        .and(body_string_contains("CurPrice"))
        .and(body_string_contains("Volume"))
        .respond_with(ok(json!({
            "page": 0,
            "items": [{"symbol": "SNDL"}, {"symbol": "NAKD"}, {"market": "US"}, {"symbol": "GNUS"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = CandidateQuery::new(Market::US, 2).with_price_band(Some(0.05), Some(0.2));
    let symbols = adapter(&server).scan_candidates(&query).await.unwrap();

    assert_eq!(symbols, vec!["SNDL", "NAKD"]);
}

#[tokio::test]
async fn test_scan_candidates_accepts_array_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok(json!([{"symbol": "AAPL"}, {"symbol": "MSFT"}])))
        .mount(&server)
        .await;

    let query = CandidateQuery::new(Market::US, 10).with_category(ScannerCategory::TopGainer);
    let symbols = adapter(&server).scan_candidates(&query).await.unwrap();

    assert_eq!(symbols, vec!["AAPL", "MSFT"]);
}

#[tokio::test]
async fn test_non_zero_code_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 1010,
            "message": "biz param error"
        })))
        .mount(&server)
        .await;

    let err = adapter(&server).fetch_daily_series("SNDL", 30).await.unwrap_err();
    assert!(matches!(err, ProviderError::Upstream(ref m) if m.contains("biz param error")));
}

#[tokio::test]
async fn test_http_status_mapping() {
    let cases = [
        (401, "auth"),
        (429, "rate"),
        (503, "unavailable"),
        (404, "upstream"),
    ];

    for (status, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let err = adapter(&server).fetch_daily_series("SNDL", 30).await.unwrap_err();
        let matched = match (&err, expected) {
            (ProviderError::Auth(_), "auth") => true,
            (ProviderError::RateLimited { retry_after_secs: Some(2) }, "rate") => true,
            (ProviderError::Unavailable(_), "unavailable") => true,
            (ProviderError::Upstream(_), "upstream") => true,
            _ => false,
        };
        assert!(matched, "HTTP {} mapped to {:?}", status, err);
    }
}

#[tokio::test]
async fn test_slow_gateway_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok(json!([])).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let adapter = TigerAdapter::new(
        format!("{}/gateway", server.uri()),
        "20150001",
        "DU575569",
        6000,
        Duration::from_millis(200),
    );

    let err = adapter.fetch_daily_series("SNDL", 30).await.unwrap_err();
    assert!(matches!(err, ProviderError::Timeout(_)));
}

#[tokio::test]
async fn test_scanner_failure_uses_fallback_symbols() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fallback: Vec<String> = ["AAPL", "MSFT", "GOOGL"].iter().map(|s| s.to_string()).collect();
    let adapter = adapter(&server).with_fallback_symbols(fallback);

    let symbols = adapter
        .scan_candidates(&CandidateQuery::new(Market::US, 2))
        .await
        .unwrap();
    assert_eq!(symbols, vec!["AAPL", "MSFT"]);
}

#[tokio::test]
async fn test_scanner_failure_without_fallback_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .scan_candidates(&CandidateQuery::new(Market::US, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(_)));
}

#[tokio::test]
async fn test_batch_series_single_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "kline"})))
        .and(body_string_contains("week"))
        .respond_with(ok(json!([
            {"symbol": "AAPL", "items": kline_items(&[1, 2, 3, 4])},
            {"symbol": "MSFT", "items": kline_items(&[5, 6])}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
    let batch = adapter(&server)
        .fetch_batch_series(&symbols, Period::Week, 3)
        .await
        .unwrap();

    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].volumes(), vec![4, 3, 2]);
    assert_eq!(batch[1].volumes(), vec![6, 5]);
}

#[tokio::test]
async fn test_quote_and_health_from_kline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok(json!([
            {"symbol": "AAPL", "items": kline_items(&[900, 1000])}
        ])))
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    adapter.health_check().await.unwrap();

    let quote = adapter.fetch_quote("AAPL").await.unwrap();
    assert_eq!(quote.symbol, "AAPL");
    assert_eq!(quote.volume, 1000);
    assert_eq!(quote.current_price, 0.11);
}
