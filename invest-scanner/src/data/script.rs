//! Script-backed market data providers (yfinance, twelvedata).
//!
//! Each call spawns `<interpreter> <script> <command> <args...>` and reads a
//! single JSON document from stdout. Supported commands:
//!
//! | Command | Arguments | Output |
//! |---------|-----------|--------|
//! | `get_daily_kline` | `SYMBOL DAYS` | `{"symbol", "items": [bar...]}` |
//! | `get_batch_kline` | `SYM1,SYM2 PERIOD COUNT` | `[{"symbol", "items"}...]` |
//! | `scan_stocks` | `MARKET LIMIT MIN MAX` | `["SYM"...]` |
//! | `get_stock_info` | `SYMBOL` | quote object |
//! | `get_stock_list` | | `["SYM"...]` |
//!
//! A failing script prints `{"error": "..."}`. A non-zero exit code means
//! the provider is unavailable.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use invest_common::config::ScriptConfig;

use super::provider::{CandidateQuery, ProviderError, SeriesProvider};
use super::raw::RawBar;
use super::{Period, Quote, Series};

// ============================================================================
// Script Runner
// ============================================================================

/// Runs one helper script and decodes its JSON output.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    interpreter: String,
    script: PathBuf,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl ScriptRunner {
    pub fn new(interpreter: impl Into<String>, script: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
            timeout,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run `command` with `args` and return the decoded JSON payload.
    pub async fn run(&self, command: &str, args: &[String]) -> Result<Value, ProviderError> {
        let mut cmd = self.command();
        cmd.arg(&self.script).arg(command).args(args);

        debug!(
            interpreter = %self.interpreter,
            script = %self.script.display(),
            command,
            ?args,
            "Running market data script"
        );

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ProviderError::Unavailable(format!(
                    "failed to start {}: {}",
                    self.interpreter, e
                )))
            }
            Err(_) => {
                return Err(ProviderError::Timeout(format!(
                    "{} {} after {}s",
                    self.script.display(),
                    command,
                    self.timeout.as_secs_f64()
                )))
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            return Err(ProviderError::Unavailable(format!(
                "script exited with code {}: {}",
                code,
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            debug!(command, stderr = %stderr.trim(), "Script wrote to stderr");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value = parse_output(&stdout)?;

        if let Some(message) = error_message(&value) {
            return Err(ProviderError::Upstream(message));
        }

        Ok(value)
    }

    /// Check the interpreter starts and the script file exists.
    pub async fn probe(&self) -> Result<(), ProviderError> {
        let mut cmd = self.command();
        cmd.arg("--version");

        let status = tokio::time::timeout(self.timeout, cmd.status())
            .await
            .map_err(|_| ProviderError::Timeout(format!("{} --version", self.interpreter)))?
            .map_err(|e| {
                ProviderError::Unavailable(format!("{} is not runnable: {}", self.interpreter, e))
            })?;

        if !status.success() {
            return Err(ProviderError::Unavailable(format!(
                "{} --version exited with {}",
                self.interpreter, status
            )));
        }

        let script = match &self.working_dir {
            Some(dir) if self.script.is_relative() => dir.join(&self.script),
            _ => self.script.clone(),
        };
        tokio::fs::metadata(&script).await.map_err(|e| {
            ProviderError::Unavailable(format!("script {} not found: {}", script.display(), e))
        })?;

        Ok(())
    }
}

/// Decode script stdout, tolerating diagnostic lines printed before the payload.
fn parse_output(stdout: &str) -> Result<Value, ProviderError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::Malformed("script produced no output".into()));
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    trimmed
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| serde_json::from_str(line).ok())
        .ok_or_else(|| {
            let preview: String = trimmed.chars().take(200).collect();
            ProviderError::Malformed(format!("script output is not JSON: {}", preview))
        })
}

fn error_message(value: &Value) -> Option<String> {
    let error = value.as_object()?.get("error")?;
    Some(match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

// ============================================================================
// Output Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct KlinePayload {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    items: Vec<RawBar>,
}

fn series_from_value(symbol: &str, value: Value) -> Result<Series, ProviderError> {
    let (symbol, items) = match value {
        Value::Array(_) => {
            let items: Vec<RawBar> = serde_json::from_value(value)
                .map_err(|e| ProviderError::Malformed(format!("kline items: {}", e)))?;
            (symbol.to_string(), items)
        }
        other => {
            let payload: KlinePayload = serde_json::from_value(other)
                .map_err(|e| ProviderError::Malformed(format!("kline payload: {}", e)))?;
            (payload.symbol.unwrap_or_else(|| symbol.to_string()), payload.items)
        }
    };

    let bars = items
        .iter()
        .map(|raw| raw.normalize(&symbol))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Series::new(symbol, bars))
}

/// Accepts `["A", "B"]`, `[{"symbol": "A"}]` or `{"symbols": [...]}`.
fn symbols_from_value(value: Value) -> Result<Vec<String>, ProviderError> {
    let list = match value {
        Value::Array(list) => list,
        Value::Object(mut map) => match map.remove("symbols").or_else(|| map.remove("items")) {
            Some(Value::Array(list)) => list,
            _ => {
                return Err(ProviderError::Malformed(
                    "symbol list object has no 'symbols' array".into(),
                ))
            }
        },
        other => {
            return Err(ProviderError::Malformed(format!(
                "expected a symbol list, got {}",
                other
            )))
        }
    };

    Ok(list
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            Value::Object(mut map) => match map.remove("symbol") {
                Some(Value::String(s)) => Some(s),
                _ => None,
            },
            _ => None,
        })
        .filter(|s| !s.trim().is_empty())
        .collect())
}

fn format_price(price: Option<f64>) -> String {
    price.map(|p| p.to_string()).unwrap_or_default()
}

// ============================================================================
// Script Provider
// ============================================================================

/// Which upstream a helper script talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFlavor {
    YFinance,
    TwelveData,
}

impl ScriptFlavor {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::YFinance => "yfinance",
            Self::TwelveData => "twelvedata",
        }
    }
}

/// Market data provider backed by an external helper script.
pub struct ScriptProvider {
    flavor: ScriptFlavor,
    runner: ScriptRunner,
}

impl ScriptProvider {
    pub fn new(flavor: ScriptFlavor, runner: ScriptRunner) -> Self {
        Self { flavor, runner }
    }

    /// Create from the script section of the config
    pub fn from_config(flavor: ScriptFlavor, config: &ScriptConfig) -> Self {
        let script = match flavor {
            ScriptFlavor::YFinance => &config.yfinance_script,
            ScriptFlavor::TwelveData => &config.twelvedata_script,
        };

        let mut runner = ScriptRunner::new(
            config.interpreter.clone(),
            script.clone(),
            Duration::from_secs(config.timeout_secs),
        );
        if let Some(dir) = &config.working_dir {
            runner = runner.with_working_dir(dir.clone());
        }

        Self::new(flavor, runner)
    }

    pub fn flavor(&self) -> ScriptFlavor {
        self.flavor
    }
}

#[async_trait]
impl SeriesProvider for ScriptProvider {
    fn name(&self) -> &'static str {
        self.flavor.name()
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.runner.probe().await
    }

    async fn fetch_daily_series(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Series, ProviderError> {
        let value = self
            .runner
            .run(
                "get_daily_kline",
                &[symbol.to_string(), lookback_days.to_string()],
            )
            .await?;

        let mut series = series_from_value(symbol, value)?;
        series.truncate(lookback_days as usize);
        Ok(series)
    }

    async fn scan_candidates(&self, query: &CandidateQuery) -> Result<Vec<String>, ProviderError> {
        let args = [
            query.market.to_string(),
            query.limit.to_string(),
            format_price(query.min_price),
            format_price(query.max_price),
        ];
        let value = self.runner.run("scan_stocks", &args).await?;
        symbols_from_value(value)
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        let value = self
            .runner
            .run("get_stock_info", &[symbol.to_string()])
            .await?;
        serde_json::from_value(value)
            .map_err(|e| ProviderError::Malformed(format!("stock info for {}: {}", symbol, e)))
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

        let args = [symbols.join(","), period.to_string(), count.to_string()];
        let batch = match self.runner.run("get_batch_kline", &args).await {
            Ok(Value::Array(items)) => items
                .into_iter()
                .map(|item| {
                    let fallback = item
                        .get("symbol")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    series_from_value(&fallback, item)
                })
                .collect::<Result<Vec<_>, _>>(),
            Ok(other) => Err(ProviderError::Malformed(format!(
                "batch kline is not an array: {}",
                other
            ))),
            Err(e) => Err(e),
        };

        match batch {
            Ok(mut series) => {
                for s in &mut series {
                    s.truncate(count);
                }
                Ok(series)
            }
            Err(e) if period == Period::Day => {
                warn!(
                    provider = self.name(),
                    error = %e,
                    symbols = symbols.len(),
                    "Batch kline failed, falling back to per-symbol fetches"
                );
                let mut result = Vec::with_capacity(symbols.len());
                for symbol in symbols {
                    match self.fetch_daily_series(symbol, count as u32).await {
                        Ok(series) => result.push(series),
                        Err(e) => warn!(symbol = %symbol, error = %e, "Skipping symbol in batch"),
                    }
                }
                Ok(result)
            }
            Err(e) => Err(e),
        }
    }

    async fn list_symbols(&self) -> Result<Vec<String>, ProviderError> {
        let value = self.runner.run("get_stock_list", &[]).await?;
        symbols_from_value(value)
    }
}

// ============================================================================
// Tests
// ============================================================================
