//! Configuration management for the stock-invest services.
//!
//! The service reads a single configuration file at `~/.stock-invest/config.json`.
//! A missing file yields the defaults below.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (see below)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `INVEST_PORT` → network.port
//! - `INVEST_BIND_ADDRESS` → network.bind
//! - `INVEST_LOG_LEVEL` → observability.log_level
//! - `INVEST_PROVIDER` → provider.kind
//! - `TIGER_ID` → provider.tiger.tiger_id
//! - `TIGER_ACCOUNT` → provider.tiger.account
//! - `TIGER_PRIVATE_KEY` → provider.tiger.private_key

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".stock-invest"),
        |dirs| dirs.home_dir().join(".stock-invest"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network Configuration
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default: "127.0.0.1" (local only)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4440
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets clamped to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Which market data backend the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Tiger brokerage open API (HTTP)
    Tiger,
    /// Yahoo Finance helper script
    YFinance,
    /// Twelve Data helper script
    TwelveData,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::Tiger, Self::YFinance, Self::TwelveData];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tiger => "tiger",
            Self::YFinance => "yfinance",
            Self::TwelveData => "twelvedata",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tiger" => Ok(Self::Tiger),
            "yfinance" => Ok(Self::YFinance),
            "twelvedata" | "twelve_data" => Ok(Self::TwelveData),
            other => Err(format!(
                "unknown provider '{}', expected one of: tiger, yfinance, twelvedata",
                other
            )),
        }
    }
}

/// Market data provider selection and per-backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider key: "tiger", "yfinance" or "twelvedata"
    #[serde(default = "default_provider_kind")]
    pub kind: String,

    /// TTL for cached daily series, in seconds. 0 disables the cache.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Tiger open API settings
    #[serde(default)]
    pub tiger: TigerConfig,

    /// Helper script settings (yfinance / twelvedata)
    #[serde(default)]
    pub script: ScriptConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            cache_ttl_secs: default_cache_ttl_secs(),
            tiger: TigerConfig::default(),
            script: ScriptConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Parse the configured provider key.
    pub fn provider_kind(&self) -> std::result::Result<ProviderKind, String> {
        self.kind.parse()
    }
}

fn default_provider_kind() -> String {
    "yfinance".into()
}

fn default_cache_ttl_secs() -> u64 {
    300
}

/// Tiger open API credentials and endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TigerConfig {
    /// Gateway endpoint accepting signed-on-our-behalf requests
    #[serde(default = "default_tiger_endpoint")]
    pub endpoint: String,

    /// Developer id issued by Tiger
    #[serde(default)]
    pub tiger_id: Option<String>,

    /// Trading account
    #[serde(default)]
    pub account: Option<String>,

    /// RSA private key (PKCS#8, base64)
    #[serde(default)]
    pub private_key: Option<String>,

    /// Requests per minute allowed against the gateway
    #[serde(default = "default_tiger_rate_limit")]
    pub rate_limit_rpm: u32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_tiger_timeout")]
    pub timeout_secs: u64,

    /// Symbols to scan when the market scanner call fails (empty disables)
    #[serde(default)]
    pub fallback_symbols: Vec<String>,
}

impl Default for TigerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_tiger_endpoint(),
            tiger_id: None,
            account: None,
            private_key: None,
            rate_limit_rpm: default_tiger_rate_limit(),
            timeout_secs: default_tiger_timeout(),
            fallback_symbols: Vec::new(),
        }
    }
}

fn default_tiger_endpoint() -> String {
    "https://openapi.tigerfintech.com/gateway".into()
}

fn default_tiger_rate_limit() -> u32 {
    60
}

fn default_tiger_timeout() -> u64 {
    30
}

/// External helper script settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Interpreter used to run the scripts
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Script backing the yfinance provider
    #[serde(default = "default_yfinance_script")]
    pub yfinance_script: PathBuf,

    /// Script backing the twelvedata provider
    #[serde(default = "default_twelvedata_script")]
    pub twelvedata_script: PathBuf,

    /// Per-invocation timeout in seconds
    #[serde(default = "default_script_timeout")]
    pub timeout_secs: u64,

    /// Working directory for script processes (defaults to the current dir)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            yfinance_script: default_yfinance_script(),
            twelvedata_script: default_twelvedata_script(),
            timeout_secs: default_script_timeout(),
            working_dir: None,
        }
    }
}

fn default_interpreter() -> String {
    let interpreter = if cfg!(windows) { "py" } else { "python" };
    interpreter.into()
}

fn default_yfinance_script() -> PathBuf {
    PathBuf::from("python/stock_info_yfinance.py")
}

fn default_twelvedata_script() -> PathBuf {
    PathBuf::from("python/stock_info_twelvedata.py")
}

fn default_script_timeout() -> u64 {
    60
}

// ============================================================================
// Scanner Configuration
// ============================================================================

/// Volume-pattern scan policy and request defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Market scanned by the low-price endpoints
    #[serde(default = "default_market")]
    pub market: String,

    /// Result limit when the request omits one
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Lower bound of the low-price band
    #[serde(default = "default_min_price")]
    pub min_price: f64,

    /// Upper bound of the low-price band
    #[serde(default = "default_max_price")]
    pub max_price: f64,

    /// Candidates requested per wanted match
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,

    /// Symbols per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches in milliseconds
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Concurrent series fetches inside a batch (1 = sequential)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Minimum bars a series needs before it is evaluated
    #[serde(default = "default_min_bars")]
    pub min_bars: usize,

    /// Most recent daily bars requested per symbol
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Overall scan deadline in seconds; partial results are returned when hit
    #[serde(default)]
    pub scan_timeout_secs: Option<u64>,

    /// Surface candidate-fetch failures as errors instead of an empty result
    #[serde(default)]
    pub strict_candidates: bool,

    /// Drop repeated symbols from the candidate list
    #[serde(default)]
    pub dedupe_candidates: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            market: default_market(),
            default_limit: default_limit(),
            min_price: default_min_price(),
            max_price: default_max_price(),
            overfetch_factor: default_overfetch_factor(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            concurrency: default_concurrency(),
            min_bars: default_min_bars(),
            lookback_days: default_lookback_days(),
            scan_timeout_secs: None,
            strict_candidates: false,
            dedupe_candidates: false,
        }
    }
}

fn default_market() -> String {
    "US".into()
}

fn default_limit() -> usize {
    20
}

fn default_min_price() -> f64 {
    0.05
}

fn default_max_price() -> f64 {
    0.2
}

fn default_overfetch_factor() -> usize {
    2
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_delay_ms() -> u64 {
    500
}

fn default_concurrency() -> usize {
    1
}

fn default_min_bars() -> usize {
    7
}

fn default_lookback_days() -> u32 {
    30
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP listener
    #[serde(default)]
    pub network: NetworkConfig,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Market data provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Volume-pattern scanner
    #[serde(default)]
    pub scanner: ScannerConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("INVEST_PORT") {
            match port.parse() {
                Ok(p) => self.network.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid INVEST_PORT"),
            }
        }

        if let Some(bind) = lookup("INVEST_BIND_ADDRESS") {
            self.network.bind = bind;
        }

        if let Some(level) = lookup("INVEST_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Some(kind) = lookup("INVEST_PROVIDER") {
            self.provider.kind = kind;
        }

        // Tiger credentials usually come from the environment rather than the file
        if let Some(id) = lookup("TIGER_ID") {
            self.provider.tiger.tiger_id = Some(id);
        }
        if let Some(account) = lookup("TIGER_ACCOUNT") {
            self.provider.tiger.account = Some(account);
        }
        if let Some(key) = lookup("TIGER_PRIVATE_KEY") {
            self.provider.tiger.private_key = Some(key);
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let dir = config_dir();

        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }

        self.save_to(&config_path())
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Socket address string the HTTP server binds to.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }
}
