//! Low-price volume-pattern screener.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  candidates  ┌──────────────┐  series  ┌──────────────┐
//! │ SeriesProvider│────────────▶│ VolumeScanner │────────▶│   pattern    │
//! │  (scanner)    │             │  (batches)    │◀────────│  evaluator   │
//! └──────────────┘              └──────┬───────┘  bool    └──────────────┘
//!                                      │
//!                                      ▼
//!                                 ScanOutcome
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use invest_scanner::screener::{ScanPolicy, ScanRequest, VolumeScanner};
//!
//! let scanner = VolumeScanner::new(provider, ScanPolicy::from(&config.scanner));
//! let outcome = scanner.run(&ScanRequest::from_config(&config.scanner)?).await?;
//! println!("{}", outcome.summary());
//! ```

pub mod config;
pub mod engine;
pub mod pattern;

pub use config::{ScanPolicy, ScanRequest};
pub use engine::{MatchedSeries, ScanError, ScanOutcome, ScanPhase, ScanStats, VolumeScanner};
pub use pattern::{
    matches_bars, matches_raw, matches_volume_pattern, volume_averages, VolumePattern,
    PATTERN_WINDOW,
};
