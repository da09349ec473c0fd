//! Volume scan engine.
//!
//! Drives a low-price volume-pattern scan end to end:
//! 1. Ask the provider's market scanner for ranked candidates
//! 2. Fetch each candidate's daily series in paced batches
//! 3. Evaluate the volume pattern and collect matches
//! 4. Stop as soon as enough matches are found

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::{ScanPolicy, ScanRequest};
use super::pattern::matches_bars;
use crate::data::{Bar, ProviderError, Series, SeriesProvider};

// ============================================================================
// Scan Error
// ============================================================================

/// Scan-level failures. Per-symbol problems never surface here.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Candidate list could not be fetched and the policy is strict
    #[error("Scan candidates unavailable: {0}")]
    CandidatesUnavailable(#[source] ProviderError),
}

// ============================================================================
// Scan Phase
// ============================================================================

/// Lifecycle of a single scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanPhase {
    Init,
    FetchingCandidates,
    BatchProcessing,
    Done,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::FetchingCandidates => "FETCHING_CANDIDATES",
            Self::BatchProcessing => "BATCH_PROCESSING",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Scan Outcome
// ============================================================================

/// A symbol that passed the pattern, with the series it was evaluated on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedSeries {
    pub symbol: String,
    /// Most-recent-first
    pub bars: Vec<Bar>,
}

impl From<Series> for MatchedSeries {
    fn from(series: Series) -> Self {
        let symbol = series.symbol().to_string();
        Self {
            symbol,
            bars: series.into_bars(),
        }
    }
}

/// Counters for a scan run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Candidates after truncation and dedupe
    pub total_candidates: usize,
    /// Candidates whose fetch result was consumed
    pub processed: usize,
    pub matched: usize,
    /// Series shorter than the evaluation window
    pub skipped_insufficient: usize,
    /// Series fetches that returned an error
    pub failed: usize,
    /// Batches started
    pub batches: usize,
    /// The deadline elapsed before the scan finished
    pub timed_out: bool,
    pub duration_ms: u64,
}

/// Result of a scan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// Scan ID (timestamp-based)
    pub id: String,
    /// Matches in candidate order
    pub matches: Vec<MatchedSeries>,
    pub stats: ScanStats,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ScanOutcome {
    /// Matched symbols in candidate order.
    pub fn symbols(&self) -> Vec<String> {
        self.matches.iter().map(|m| m.symbol.clone()).collect()
    }

    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Scanned {}/{} candidates in {:.1}s: {} matched, {} failed, {} insufficient{}",
            self.stats.processed,
            self.stats.total_candidates,
            self.stats.duration_ms as f64 / 1000.0,
            self.stats.matched,
            self.stats.failed,
            self.stats.skipped_insufficient,
            if self.stats.timed_out { " (timed out)" } else { "" }
        )
    }
}

// ============================================================================
// Volume Scanner
// ============================================================================

/// Runs low-price volume-pattern scans against a provider.
pub struct VolumeScanner {
    provider: Arc<dyn SeriesProvider>,
    policy: ScanPolicy,
}

/// Mutable state of one run.
struct ScanRun {
    id: String,
    started_at: DateTime<Utc>,
    deadline: Option<Instant>,
    matches: Vec<MatchedSeries>,
    stats: ScanStats,
}

impl ScanRun {
    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

impl VolumeScanner {
    pub fn new(provider: Arc<dyn SeriesProvider>, policy: ScanPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn policy(&self) -> &ScanPolicy {
        &self.policy
    }

    pub fn provider(&self) -> &Arc<dyn SeriesProvider> {
        &self.provider
    }

    /// Run a scan.
    ///
    /// Provider failures on individual symbols are counted and skipped. A
    /// candidate-fetch failure yields an empty outcome unless the policy is
    /// strict.
    pub async fn run(&self, request: &ScanRequest) -> Result<ScanOutcome, ScanError> {
        let started_at = Utc::now();
        let mut run = ScanRun {
            id: format!("scan_{}", started_at.format("%Y%m%d_%H%M%S")),
            started_at,
            deadline: self.policy.scan_timeout.map(|t| Instant::now() + t),
            matches: Vec::new(),
            stats: ScanStats::default(),
        };

        self.enter(&run, ScanPhase::Init);
        info!(
            scan_id = %run.id,
            provider = self.provider.name(),
            market = %request.market,
            limit = request.limit,
            min_price = ?request.min_price,
            max_price = ?request.max_price,
            "Starting volume pattern scan"
        );

        if request.limit == 0 {
            return Ok(self.finish(run));
        }

        self.enter(&run, ScanPhase::FetchingCandidates);
        let candidates = match self.fetch_candidates(&mut run, request).await? {
            Some(candidates) => candidates,
            None => return Ok(self.finish(run)),
        };
        run.stats.total_candidates = candidates.len();
        info!(scan_id = %run.id, candidates = candidates.len(), "Candidates fetched");

        self.enter(&run, ScanPhase::BatchProcessing);
        for (index, batch) in candidates.chunks(self.policy.batch_size).enumerate() {
            if index > 0 && !self.policy.batch_delay.is_zero() {
                let paused = until(run.deadline, tokio::time::sleep(self.policy.batch_delay)).await;
                if paused.is_none() {
                    run.stats.timed_out = true;
                    break;
                }
            }

            if run.deadline_passed() {
                run.stats.timed_out = true;
                break;
            }

            run.stats.batches += 1;
            debug!(scan_id = %run.id, batch = index + 1, size = batch.len(), "Processing batch");

            if self.process_batch(&mut run, batch, request.limit).await {
                break;
            }
        }

        Ok(self.finish(run))
    }

    /// Fetch, truncate and optionally dedupe the candidate list.
    ///
    /// `Ok(None)` means the scan ends here with an empty outcome.
    async fn fetch_candidates(
        &self,
        run: &mut ScanRun,
        request: &ScanRequest,
    ) -> Result<Option<Vec<String>>, ScanError> {
        let count = self.policy.candidate_count(request.limit);
        let query = request.candidate_query(count);

        let mut candidates = match until(run.deadline, self.provider.scan_candidates(&query)).await
        {
            Some(Ok(candidates)) => candidates,
            Some(Err(e)) if self.policy.strict_candidates => {
                return Err(ScanError::CandidatesUnavailable(e));
            }
            Some(Err(e)) => {
                warn!(scan_id = %run.id, error = %e, "Failed to fetch scan candidates");
                return Ok(None);
            }
            None => {
                warn!(scan_id = %run.id, "Deadline reached while fetching scan candidates");
                run.stats.timed_out = true;
                return Ok(None);
            }
        };

        candidates.truncate(count);

        if self.policy.dedupe_candidates {
            let mut seen = HashSet::with_capacity(candidates.len());
            candidates.retain(|symbol| seen.insert(symbol.clone()));
        }

        Ok(Some(candidates))
    }

    /// Process one batch. Returns `true` when the scan should stop.
    async fn process_batch(&self, run: &mut ScanRun, batch: &[String], limit: usize) -> bool {
        let lookback_days = self.policy.lookback_days;
        let fetches = batch.iter().cloned().map(|symbol| {
            let provider = Arc::clone(&self.provider);
            async move {
                let result = provider.fetch_daily_series(&symbol, lookback_days).await;
                (symbol, result)
            }
        });
        let mut results = stream::iter(fetches).buffered(self.policy.concurrency);

        loop {
            if run.deadline_passed() {
                run.stats.timed_out = true;
                return true;
            }

            let (symbol, result) = match until(run.deadline, results.next()).await {
                Some(Some(item)) => item,
                Some(None) => return false,
                None => {
                    run.stats.timed_out = true;
                    return true;
                }
            };

            run.stats.processed += 1;

            let series = match result {
                Ok(series) => series,
                Err(e) => {
                    warn!(scan_id = %run.id, symbol = %symbol, error = %e, "Failed to fetch series, skipping");
                    run.stats.failed += 1;
                    continue;
                }
            };

            if series.len() < self.policy.min_bars {
                debug!(symbol = %symbol, bars = series.len(), "Insufficient bars, skipping");
                run.stats.skipped_insufficient += 1;
                continue;
            }

            if matches_bars(series.bars()) {
                debug!(scan_id = %run.id, symbol = %symbol, "Volume pattern matched");
                run.matches.push(MatchedSeries::from(series));
                run.stats.matched += 1;

                if run.stats.matched >= limit {
                    info!(scan_id = %run.id, matched = run.stats.matched, "Match limit reached");
                    return true;
                }
            }
        }
    }

    fn finish(&self, run: ScanRun) -> ScanOutcome {
        let completed_at = Utc::now();
        let mut stats = run.stats;
        stats.duration_ms = (completed_at - run.started_at).num_milliseconds().max(0) as u64;

        let outcome = ScanOutcome {
            id: run.id,
            matches: run.matches,
            stats,
            started_at: run.started_at,
            completed_at,
        };

        info!(
            scan_id = %outcome.id,
            phase = %ScanPhase::Done,
            matched = outcome.stats.matched,
            "{}",
            outcome.summary()
        );

        outcome
    }

    fn enter(&self, run: &ScanRun, phase: ScanPhase) {
        debug!(scan_id = %run.id, phase = %phase, "Scan phase");
    }
}

/// Await `fut`, giving up at `deadline`.
async fn until<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

// ============================================================================
// Tests
// ============================================================================
