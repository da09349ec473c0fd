//! Volume pattern evaluator.
//!
//! Detects a strictly increasing run of trailing volume averages. With `v[0]`
//! the most recent volume, the averages are taken over `v[1..=n]` for
//! `n = 2..=6`:
//!
//! ```text
//! avg2 > v0, avg3 > avg2, avg4 > avg3, avg5 > avg4, avg6 > avg5
//! ```
//!
//! The most recent bar never takes part in an average; it is only compared
//! against the shortest one. All comparisons are strict.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::{Bar, RawBar};

/// Volumes needed for an evaluation: the latest bar plus six trailing ones.
pub const PATTERN_WINDOW: usize = 7;

/// Trailing averages behind a pattern evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumePattern {
    /// `avg2..=avg6`, each over `v[1..=n]`
    pub averages: [f64; 5],
    /// Most recent volume (`v0`)
    pub latest: u64,
}

impl VolumePattern {
    /// Check the strict increasing chain.
    pub fn is_match(&self) -> bool {
        if self.averages[0] <= self.latest as f64 {
            return false;
        }
        self.averages.windows(2).all(|pair| pair[1] > pair[0])
    }
}

/// Compute the trailing averages for the first seven volumes.
///
/// Returns `None` when fewer than seven volumes are given.
pub fn volume_averages(volumes: &[u64]) -> Option<VolumePattern> {
    if volumes.len() < PATTERN_WINDOW {
        return None;
    }

    let mut averages = [0.0; 5];
    let mut sum = volumes[1] as f64;
    for (slot, n) in (2..PATTERN_WINDOW).enumerate() {
        sum += volumes[n] as f64;
        averages[slot] = sum / n as f64;
    }

    Some(VolumePattern {
        averages,
        latest: volumes[0],
    })
}

/// Evaluate the pattern over most-recent-first volumes.
pub fn matches_volume_pattern(volumes: &[u64]) -> bool {
    volume_averages(volumes).is_some_and(|pattern| pattern.is_match())
}

/// Evaluate the pattern over most-recent-first bars.
pub fn matches_bars(bars: &[Bar]) -> bool {
    if bars.len() < PATTERN_WINDOW {
        return false;
    }
    let volumes: Vec<u64> = bars.iter().take(PATTERN_WINDOW).map(|b| b.volume).collect();
    matches_volume_pattern(&volumes)
}

/// Evaluate the pattern over loose upstream records.
///
/// Every record must carry a usable volume, including those past the
/// evaluation window; one bad record makes the whole evaluation a non-match.
pub fn matches_raw(records: &[RawBar]) -> bool {
    if records.len() < PATTERN_WINDOW {
        return false;
    }

    let mut volumes = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        match record.volume() {
            Ok(volume) => volumes.push(volume),
            Err(e) => {
                warn!(index, error = %e, "Unusable volume in record, treating as non-match");
                return false;
            }
        }
    }

    matches_volume_pattern(&volumes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use test_case::test_case;

    const RISING: [u64; 7] = [10, 20, 30, 45, 65, 95, 140];

    #[test]
    fn test_rising_averages_match() {
        assert!(matches_volume_pattern(&RISING));

        let pattern = volume_averages(&RISING).unwrap();
        assert_eq!(pattern.latest, 10);
        assert_eq!(pattern.averages[0], 25.0);
        assert_eq!(pattern.averages[2], 40.0);
        assert_eq!(pattern.averages[3], 51.0);
    }

    #[test_case(&[100, 50, 60, 70, 80, 90, 95], false ; "falling history")]
    #[test_case(&[25, 20, 30, 45, 65, 95, 140], false ; "latest equals first average")]
    #[test_case(&[24, 20, 30, 45, 65, 95, 140], true ; "latest just below first average")]
    #[test_case(&[1, 5, 5, 5, 5, 5, 5], false ; "flat history ties")]
    #[test_case(&[0, 0, 0, 0, 0, 0, 0], false ; "all zero")]
    #[test_case(&[0, 1, 2, 3, 4, 5, 6], true ; "zero latest")]
    fn test_pattern_cases(volumes: &[u64], expected: bool) {
        assert_eq!(matches_volume_pattern(volumes), expected);
    }

    #[test]
    fn test_too_few_volumes() {
        assert!(!matches_volume_pattern(&[]));
        assert!(!matches_volume_pattern(&RISING[..6]));
        assert!(volume_averages(&RISING[..6]).is_none());
    }

    #[test]
    fn test_only_first_seven_considered() {
        let mut volumes = RISING.to_vec();
        volumes.extend([0, 0, 1_000_000]);
        assert!(matches_volume_pattern(&volumes));
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let volumes = [3, 7, 9, 12, 20, 31, 50];
        let first = matches_volume_pattern(&volumes);
        assert_eq!(first, matches_volume_pattern(&volumes));
        assert_eq!(volume_averages(&volumes), volume_averages(&volumes));
    }

    #[test]
    fn test_large_volumes_do_not_overflow() {
        let v = u64::MAX / 4;
        assert!(!matches_volume_pattern(&[v; 7]));
    }

    #[test]
    fn test_matches_bars() {
        let now = Utc::now();
        let bars: Vec<Bar> = RISING
            .iter()
            .enumerate()
            .map(|(i, &volume)| {
                Bar::new("SNDL", now - Duration::days(i as i64), 0.1, 0.1, 0.1, 0.1, volume)
            })
            .collect();

        assert!(matches_bars(&bars));
        assert!(!matches_bars(&bars[..5]));
    }

    #[test]
    fn test_matches_raw() {
        let records: Vec<RawBar> = RISING
            .iter()
            .map(|v| serde_json::from_value(json!({"volume": v})).unwrap())
            .collect();
        assert!(matches_raw(&records));
    }

    #[test]
    fn test_matches_raw_bad_volume() {
        let mut records: Vec<RawBar> = RISING
            .iter()
            .map(|v| serde_json::from_value(json!({"volume": v})).unwrap())
            .collect();
        records[3] = serde_json::from_value(json!({"volume": "n/a"})).unwrap();
        assert!(!matches_raw(&records));

        records[3] = serde_json::from_value(json!({"close": 1.0})).unwrap();
        assert!(!matches_raw(&records));
    }

    #[test]
    fn test_matches_raw_bad_volume_past_window() {
        let mut records: Vec<RawBar> = RISING
            .iter()
            .map(|v| serde_json::from_value(json!({"volume": v})).unwrap())
            .collect();
        records.push(serde_json::from_value(json!({"volume": "n/a"})).unwrap());
        assert!(!matches_raw(&records));

        records.pop();
        records.push(serde_json::from_value(json!({"volume": 5})).unwrap());
        assert!(matches_raw(&records));
    }
}
