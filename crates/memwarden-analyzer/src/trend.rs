use memwarden_core::TrendDirection;
use serde::{Deserialize, Serialize};

use crate::sample::UsageHistory;

pub const DEFAULT_TREND_TIMEFRAME_MS: u64 = 300_000;

/// Samples needed for full trend confidence.
const FULL_CONFIDENCE_SAMPLES: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendInfo {
    pub trend: TrendDirection,
    /// Pressure change per second relative to the first sample in the
    /// window. Falls back to the absolute change when that sample is zero.
    pub rate: f64,
    /// Absolute pressure change per second.
    pub absolute_rate: f64,
    pub confidence: f64,
    pub sample_count: usize,
    pub timeframe_ms: u64,
}

impl TrendInfo {
    pub fn unknown(sample_count: usize, timeframe_ms: u64) -> Self {
        Self {
            trend: TrendDirection::Unknown,
            rate: 0.0,
            absolute_rate: 0.0,
            confidence: 0.0,
            sample_count,
            timeframe_ms,
        }
    }
}

/// Trend over the trailing `timeframe_ms`. Confidence is a linear ramp on
/// sample count, not a variance measure.
pub fn compute_trend(history: &UsageHistory, now_ms: u64, timeframe_ms: u64) -> TrendInfo {
    let window = history.since(now_ms.saturating_sub(timeframe_ms));
    if window.len() < 2 {
        return TrendInfo::unknown(window.len(), timeframe_ms);
    }

    let first = window[0];
    let last = window[window.len() - 1];
    let elapsed_secs = last.timestamp.saturating_sub(first.timestamp) as f64 / 1000.0;

    let (rate, absolute_rate) = if elapsed_secs > 0.0 {
        let delta = last.pressure - first.pressure;
        let absolute = delta / elapsed_secs;
        let relative = if first.pressure > 0.0 {
            delta / first.pressure / elapsed_secs
        } else {
            absolute
        };
        (relative, absolute)
    } else {
        (0.0, 0.0)
    };

    TrendInfo {
        trend: TrendDirection::from_rate(rate),
        rate,
        absolute_rate,
        confidence: (window.len() as f64 / FULL_CONFIDENCE_SAMPLES).min(1.0),
        sample_count: window.len(),
        timeframe_ms,
    }
}

/// Short, medium and long trend windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendSet {
    pub short_term: TrendInfo,
    pub medium_term: TrendInfo,
    pub long_term: TrendInfo,
}

pub const SHORT_TERM_INTERVALS: u64 = 10;
pub const MEDIUM_TERM_INTERVALS: u64 = 30;
pub const LONG_TERM_INTERVALS: u64 = 60;

impl TrendSet {
    pub fn compute(history: &UsageHistory, now_ms: u64, interval_ms: u64) -> Self {
        Self {
            short_term: compute_trend(history, now_ms, SHORT_TERM_INTERVALS * interval_ms),
            medium_term: compute_trend(history, now_ms, MEDIUM_TERM_INTERVALS * interval_ms),
            long_term: compute_trend(history, now_ms, LONG_TERM_INTERVALS * interval_ms),
        }
    }
}
