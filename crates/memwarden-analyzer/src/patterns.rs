use memwarden_core::stats;
use memwarden_core::TrendDirection;
use serde::{Deserialize, Serialize};

use crate::sample::UsageSample;

/// Smallest lag considered when searching for a usage cycle.
pub const MIN_CYCLE_LAG: usize = 5;

/// Statistics derived from the most recent samples. Recomputed in place,
/// never persisted on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePatterns {
    /// Pressure change per second across the pattern window.
    pub growth_rate: f64,
    pub peak_usage: f64,
    pub average_usage: f64,
    pub volatility: f64,
    pub trend_direction: TrendDirection,
    pub last_trend_analysis: u64,
    pub cycle_detected: bool,
    pub cycle_length_ms: u64,
}

impl Default for UsagePatterns {
    fn default() -> Self {
        Self {
            growth_rate: 0.0,
            peak_usage: 0.0,
            average_usage: 0.0,
            volatility: 0.0,
            trend_direction: TrendDirection::Stable,
            last_trend_analysis: 0,
            cycle_detected: false,
            cycle_length_ms: 0,
        }
    }
}

/// Outcome of one autocorrelation scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleInfo {
    pub detected: bool,
    pub best_lag: usize,
    pub correlation: f64,
    pub length_ms: u64,
}

impl UsagePatterns {
    /// Recomputes the window statistics from `window` (oldest first).
    pub fn recompute(&mut self, window: &[&UsageSample], now_ms: u64) {
        if window.is_empty() {
            return;
        }
        let pressures: Vec<f64> = window.iter().map(|s| s.pressure).collect();

        self.average_usage = stats::mean(&pressures);
        self.peak_usage = stats::max(&pressures);
        self.volatility = stats::std_dev(&pressures);

        let first = window[0];
        let last = window[window.len() - 1];
        let elapsed_secs = last.timestamp.saturating_sub(first.timestamp) as f64 / 1000.0;
        self.growth_rate = if elapsed_secs > 0.0 {
            (last.pressure - first.pressure) / elapsed_secs
        } else {
            0.0
        };

        self.trend_direction = TrendDirection::from_rate(self.growth_rate);
        self.last_trend_analysis = now_ms;
    }

    /// Naive autocorrelation scan over lags `5..=n/2`. The best lag wins if
    /// its correlation exceeds `threshold`; otherwise the cycle is cleared.
    pub fn detect_cycles(
        &mut self,
        pressures: &[f64],
        interval_ms: u64,
        threshold: f64,
    ) -> CycleInfo {
        let mut best_lag = 0;
        let mut best_correlation = f64::MIN;

        for lag in MIN_CYCLE_LAG..=pressures.len() / 2 {
            let correlation = stats::autocorrelation(pressures, lag);
            if correlation > best_correlation {
                best_correlation = correlation;
                best_lag = lag;
            }
        }

        if best_lag == 0 {
            best_correlation = 0.0;
        }

        let detected = best_lag > 0 && best_correlation > threshold;
        self.cycle_detected = detected;
        self.cycle_length_ms = if detected {
            best_lag as u64 * interval_ms
        } else {
            0
        };

        CycleInfo {
            detected,
            best_lag,
            correlation: best_correlation,
            length_ms: self.cycle_length_ms,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.growth_rate.is_finite()
            && self.peak_usage.is_finite()
            && self.average_usage.is_finite()
            && self.volatility.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::Value;

    fn samples(pressures: &[f64], step_ms: u64) -> Vec<UsageSample> {
        pressures
            .iter()
            .enumerate()
            .map(|(i, p)| UsageSample::new((p * 1000.0) as u64, 1000, i as u64 * step_ms, Value::Null))
            .collect()
    }

    #[test]
    fn test_recompute_statistics() {
        let owned = samples(&[0.2, 0.4, 0.6], 1000);
        let window: Vec<&UsageSample> = owned.iter().collect();
        let mut patterns = UsagePatterns::default();
        patterns.recompute(&window, 42);

        assert_relative_eq!(patterns.average_usage, 0.4, epsilon = 1e-9);
        assert_relative_eq!(patterns.peak_usage, 0.6, epsilon = 1e-9);
        assert_relative_eq!(patterns.growth_rate, 0.2, epsilon = 1e-9);
        assert_eq!(patterns.trend_direction, TrendDirection::Growing);
        assert_eq!(patterns.last_trend_analysis, 42);
        assert!(patterns.volatility > 0.16 && patterns.volatility < 0.17);
    }

    #[test]
    fn test_zero_elapsed_time_has_no_growth() {
        let owned = samples(&[0.2, 0.9], 0);
        let window: Vec<&UsageSample> = owned.iter().collect();
        let mut patterns = UsagePatterns::default();
        patterns.recompute(&window, 0);
        assert_eq!(patterns.growth_rate, 0.0);
        assert_eq!(patterns.trend_direction, TrendDirection::Stable);
    }

    #[test]
    fn test_detects_square_wave_cycle() {
        let pressures: Vec<f64> = (0..60)
            .map(|i| if (i / 6) % 2 == 0 { 0.7 } else { 0.3 })
            .collect();
        let mut patterns = UsagePatterns::default();
        let cycle = patterns.detect_cycles(&pressures, 1000, 0.7);

        assert!(cycle.detected);
        assert_eq!(cycle.best_lag, 12);
        assert_eq!(patterns.cycle_length_ms, 12_000);
        assert!(patterns.cycle_detected);
    }

    #[test]
    fn test_flat_series_clears_cycle() {
        let mut patterns = UsagePatterns {
            cycle_detected: true,
            cycle_length_ms: 5000,
            ..Default::default()
        };
        let cycle = patterns.detect_cycles(&[0.5; 40], 1000, 0.7);
        assert!(!cycle.detected);
        assert!(!patterns.cycle_detected);
        assert_eq!(patterns.cycle_length_ms, 0);
    }
}
