use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::patterns::UsagePatterns;
use crate::trend::TrendInfo;

pub const DEFAULT_PREDICTION_MS: u64 = 60_000;

const CYCLE_AMPLITUDE: f64 = 0.1;
const FORECAST_CONFIDENCE_DISCOUNT: f64 = 0.8;
const RANGE_VOLATILITY_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsagePrediction {
    pub current: f64,
    pub predicted: f64,
    pub confidence: f64,
    pub range: PredictionRange,
    pub future_time_ms: u64,
    pub cycle_adjustment: f64,
}

impl UsagePrediction {
    pub fn empty(future_time_ms: u64) -> Self {
        Self {
            current: 0.0,
            predicted: 0.0,
            confidence: 0.0,
            range: PredictionRange { min: 0.0, max: 0.0 },
            future_time_ms,
            cycle_adjustment: 0.0,
        }
    }
}

/// Linear extrapolation of `trend`, nudged by the detected cycle phase.
pub fn predict(
    current: f64,
    trend: &TrendInfo,
    patterns: &UsagePatterns,
    now_ms: u64,
    future_time_ms: u64,
) -> UsagePrediction {
    let future_secs = future_time_ms as f64 / 1000.0;
    let mut predicted = current + trend.absolute_rate * future_secs;

    let mut cycle_adjustment = 0.0;
    if patterns.cycle_detected && patterns.cycle_length_ms > 0 {
        let position = (now_ms.saturating_add(future_time_ms) % patterns.cycle_length_ms) as f64
            / patterns.cycle_length_ms as f64;
        cycle_adjustment = CYCLE_AMPLITUDE * (2.0 * PI * position).sin();
        predicted += cycle_adjustment;
    }

    let predicted = predicted.clamp(0.0, 1.0);
    let spread = patterns.volatility * RANGE_VOLATILITY_FACTOR;

    UsagePrediction {
        current,
        predicted,
        confidence: trend.confidence * FORECAST_CONFIDENCE_DISCOUNT,
        range: PredictionRange {
            min: (predicted - spread).clamp(0.0, 1.0),
            max: (predicted + spread).clamp(0.0, 1.0),
        },
        future_time_ms,
        cycle_adjustment,
    }
}
