use memwarden_core::{pressure_ratio, LeakThresholds, MemoryReading};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Snapshots considered by the growth analysis.
pub const GROWTH_WINDOW: usize = 5;
/// Snapshots needed before growth is analysed at all.
pub const MIN_GROWTH_SNAPSHOTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub timestamp: u64,
    pub total_memory: u64,
    pub used_memory: u64,
    pub free_memory: u64,
    pub pressure: f64,
}

impl MemorySnapshot {
    /// A missing reading yields an all-zero snapshot.
    pub fn capture(timestamp: u64, reading: Option<MemoryReading>) -> Self {
        let reading = reading.unwrap_or(MemoryReading::new(0, 0));
        Self {
            timestamp,
            total_memory: reading.total,
            used_memory: reading.used,
            free_memory: reading.total.saturating_sub(reading.used),
            pressure: pressure_ratio(reading.used, reading.total),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStatus {
    InsufficientData,
    Normal,
    SuspiciousGrowth,
    CriticalGrowth,
}

impl GrowthStatus {
    pub fn classify(rate: f64, thresholds: &LeakThresholds) -> Self {
        if rate > thresholds.critical_growth {
            Self::CriticalGrowth
        } else if rate > thresholds.suspicious_growth {
            Self::SuspiciousGrowth
        } else {
            Self::Normal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthAnalysis {
    pub status: GrowthStatus,
    /// Mean relative growth of used memory per second.
    pub average_growth_rate: f64,
    pub max_growth_rate: f64,
    pub pairs_analyzed: usize,
}

/// Relative growth per second between consecutive snapshots of the
/// trailing window. Pairs with a zero baseline or no elapsed time are
/// skipped.
pub fn analyze_growth(
    snapshots: &VecDeque<MemorySnapshot>,
    thresholds: &LeakThresholds,
) -> Option<GrowthAnalysis> {
    if snapshots.len() < MIN_GROWTH_SNAPSHOTS {
        return None;
    }

    let skip = snapshots.len().saturating_sub(GROWTH_WINDOW);
    let window: Vec<&MemorySnapshot> = snapshots.iter().skip(skip).collect();

    let rates: Vec<f64> = window
        .windows(2)
        .filter_map(|pair| {
            let (previous, current) = (pair[0], pair[1]);
            let elapsed_secs =
                current.timestamp.saturating_sub(previous.timestamp) as f64 / 1000.0;
            if previous.used_memory == 0 || elapsed_secs <= 0.0 {
                return None;
            }
            let delta = current.used_memory as f64 - previous.used_memory as f64;
            Some(delta / previous.used_memory as f64 / elapsed_secs)
        })
        .collect();

    let average_growth_rate = if rates.is_empty() {
        0.0
    } else {
        rates.iter().sum::<f64>() / rates.len() as f64
    };
    let max_growth_rate = rates.iter().copied().fold(0.0, f64::max);

    Some(GrowthAnalysis {
        status: GrowthStatus::classify(average_growth_rate, thresholds),
        average_growth_rate,
        max_growth_rate,
        pairs_analyzed: rates.len(),
    })
}
