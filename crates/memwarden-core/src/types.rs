use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dead zone below which a rate of change counts as flat.
pub const TREND_DEAD_ZONE: f64 = 0.001;

/// Risk bands shared by the usage analyzer and the leak detector.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Maps an additive risk score onto the 0.3 / 0.5 / 0.7 bands.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Self::Critical
        } else if score >= 0.5 {
            Self::High
        } else if score >= 0.3 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Low
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Growing,
    Shrinking,
    Stable,
    /// Not enough samples to say.
    Unknown,
}

impl TrendDirection {
    /// Classifies a rate of change with the shared dead zone.
    pub fn from_rate(rate: f64) -> Self {
        if rate > TREND_DEAD_ZONE {
            Self::Growing
        } else if rate < -TREND_DEAD_ZONE {
            Self::Shrinking
        } else {
            Self::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Growing => "growing",
            Self::Shrinking => "shrinking",
            Self::Stable => "stable",
            Self::Unknown => "unknown",
        }
    }
}

impl Default for TrendDirection {
    fn default() -> Self {
        Self::Stable
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Used / total, guarded against an empty denominator.
pub fn pressure_ratio(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_bands() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.29), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.3), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.5), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.7), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(1.3), RiskLevel::Critical);
        assert!(RiskLevel::Critical > RiskLevel::Medium);
    }

    #[test]
    fn test_trend_dead_zone() {
        assert_eq!(TrendDirection::from_rate(0.0011), TrendDirection::Growing);
        assert_eq!(TrendDirection::from_rate(0.0009), TrendDirection::Stable);
        assert_eq!(TrendDirection::from_rate(-0.0011), TrendDirection::Shrinking);
        assert_eq!(TrendDirection::from_rate(-0.001), TrendDirection::Stable);
    }

    #[test]
    fn test_pressure_ratio_guard() {
        assert_eq!(pressure_ratio(5, 0), 0.0);
        assert_eq!(pressure_ratio(250, 1000), 0.25);
    }
}
