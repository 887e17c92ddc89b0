use memwarden_core::RiskLevel;
use serde::{Deserialize, Serialize};

use crate::patterns::UsagePatterns;

/// Contribution of each factor to the additive risk score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskFactors {
    pub pressure: f64,
    pub growth: f64,
    pub volatility: f64,
    pub time_to_limit: f64,
}

impl RiskFactors {
    pub fn total(&self) -> f64 {
        self.pressure + self.growth + self.volatility + self.time_to_limit
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRiskAssessment {
    pub level: RiskLevel,
    pub score: f64,
    pub factors: RiskFactors,
    /// Seconds until pressure reaches 1.0 at the current growth rate.
    pub time_to_limit_secs: Option<f64>,
}

fn pressure_points(current: f64) -> f64 {
    if current > 0.9 {
        0.4
    } else if current > 0.8 {
        0.3
    } else if current > 0.7 {
        0.2
    } else if current > 0.5 {
        0.1
    } else {
        0.0
    }
}

fn growth_points(growth_rate: f64) -> f64 {
    if growth_rate > 0.01 {
        0.3
    } else if growth_rate > 0.005 {
        0.2
    } else if growth_rate > 0.001 {
        0.1
    } else {
        0.0
    }
}

fn volatility_points(volatility: f64) -> f64 {
    if volatility > 0.2 {
        0.2
    } else if volatility > 0.1 {
        0.1
    } else if volatility > 0.05 {
        0.05
    } else {
        0.0
    }
}

fn time_to_limit_points(secs: Option<f64>) -> f64 {
    match secs {
        Some(s) if s < 60.0 => 0.3,
        Some(s) if s < 300.0 => 0.2,
        Some(s) if s < 900.0 => 0.1,
        _ => 0.0,
    }
}

pub fn time_to_limit(current: f64, growth_rate: f64) -> Option<f64> {
    if growth_rate > 0.0 {
        Some((1.0 - current).max(0.0) / growth_rate)
    } else {
        None
    }
}

/// Weighted scorecard over pressure, growth, volatility and time-to-limit.
pub fn assess_risk(current: f64, patterns: &UsagePatterns) -> UsageRiskAssessment {
    let time_to_limit_secs = time_to_limit(current, patterns.growth_rate);
    let factors = RiskFactors {
        pressure: pressure_points(current),
        growth: growth_points(patterns.growth_rate),
        volatility: volatility_points(patterns.volatility),
        time_to_limit: time_to_limit_points(time_to_limit_secs),
    };
    let score = factors.total();

    UsageRiskAssessment {
        level: RiskLevel::from_score(score),
        score,
        factors,
        time_to_limit_secs,
    }
}

pub fn recommendations(level: RiskLevel, patterns: &UsagePatterns) -> Vec<String> {
    let base: &[&str] = match level {
        RiskLevel::Low => &["Memory usage is healthy; continue routine monitoring"],
        RiskLevel::Medium => &[
            "Monitor memory usage closely",
            "Schedule a standard cleanup pass",
        ],
        RiskLevel::High => &[
            "Run a comprehensive cleanup soon",
            "Reduce cache sizes and release unused resources",
        ],
        RiskLevel::Critical => &[
            "Run an emergency cleanup immediately",
            "Release all non-essential caches and rendering contexts",
            "Investigate sustained memory growth for leaks",
        ],
    };

    let mut out: Vec<String> = base.iter().map(|s| s.to_string()).collect();

    if patterns.volatility > 0.2 {
        out.push("Investigate the source of highly volatile memory usage".to_string());
    }
    if patterns.cycle_detected {
        out.push(format!(
            "Optimize for the cyclical usage pattern (period ~{}s)",
            patterns.cycle_length_ms / 1000
        ));
    }

    out
}
