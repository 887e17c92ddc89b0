use memwarden_core::{LeakThresholds, RiskLevel, Severity};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::creation::{PatternIssue, PatternIssueKind};
use crate::pressure::PressureAnalysis;
use crate::snapshot::{GrowthAnalysis, GrowthStatus, MemorySnapshot};
use crate::suspect::SuspectSummary;

/// Snapshots compared by the lightweight risk assessment.
pub const ASSESSMENT_WINDOW: usize = 10;

const PATTERN_POINTS_CAP: f64 = 0.3;
const SUSPECT_POINTS: f64 = 0.05;
const SUSPECT_POINTS_CAP: f64 = 0.2;

/// Weighted contributions to the leak risk score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LeakScore {
    pub growth: f64,
    pub patterns: f64,
    pub pressure: f64,
    pub suspects: f64,
}

impl LeakScore {
    pub fn compute(
        growth: Option<&GrowthAnalysis>,
        issues: &[PatternIssue],
        pressure: &PressureAnalysis,
        suspects: &SuspectSummary,
    ) -> Self {
        let growth = match growth.map(|g| g.status) {
            Some(GrowthStatus::CriticalGrowth) => 0.4,
            Some(GrowthStatus::SuspiciousGrowth) => 0.2,
            _ => 0.0,
        };

        let patterns = issues
            .iter()
            .map(|issue| {
                if issue.severity >= Severity::High {
                    0.15
                } else {
                    0.1
                }
            })
            .sum::<f64>()
            .min(PATTERN_POINTS_CAP);

        let pressure = match pressure.severity {
            Severity::Critical => 0.3,
            Severity::High => 0.2,
            Severity::Medium => 0.1,
            Severity::Low => 0.05,
            Severity::None => 0.0,
        };

        let suspects = (suspects.verified as f64 * SUSPECT_POINTS).min(SUSPECT_POINTS_CAP);

        Self {
            growth,
            patterns,
            pressure,
            suspects,
        }
    }

    pub fn total(&self) -> f64 {
        self.growth + self.patterns + self.pressure + self.suspects
    }
}

/// Data coverage of a pass. Grows with snapshots and with every signal
/// that fired. Growth only counts once at least one snapshot pair was
/// usable.
pub fn detection_confidence(
    snapshot_count: usize,
    growth: Option<&GrowthAnalysis>,
    issues: &[PatternIssue],
    pressure: &PressureAnalysis,
    suspects: &SuspectSummary,
) -> f64 {
    let mut confidence = (snapshot_count as f64 / 10.0).min(1.0);
    if growth.is_some_and(|g| g.pairs_analyzed > 0) {
        confidence += 0.2;
    }
    if !issues.is_empty() {
        confidence += 0.1;
    }
    if pressure.severity != Severity::None {
        confidence += 0.1;
    }
    if suspects.verified > 0 {
        confidence += 0.2;
    }
    confidence.min(1.0)
}

pub fn leak_recommendations(
    growth: Option<&GrowthAnalysis>,
    issues: &[PatternIssue],
    pressure: &PressureAnalysis,
    suspects: &SuspectSummary,
) -> Vec<String> {
    let mut out = Vec::new();

    match growth.map(|g| g.status) {
        Some(GrowthStatus::CriticalGrowth) => out.push(
            "Critical memory growth detected; inspect recent allocations for leaks".to_string(),
        ),
        Some(GrowthStatus::SuspiciousGrowth) => {
            out.push("Memory is growing steadily; monitor allocation sources".to_string())
        }
        _ => {}
    }

    for issue in issues {
        out.push(match issue.kind {
            PatternIssueKind::HighCreationRate => format!(
                "Reduce the creation rate of {} objects, for example with pooling",
                issue.object_type
            ),
            PatternIssueKind::ObjectAccumulation => format!(
                "Release accumulated {} objects that are no longer needed",
                issue.object_type
            ),
        });
    }

    if pressure.severity >= Severity::Medium {
        out.push("Frequent high memory pressure; schedule proactive cleanup".to_string());
    }

    if suspects.verified > 0 {
        out.push(format!(
            "Investigate {} verified leak suspect(s)",
            suspects.verified
        ));
    }

    if out.is_empty() {
        out.push("No leak indicators detected".to_string());
    }
    out
}

/// Result of one full detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakAnalysis {
    pub timestamp: u64,
    pub detected: bool,
    pub overall_risk: RiskLevel,
    pub risk_score: f64,
    pub score: LeakScore,
    pub confidence: f64,
    pub snapshot: MemorySnapshot,
    pub growth: Option<GrowthAnalysis>,
    pub patterns: Vec<PatternIssue>,
    pub pressure: PressureAnalysis,
    pub suspects: SuspectSummary,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    TooFrequent,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "Leak detection disabled",
            Self::TooFrequent => "Analysis too frequent",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LeakDetectionOutcome {
    Skipped { reason: SkipReason },
    Completed(Box<LeakAnalysis>),
}

impl LeakDetectionOutcome {
    pub fn detected(&self) -> bool {
        match self {
            Self::Skipped { .. } => false,
            Self::Completed(analysis) => analysis.detected,
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Skipped { reason } => Some(reason.as_str()),
            Self::Completed(_) => None,
        }
    }

    pub fn analysis(&self) -> Option<&LeakAnalysis> {
        match self {
            Self::Completed(analysis) => Some(analysis),
            Self::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakRiskAssessment {
    pub risk: RiskLevel,
    pub status: GrowthStatus,
    /// Relative growth of used memory per minute.
    pub growth_per_minute: f64,
    pub snapshots_compared: usize,
}

/// Oldest-versus-newest comparison over the last snapshots.
pub fn assess_snapshot_risk(
    snapshots: &VecDeque<MemorySnapshot>,
    thresholds: &LeakThresholds,
) -> LeakRiskAssessment {
    let skip = snapshots.len().saturating_sub(ASSESSMENT_WINDOW);
    let window: Vec<&MemorySnapshot> = snapshots.iter().skip(skip).collect();

    let (oldest, newest) = match (window.first(), window.last()) {
        (Some(oldest), Some(newest)) if window.len() >= 2 => (*oldest, *newest),
        _ => {
            return LeakRiskAssessment {
                risk: RiskLevel::Low,
                status: GrowthStatus::InsufficientData,
                growth_per_minute: 0.0,
                snapshots_compared: window.len(),
            }
        }
    };

    let minutes = newest.timestamp.saturating_sub(oldest.timestamp) as f64 / 60_000.0;
    let growth_per_minute = if oldest.used_memory == 0 || minutes <= 0.0 {
        0.0
    } else {
        (newest.used_memory as f64 - oldest.used_memory as f64)
            / oldest.used_memory as f64
            / minutes
    };

    let status = GrowthStatus::classify(growth_per_minute, thresholds);
    let risk = match status {
        GrowthStatus::CriticalGrowth => RiskLevel::Critical,
        GrowthStatus::SuspiciousGrowth => RiskLevel::High,
        _ if growth_per_minute > thresholds.suspicious_growth / 2.0 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    };

    LeakRiskAssessment {
        risk,
        status,
        growth_per_minute,
        snapshots_compared: window.len(),
    }
}
