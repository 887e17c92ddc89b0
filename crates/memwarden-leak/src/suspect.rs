use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakSuspect {
    pub source: String,
    pub description: String,
    pub confidence: f64,
    pub evidence: Value,
    pub reported_at: u64,
    pub verified: bool,
    pub false_positive: bool,
}

impl LeakSuspect {
    /// Registry key. Two reports of one source in the same millisecond share it.
    pub fn key(&self) -> String {
        format!("{}_{}", self.source, self.reported_at)
    }
}

/// Decides whether a freshly reported suspect counts as a verified leak.
pub trait VerificationJudge: Send + Sync {
    fn verify(&self, suspect: &LeakSuspect, leak_confidence: f64) -> bool;
}

/// Verifies any suspect reported at or above the configured confidence.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThresholdJudge;

impl VerificationJudge for ThresholdJudge {
    fn verify(&self, suspect: &LeakSuspect, leak_confidence: f64) -> bool {
        suspect.confidence >= leak_confidence
    }
}

/// Leaves every suspect unverified until the host confirms it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualJudge;

impl VerificationJudge for ManualJudge {
    fn verify(&self, _suspect: &LeakSuspect, _leak_confidence: f64) -> bool {
        false
    }
}

impl<F> VerificationJudge for F
where
    F: Fn(&LeakSuspect, f64) -> bool + Send + Sync,
{
    fn verify(&self, suspect: &LeakSuspect, leak_confidence: f64) -> bool {
        self(suspect, leak_confidence)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspectSummary {
    pub total: usize,
    pub verified: usize,
    pub false_positives: usize,
    pub average_confidence: f64,
}

pub fn summarize_suspects(suspects: &HashMap<String, LeakSuspect>) -> SuspectSummary {
    let total = suspects.len();
    let verified = suspects.values().filter(|s| s.verified).count();
    let false_positives = suspects.values().filter(|s| s.false_positive).count();
    let average_confidence = if total == 0 {
        0.0
    } else {
        suspects.values().map(|s| s.confidence).sum::<f64>() / total as f64
    };

    SuspectSummary {
        total,
        verified,
        false_positives,
        average_confidence,
    }
}
