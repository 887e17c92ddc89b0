use memwarden_core::{LeakThresholds, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreationRecord {
    pub timestamp: u64,
    pub size: u64,
    pub metadata: Value,
}

/// Running totals for one object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectCreationPattern {
    pub count: u64,
    pub total_size: u64,
    pub average_size: f64,
    /// Instantaneous creations per second, from the gap to the previous
    /// creation of the same type.
    pub creation_rate: f64,
    pub last_creation: u64,
    pub history: VecDeque<CreationRecord>,
}

impl ObjectCreationPattern {
    pub fn new() -> Self {
        Self {
            count: 0,
            total_size: 0,
            average_size: 0.0,
            creation_rate: 0.0,
            last_creation: 0,
            history: VecDeque::new(),
        }
    }

    pub fn record(&mut self, size: u64, now_ms: u64, metadata: Value, history_limit: usize) {
        self.creation_rate = if self.count == 0 {
            0.0
        } else {
            let elapsed = now_ms.saturating_sub(self.last_creation).max(1);
            1000.0 / elapsed as f64
        };

        self.count += 1;
        self.total_size = self.total_size.saturating_add(size);
        self.average_size = self.total_size as f64 / self.count as f64;
        self.last_creation = now_ms;

        self.history.push_back(CreationRecord {
            timestamp: now_ms,
            size,
            metadata,
        });
        while self.history.len() > history_limit {
            self.history.pop_front();
        }
    }
}

impl Default for ObjectCreationPattern {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternIssueKind {
    HighCreationRate,
    ObjectAccumulation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternIssue {
    pub object_type: String,
    pub kind: PatternIssueKind,
    pub severity: Severity,
    /// Creation rate or object count, depending on `kind`.
    pub value: f64,
}

/// Flags fast-creating and accumulating object types, ordered by type name.
pub fn analyze_creation_patterns(
    patterns: &HashMap<String, ObjectCreationPattern>,
    thresholds: &LeakThresholds,
) -> Vec<PatternIssue> {
    let mut types: Vec<&String> = patterns.keys().collect();
    types.sort();

    let mut issues = Vec::new();
    for object_type in types {
        let pattern = &patterns[object_type];

        if pattern.creation_rate > thresholds.creation_rate_warning {
            let severity = if pattern.creation_rate > thresholds.creation_rate_leak {
                Severity::High
            } else {
                Severity::Medium
            };
            issues.push(PatternIssue {
                object_type: object_type.clone(),
                kind: PatternIssueKind::HighCreationRate,
                severity,
                value: pattern.creation_rate,
            });
        }

        if pattern.count > thresholds.object_count_warning {
            let severity = if pattern.count > thresholds.object_count_high {
                Severity::High
            } else {
                Severity::Medium
            };
            issues.push(PatternIssue {
                object_type: object_type.clone(),
                kind: PatternIssueKind::ObjectAccumulation,
                severity,
                value: pattern.count as f64,
            });
        }
    }
    issues
}
