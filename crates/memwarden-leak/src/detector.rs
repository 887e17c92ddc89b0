use std::collections::{HashMap, VecDeque};

use memwarden_core::{
    LeakDetectorConfig, NoMemoryInfo, Result, RiskLevel, SharedClock, SharedMemorySource,
    SystemClock,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analysis::{
    assess_snapshot_risk, detection_confidence, leak_recommendations, LeakAnalysis,
    LeakDetectionOutcome, LeakRiskAssessment, LeakScore, SkipReason,
};
use crate::creation::{analyze_creation_patterns, ObjectCreationPattern};
use crate::pressure::{analyze_pressure, is_rising, MemoryPressureEvent, PRESSURE_TREND_EVENTS};
use crate::snapshot::{analyze_growth, MemorySnapshot};
use crate::suspect::{summarize_suspects, LeakSuspect, ThresholdJudge, VerificationJudge};

const RAPID_CREATION_CONFIDENCE: f64 = 0.6;
const ACCUMULATION_CONFIDENCE: f64 = 0.7;
const PRESSURE_TREND_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeakDetectorStats {
    pub snapshots: usize,
    pub tracked_types: usize,
    pub suspects: usize,
    pub verified_suspects: usize,
    pub pressure_events: usize,
    pub analyses_performed: u64,
    /// Passes whose verdict was a detection.
    pub total_detections: u64,
    pub suspects_reported: u64,
    pub true_positives: u64,
    pub false_positives: u64,
    pub last_analysis: Option<u64>,
    pub last_risk: Option<RiskLevel>,
}

/// Heuristic leak detector fed by the host's tracking hooks.
pub struct LeakDetector {
    config: LeakDetectorConfig,
    clock: SharedClock,
    memory: SharedMemorySource,
    judge: Box<dyn VerificationJudge>,
    snapshots: VecDeque<MemorySnapshot>,
    creation_patterns: HashMap<String, ObjectCreationPattern>,
    suspects: HashMap<String, LeakSuspect>,
    pressure_events: VecDeque<MemoryPressureEvent>,
    last_analysis: Option<u64>,
    stats: LeakDetectorStats,
}

impl LeakDetector {
    pub fn new(config: LeakDetectorConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    pub fn with_clock(config: LeakDetectorConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            memory: Arc::new(NoMemoryInfo),
            judge: Box::new(ThresholdJudge),
            snapshots: VecDeque::new(),
            creation_patterns: HashMap::new(),
            suspects: HashMap::new(),
            pressure_events: VecDeque::new(),
            last_analysis: None,
            stats: LeakDetectorStats::default(),
        })
    }

    pub fn with_memory_source(mut self, memory: SharedMemorySource) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_judge(mut self, judge: impl VerificationJudge + 'static) -> Self {
        self.judge = Box::new(judge);
        self
    }

    pub fn set_judge(&mut self, judge: Box<dyn VerificationJudge>) {
        self.judge = judge;
    }

    pub fn config(&self) -> &LeakDetectorConfig {
        &self.config
    }

    pub fn update_config(&mut self, config: LeakDetectorConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        trim(&mut self.snapshots, self.config.snapshot_history);
        trim(&mut self.pressure_events, self.config.pressure_history);
        Ok(())
    }

    /// Full detection pass. Runs at most once per analysis window.
    pub fn perform_leak_detection(&mut self) -> LeakDetectionOutcome {
        if !self.config.enabled {
            return LeakDetectionOutcome::Skipped {
                reason: SkipReason::Disabled,
            };
        }

        let now = self.clock.now_ms();
        if let Some(last) = self.last_analysis {
            if now.saturating_sub(last) < self.config.analysis_window_ms {
                debug!(
                    since_last_ms = now.saturating_sub(last),
                    "Skipping leak detection, analysis too frequent"
                );
                return LeakDetectionOutcome::Skipped {
                    reason: SkipReason::TooFrequent,
                };
            }
        }
        self.last_analysis = Some(now);

        let snapshot = self.capture_snapshot();
        let thresholds = &self.config.thresholds;

        let growth = analyze_growth(&self.snapshots, thresholds);
        let patterns = analyze_creation_patterns(&self.creation_patterns, thresholds);
        let pressure = analyze_pressure(&self.pressure_events);
        let suspects = summarize_suspects(&self.suspects);

        let score = LeakScore::compute(growth.as_ref(), &patterns, &pressure, &suspects);
        let risk_score = score.total();
        let overall_risk = RiskLevel::from_score(risk_score);
        let detected = overall_risk >= RiskLevel::Medium;
        let confidence = detection_confidence(
            self.snapshots.len(),
            growth.as_ref(),
            &patterns,
            &pressure,
            &suspects,
        );
        let recommendations =
            leak_recommendations(growth.as_ref(), &patterns, &pressure, &suspects);

        self.stats.analyses_performed += 1;
        self.stats.last_analysis = Some(now);
        self.stats.last_risk = Some(overall_risk);
        if detected {
            self.stats.total_detections += 1;
            warn!(
                risk = %overall_risk,
                score = risk_score,
                confidence,
                "Potential memory leak detected"
            );
            for recommendation in &recommendations {
                info!(%recommendation, "Leak detection recommendation");
            }
        } else {
            debug!(risk = %overall_risk, score = risk_score, "Leak detection pass complete");
        }

        LeakDetectionOutcome::Completed(Box::new(LeakAnalysis {
            timestamp: now,
            detected,
            overall_risk,
            risk_score,
            score,
            confidence,
            snapshot,
            growth,
            patterns,
            pressure,
            suspects,
            recommendations,
        }))
    }

    /// Reads the memory source into the bounded snapshot history.
    pub fn capture_snapshot(&mut self) -> MemorySnapshot {
        let snapshot = MemorySnapshot::capture(self.clock.now_ms(), self.memory.read());
        self.snapshots.push_back(snapshot);
        trim(&mut self.snapshots, self.config.snapshot_history);
        snapshot
    }

    pub fn track_object_creation(&mut self, object_type: &str, size: u64, metadata: Value) {
        let now = self.clock.now_ms();
        let history_limit = self.config.creation_history;
        let pattern = self
            .creation_patterns
            .entry(object_type.to_string())
            .or_default();
        pattern.record(size, now, metadata, history_limit);
        let pattern = pattern.clone();

        self.check_creation_pattern(object_type, &pattern);
    }

    fn check_creation_pattern(&mut self, object_type: &str, pattern: &ObjectCreationPattern) {
        let thresholds = &self.config.thresholds;
        let rapid = pattern.creation_rate > thresholds.creation_rate_leak;
        let accumulated = pattern.total_size > thresholds.accumulated_bytes;

        if rapid {
            self.report_suspected_leak(
                &format!("object_creation_{object_type}"),
                &format!(
                    "Rapid creation of {object_type} objects ({:.1}/s)",
                    pattern.creation_rate
                ),
                RAPID_CREATION_CONFIDENCE,
                json!({
                    "creation_rate": pattern.creation_rate,
                    "count": pattern.count,
                }),
            );
        }

        if accumulated {
            self.report_suspected_leak(
                &format!("memory_accumulation_{object_type}"),
                &format!(
                    "{object_type} objects hold {} bytes in total",
                    pattern.total_size
                ),
                ACCUMULATION_CONFIDENCE,
                json!({
                    "total_size": pattern.total_size,
                    "count": pattern.count,
                    "average_size": pattern.average_size,
                }),
            );
        }
    }

    /// Records a suspect and returns its key. The installed judge decides
    /// whether it is verified on arrival.
    pub fn report_suspected_leak(
        &mut self,
        source: &str,
        description: &str,
        confidence: f64,
        evidence: Value,
    ) -> String {
        let mut suspect = LeakSuspect {
            source: source.to_string(),
            description: description.to_string(),
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            evidence,
            reported_at: self.clock.now_ms(),
            verified: false,
            false_positive: false,
        };
        suspect.verified = self
            .judge
            .verify(&suspect, self.config.thresholds.leak_confidence);

        self.stats.suspects_reported += 1;
        if suspect.verified {
            self.stats.true_positives += 1;
            warn!(
                source,
                confidence = suspect.confidence,
                description,
                "Verified memory leak"
            );
        } else {
            warn!(
                source,
                confidence = suspect.confidence,
                description,
                "Suspected memory leak"
            );
        }

        let key = suspect.key();
        self.suspects.insert(key.clone(), suspect);
        key
    }

    /// Returns whether the event was recorded. Readings below the pressure
    /// threshold are dropped.
    pub fn record_memory_pressure(&mut self, pressure: f64, source: &str, context: Value) -> bool {
        if pressure.is_nan() || pressure < self.config.thresholds.memory_pressure {
            return false;
        }

        self.pressure_events.push_back(MemoryPressureEvent {
            pressure,
            source: source.to_string(),
            context,
            timestamp: self.clock.now_ms(),
        });
        trim(&mut self.pressure_events, self.config.pressure_history);

        self.analyze_pressure_patterns();
        true
    }

    fn analyze_pressure_patterns(&mut self) {
        if !is_rising(&self.pressure_events) {
            return;
        }
        let recent: Vec<f64> = self
            .pressure_events
            .iter()
            .rev()
            .take(PRESSURE_TREND_EVENTS)
            .rev()
            .map(|e| e.pressure)
            .collect();

        self.report_suspected_leak(
            "pressure_trend",
            "Memory pressure is rising across consecutive events",
            PRESSURE_TREND_CONFIDENCE,
            json!({ "pressures": recent }),
        );
    }

    pub fn get_risk_assessment(&self) -> LeakRiskAssessment {
        assess_snapshot_risk(&self.snapshots, &self.config.thresholds)
    }

    /// Marks a suspect as a real leak. Returns false for unknown keys.
    pub fn confirm_suspect(&mut self, key: &str) -> bool {
        let Some(suspect) = self.suspects.get_mut(key) else {
            return false;
        };
        if suspect.false_positive {
            suspect.false_positive = false;
            self.stats.false_positives = self.stats.false_positives.saturating_sub(1);
        }
        if !suspect.verified {
            suspect.verified = true;
            self.stats.true_positives += 1;
        }
        true
    }

    /// Marks a suspect as a false positive, withdrawing any verification.
    pub fn dismiss_suspect(&mut self, key: &str) -> bool {
        let Some(suspect) = self.suspects.get_mut(key) else {
            return false;
        };
        if suspect.verified {
            suspect.verified = false;
            self.stats.true_positives = self.stats.true_positives.saturating_sub(1);
        }
        if !suspect.false_positive {
            suspect.false_positive = true;
            self.stats.false_positives += 1;
        }
        true
    }

    /// All suspects, oldest report first.
    pub fn suspects(&self) -> Vec<LeakSuspect> {
        let mut suspects: Vec<LeakSuspect> = self.suspects.values().cloned().collect();
        suspects.sort_by(|a, b| {
            a.reported_at
                .cmp(&b.reported_at)
                .then_with(|| a.source.cmp(&b.source))
        });
        suspects
    }

    pub fn suspect(&self, key: &str) -> Option<&LeakSuspect> {
        self.suspects.get(key)
    }

    pub fn creation_patterns(&self) -> &HashMap<String, ObjectCreationPattern> {
        &self.creation_patterns
    }

    pub fn snapshots(&self) -> &VecDeque<MemorySnapshot> {
        &self.snapshots
    }

    pub fn pressure_events(&self) -> &VecDeque<MemoryPressureEvent> {
        &self.pressure_events
    }

    pub fn get_stats(&self) -> LeakDetectorStats {
        LeakDetectorStats {
            snapshots: self.snapshots.len(),
            tracked_types: self.creation_patterns.len(),
            suspects: self.suspects.len(),
            verified_suspects: self.suspects.values().filter(|s| s.verified).count(),
            pressure_events: self.pressure_events.len(),
            ..self.stats.clone()
        }
    }

    pub fn reset(&mut self) {
        self.snapshots.clear();
        self.creation_patterns.clear();
        self.suspects.clear();
        self.pressure_events.clear();
        self.last_analysis = None;
        self.stats = LeakDetectorStats::default();
        info!("Leak detector reset");
    }
}

impl Default for LeakDetector {
    fn default() -> Self {
        Self {
            config: LeakDetectorConfig::default(),
            clock: SystemClock::shared(),
            memory: Arc::new(NoMemoryInfo),
            judge: Box::new(ThresholdJudge),
            snapshots: VecDeque::new(),
            creation_patterns: HashMap::new(),
            suspects: HashMap::new(),
            pressure_events: VecDeque::new(),
            last_analysis: None,
            stats: LeakDetectorStats::default(),
        }
    }
}

fn trim<T>(queue: &mut VecDeque<T>, limit: usize) {
    while queue.len() > limit {
        queue.pop_front();
    }
}
