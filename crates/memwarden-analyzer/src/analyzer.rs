use std::sync::{Arc, Weak};
use std::time::Duration;

use memwarden_core::{AnalyzerConfig, MemwardenError, Result, SharedClock, SystemClock};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::patterns::{CycleInfo, UsagePatterns};
use crate::prediction::{predict, UsagePrediction, DEFAULT_PREDICTION_MS};
use crate::risk::{assess_risk, recommendations, UsageRiskAssessment};
use crate::sample::{UsageHistory, UsageSample};
use crate::trend::{compute_trend, TrendInfo, TrendSet, DEFAULT_TREND_TIMEFRAME_MS};

/// Minimum number of samples before a full analysis is attempted.
pub const MIN_ANALYSIS_SAMPLES: usize = 5;

/// Composite result of a full analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageAnalysis {
    pub timestamp: u64,
    pub sample_count: usize,
    pub current_pressure: f64,
    pub patterns: UsagePatterns,
    pub trends: TrendSet,
    pub cycle: CycleInfo,
    pub prediction: UsagePrediction,
    pub risk: UsageRiskAssessment,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analysis", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    InsufficientData { samples: usize },
    Error { error: String },
    Complete(Box<UsageAnalysis>),
}

impl AnalysisOutcome {
    pub fn analysis(&self) -> Option<&UsageAnalysis> {
        match self {
            Self::Complete(analysis) => Some(analysis),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerStats {
    pub sample_count: usize,
    pub history_size: usize,
    pub total_samples: u64,
    pub analyses_performed: u64,
    pub critical_spikes: u64,
    pub last_analysis: Option<u64>,
    pub current_pressure: f64,
    pub patterns: UsagePatterns,
    pub continuous_analysis: bool,
}

#[derive(Debug, Default)]
struct AnalyzerCounters {
    total_samples: u64,
    analyses_performed: u64,
    critical_spikes: u64,
    last_analysis: Option<u64>,
}

#[derive(Debug)]
struct AnalyzerState {
    config: AnalyzerConfig,
    history: UsageHistory,
    patterns: UsagePatterns,
    counters: AnalyzerCounters,
}

impl AnalyzerState {
    fn new(config: AnalyzerConfig) -> Self {
        Self {
            history: UsageHistory::new(config.history_size),
            config,
            patterns: UsagePatterns::default(),
            counters: AnalyzerCounters::default(),
        }
    }

    fn current_pressure(&self) -> f64 {
        self.history.latest().map(|s| s.pressure).unwrap_or(0.0)
    }

    fn update_patterns(&mut self, now_ms: u64) {
        let window = self.history.tail(self.config.pattern_window);
        self.patterns.recompute(&window, now_ms);
    }

    fn detect_cycles(&mut self) -> CycleInfo {
        if self.history.len() < self.config.cycle_min_samples {
            self.patterns.cycle_detected = false;
            self.patterns.cycle_length_ms = 0;
            return CycleInfo {
                detected: false,
                best_lag: 0,
                correlation: 0.0,
                length_ms: 0,
            };
        }
        let pressures: Vec<f64> = self
            .history
            .tail(self.config.cycle_window)
            .iter()
            .map(|s| s.pressure)
            .collect();
        let interval = self.config.analysis_interval_ms;
        let threshold = self.config.cycle_threshold;
        self.patterns.detect_cycles(&pressures, interval, threshold)
    }

    fn predict(&self, now_ms: u64, future_time_ms: u64) -> UsagePrediction {
        let Some(latest) = self.history.latest() else {
            return UsagePrediction::empty(future_time_ms);
        };
        let trend = compute_trend(&self.history, now_ms, DEFAULT_TREND_TIMEFRAME_MS);
        predict(latest.pressure, &trend, &self.patterns, now_ms, future_time_ms)
    }

    fn analyze(&mut self, now_ms: u64) -> Result<UsageAnalysis> {
        self.update_patterns(now_ms);
        if !self.patterns.is_finite() {
            return Err(MemwardenError::Analysis(format!(
                "non-finite usage statistics: {:?}",
                self.patterns
            )));
        }

        let trends = TrendSet::compute(&self.history, now_ms, self.config.analysis_interval_ms);
        let cycle = self.detect_cycles();
        let prediction = self.predict(now_ms, DEFAULT_PREDICTION_MS);
        let current = self.current_pressure();
        let risk = assess_risk(current, &self.patterns);
        let recommendations = recommendations(risk.level, &self.patterns);

        self.counters.analyses_performed += 1;
        self.counters.last_analysis = Some(now_ms);

        Ok(UsageAnalysis {
            timestamp: now_ms,
            sample_count: self.history.len(),
            current_pressure: current,
            patterns: self.patterns.clone(),
            trends,
            cycle,
            prediction,
            risk,
            recommendations,
        })
    }
}

/// Rolling memory usage analyzer.
///
/// State lives behind an `Arc<RwLock<_>>` so the optional continuous
/// analysis task can refresh patterns through a `Weak` handle without
/// keeping the analyzer alive.
pub struct MemoryUsageAnalyzer {
    state: Arc<RwLock<AnalyzerState>>,
    clock: SharedClock,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryUsageAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    pub fn with_clock(config: AnalyzerConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: Arc::new(RwLock::new(AnalyzerState::new(config))),
            clock,
            task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> AnalyzerConfig {
        self.state.read().config.clone()
    }

    /// Replaces the configuration after validating it. History is trimmed
    /// to the new size; an invalid config leaves the old one in place.
    pub fn update_config(&self, config: AnalyzerConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.state.write();
        state.history.set_capacity(config.history_size);
        state.config = config;
        Ok(())
    }

    /// Appends a sample. A sample above the critical pressure forces an
    /// immediate pattern update.
    pub fn record_usage(&self, used: u64, total: u64, metadata: serde_json::Value) {
        let now = self.clock.now_ms();
        let sample = UsageSample::new(used, total, now, metadata);
        let pressure = sample.pressure;

        let mut state = self.state.write();
        state.history.push(sample);
        state.counters.total_samples += 1;

        if pressure > state.config.critical_pressure {
            state.counters.critical_spikes += 1;
            state.update_patterns(now);
            warn!(
                pressure,
                used, total, "Critical memory pressure sample, patterns refreshed"
            );
        }
    }

    pub fn perform_analysis(&self) -> AnalysisOutcome {
        let now = self.clock.now_ms();
        let mut state = self.state.write();

        let samples = state.history.len();
        if samples < MIN_ANALYSIS_SAMPLES {
            debug!(samples, "Not enough usage samples for analysis");
            return AnalysisOutcome::InsufficientData { samples };
        }

        match state.analyze(now) {
            Ok(analysis) => {
                debug!(
                    risk = %analysis.risk.level,
                    score = analysis.risk.score,
                    trend = %analysis.patterns.trend_direction,
                    "Memory usage analysis complete"
                );
                AnalysisOutcome::Complete(Box::new(analysis))
            }
            Err(e) => {
                error!("Memory usage analysis failed: {}", e);
                AnalysisOutcome::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    pub fn get_trend(&self, timeframe_ms: u64) -> TrendInfo {
        let now = self.clock.now_ms();
        compute_trend(&self.state.read().history, now, timeframe_ms)
    }

    pub fn get_default_trend(&self) -> TrendInfo {
        self.get_trend(DEFAULT_TREND_TIMEFRAME_MS)
    }

    pub fn predict_usage(&self, future_time_ms: u64) -> UsagePrediction {
        let now = self.clock.now_ms();
        self.state.read().predict(now, future_time_ms)
    }

    pub fn current_pressure(&self) -> f64 {
        self.state.read().current_pressure()
    }

    pub fn patterns(&self) -> UsagePatterns {
        self.state.read().patterns.clone()
    }

    pub fn history(&self) -> Vec<UsageSample> {
        self.state.read().history.iter().cloned().collect()
    }

    pub fn get_stats(&self) -> AnalyzerStats {
        let continuous_analysis = self.is_running();
        let state = self.state.read();
        AnalyzerStats {
            sample_count: state.history.len(),
            history_size: state.config.history_size,
            total_samples: state.counters.total_samples,
            analyses_performed: state.counters.analyses_performed,
            critical_spikes: state.counters.critical_spikes,
            last_analysis: state.counters.last_analysis,
            current_pressure: state.current_pressure(),
            patterns: state.patterns.clone(),
            continuous_analysis,
        }
    }

    /// Stops the continuous task and clears history, patterns and counters.
    pub fn reset(&self) {
        self.stop_continuous_analysis();
        let mut state = self.state.write();
        state.history.clear();
        state.patterns = UsagePatterns::default();
        state.counters = AnalyzerCounters::default();
        info!("Memory usage analyzer reset");
    }

    /// Spawns the periodic pattern refresh on the current tokio runtime.
    /// Returns `false` when no runtime is available or it already runs.
    pub fn start_continuous_analysis(&self) -> bool {
        let interval = Duration::from_millis(self.state.read().config.analysis_interval_ms);
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No tokio runtime available, continuous analysis disabled");
                return false;
            }
        };

        let weak: Weak<RwLock<AnalyzerState>> = Arc::downgrade(&self.state);
        let clock = self.clock.clone();

        *task = Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(state) => state.write().update_patterns(clock.now_ms()),
                    None => break,
                }
            }
        }));

        info!(interval_ms = interval.as_millis() as u64, "Continuous memory analysis started");
        true
    }

    pub fn stop_continuous_analysis(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            debug!("Continuous memory analysis stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn dispose(&self) {
        self.stop_continuous_analysis();
    }
}

impl Default for MemoryUsageAnalyzer {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(AnalyzerState::new(AnalyzerConfig::default()))),
            clock: SystemClock::shared(),
            task: Mutex::new(None),
        }
    }
}

impl Drop for MemoryUsageAnalyzer {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}
