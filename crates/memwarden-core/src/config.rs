use std::path::Path;

use config as cfg;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{MemwardenError, Result};

fn check_ratio(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) || !value.is_finite() {
        return Err(MemwardenError::InvalidConfig(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if value <= 0.0 || !value.is_finite() {
        return Err(MemwardenError::InvalidConfig(format!(
            "{name} must be positive, got {value}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzerConfig {
    /// Maximum number of usage samples retained.
    #[serde(default = "AnalyzerConfig::default_history_size")]
    pub history_size: usize,
    /// Period of the continuous analysis task, and the unit of trend windows.
    #[serde(default = "AnalyzerConfig::default_analysis_interval_ms")]
    pub analysis_interval_ms: u64,
    /// Number of trailing samples used for pattern statistics.
    #[serde(default = "AnalyzerConfig::default_pattern_window")]
    pub pattern_window: usize,
    /// Pressure above which a sample forces an immediate pattern update.
    #[serde(default = "AnalyzerConfig::default_critical_pressure")]
    pub critical_pressure: f64,
    #[serde(default = "AnalyzerConfig::default_cycle_min_samples")]
    pub cycle_min_samples: usize,
    #[serde(default = "AnalyzerConfig::default_cycle_window")]
    pub cycle_window: usize,
    #[serde(default = "AnalyzerConfig::default_cycle_threshold")]
    pub cycle_threshold: f64,
}

impl AnalyzerConfig {
    fn default_history_size() -> usize {
        200
    }

    fn default_analysis_interval_ms() -> u64 {
        5_000
    }

    fn default_pattern_window() -> usize {
        30
    }

    fn default_critical_pressure() -> f64 {
        0.9
    }

    fn default_cycle_min_samples() -> usize {
        20
    }

    fn default_cycle_window() -> usize {
        60
    }

    fn default_cycle_threshold() -> f64 {
        0.7
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_size == 0 {
            return Err(MemwardenError::InvalidConfig(
                "analyzer.history_size must be at least 1".into(),
            ));
        }
        if self.analysis_interval_ms == 0 {
            return Err(MemwardenError::InvalidConfig(
                "analyzer.analysis_interval_ms must be positive".into(),
            ));
        }
        if self.pattern_window < 2 {
            return Err(MemwardenError::InvalidConfig(
                "analyzer.pattern_window must be at least 2".into(),
            ));
        }
        if self.cycle_window < self.cycle_min_samples {
            return Err(MemwardenError::InvalidConfig(
                "analyzer.cycle_window must not be smaller than cycle_min_samples".into(),
            ));
        }
        check_ratio("analyzer.critical_pressure", self.critical_pressure)?;
        check_ratio("analyzer.cycle_threshold", self.cycle_threshold)?;
        Ok(())
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            history_size: Self::default_history_size(),
            analysis_interval_ms: Self::default_analysis_interval_ms(),
            pattern_window: Self::default_pattern_window(),
            critical_pressure: Self::default_critical_pressure(),
            cycle_min_samples: Self::default_cycle_min_samples(),
            cycle_window: Self::default_cycle_window(),
            cycle_threshold: Self::default_cycle_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LeakThresholds {
    /// Average snapshot growth per second flagged as suspicious.
    #[serde(default = "LeakThresholds::default_suspicious_growth")]
    pub suspicious_growth: f64,
    #[serde(default = "LeakThresholds::default_critical_growth")]
    pub critical_growth: f64,
    /// Pressure events below this value are ignored.
    #[serde(default = "LeakThresholds::default_memory_pressure")]
    pub memory_pressure: f64,
    /// Suspects at or above this confidence are verified on report.
    #[serde(default = "LeakThresholds::default_leak_confidence")]
    pub leak_confidence: f64,
    #[serde(default = "LeakThresholds::default_creation_rate_warning")]
    pub creation_rate_warning: f64,
    #[serde(default = "LeakThresholds::default_creation_rate_leak")]
    pub creation_rate_leak: f64,
    #[serde(default = "LeakThresholds::default_object_count_warning")]
    pub object_count_warning: u64,
    #[serde(default = "LeakThresholds::default_object_count_high")]
    pub object_count_high: u64,
    /// Cumulative bytes per object type that trigger an accumulation report.
    #[serde(default = "LeakThresholds::default_accumulated_bytes")]
    pub accumulated_bytes: u64,
}

impl LeakThresholds {
    fn default_suspicious_growth() -> f64 {
        0.05
    }

    fn default_critical_growth() -> f64 {
        0.15
    }

    fn default_memory_pressure() -> f64 {
        0.8
    }

    fn default_leak_confidence() -> f64 {
        0.7
    }

    fn default_creation_rate_warning() -> f64 {
        10.0
    }

    fn default_creation_rate_leak() -> f64 {
        50.0
    }

    fn default_object_count_warning() -> u64 {
        1_000
    }

    fn default_object_count_high() -> u64 {
        5_000
    }

    fn default_accumulated_bytes() -> u64 {
        10 * 1024 * 1024
    }

    pub fn validate(&self) -> Result<()> {
        check_positive("leak.thresholds.suspicious_growth", self.suspicious_growth)?;
        check_positive("leak.thresholds.critical_growth", self.critical_growth)?;
        if self.critical_growth < self.suspicious_growth {
            return Err(MemwardenError::InvalidConfig(
                "leak.thresholds.critical_growth must not be below suspicious_growth".into(),
            ));
        }
        check_ratio("leak.thresholds.memory_pressure", self.memory_pressure)?;
        check_ratio("leak.thresholds.leak_confidence", self.leak_confidence)?;
        check_positive(
            "leak.thresholds.creation_rate_warning",
            self.creation_rate_warning,
        )?;
        check_positive("leak.thresholds.creation_rate_leak", self.creation_rate_leak)?;
        if self.object_count_high < self.object_count_warning {
            return Err(MemwardenError::InvalidConfig(
                "leak.thresholds.object_count_high must not be below object_count_warning".into(),
            ));
        }
        Ok(())
    }
}

impl Default for LeakThresholds {
    fn default() -> Self {
        Self {
            suspicious_growth: Self::default_suspicious_growth(),
            critical_growth: Self::default_critical_growth(),
            memory_pressure: Self::default_memory_pressure(),
            leak_confidence: Self::default_leak_confidence(),
            creation_rate_warning: Self::default_creation_rate_warning(),
            creation_rate_leak: Self::default_creation_rate_leak(),
            object_count_warning: Self::default_object_count_warning(),
            object_count_high: Self::default_object_count_high(),
            accumulated_bytes: Self::default_accumulated_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LeakDetectorConfig {
    #[serde(default = "LeakDetectorConfig::default_enabled")]
    pub enabled: bool,
    /// Minimum spacing between two full detection passes.
    #[serde(default = "LeakDetectorConfig::default_analysis_window_ms")]
    pub analysis_window_ms: u64,
    #[serde(default = "LeakDetectorConfig::default_snapshot_history")]
    pub snapshot_history: usize,
    #[serde(default = "LeakDetectorConfig::default_pressure_history")]
    pub pressure_history: usize,
    /// Per-type creation timestamps retained.
    #[serde(default = "LeakDetectorConfig::default_creation_history")]
    pub creation_history: usize,
    #[serde(default)]
    pub thresholds: LeakThresholds,
}

impl LeakDetectorConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_analysis_window_ms() -> u64 {
        60_000
    }

    fn default_snapshot_history() -> usize {
        100
    }

    fn default_pressure_history() -> usize {
        100
    }

    fn default_creation_history() -> usize {
        50
    }

    pub fn validate(&self) -> Result<()> {
        if self.snapshot_history == 0 || self.pressure_history == 0 || self.creation_history == 0
        {
            return Err(MemwardenError::InvalidConfig(
                "leak history sizes must be at least 1".into(),
            ));
        }
        self.thresholds.validate()
    }
}

impl Default for LeakDetectorConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            analysis_window_ms: Self::default_analysis_window_ms(),
            snapshot_history: Self::default_snapshot_history(),
            pressure_history: Self::default_pressure_history(),
            creation_history: Self::default_creation_history(),
            thresholds: LeakThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CleanupMode {
    Conservative,
    Adaptive,
    Aggressive,
}

impl Default for CleanupMode {
    fn default() -> Self {
        Self::Adaptive
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchedulingConfig {
    #[serde(default = "SchedulingConfig::default_base_interval_ms")]
    pub base_interval_ms: u64,
    #[serde(default = "SchedulingConfig::default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "SchedulingConfig::default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Interval factor applied under high pressure.
    #[serde(default = "SchedulingConfig::default_pressure_multiplier")]
    pub pressure_multiplier: f64,
    /// Interval factor applied when memory is mostly idle.
    #[serde(default = "SchedulingConfig::default_idle_multiplier")]
    pub idle_multiplier: f64,
}

impl SchedulingConfig {
    fn default_base_interval_ms() -> u64 {
        30_000
    }

    fn default_min_interval_ms() -> u64 {
        5_000
    }

    fn default_max_interval_ms() -> u64 {
        120_000
    }

    fn default_pressure_multiplier() -> f64 {
        0.5
    }

    fn default_idle_multiplier() -> f64 {
        2.0
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_interval_ms > self.base_interval_ms
            || self.base_interval_ms > self.max_interval_ms
        {
            return Err(MemwardenError::InvalidConfig(format!(
                "cleanup.scheduling intervals must satisfy min <= base <= max ({} <= {} <= {})",
                self.min_interval_ms, self.base_interval_ms, self.max_interval_ms
            )));
        }
        check_positive(
            "cleanup.scheduling.pressure_multiplier",
            self.pressure_multiplier,
        )?;
        check_positive("cleanup.scheduling.idle_multiplier", self.idle_multiplier)?;
        Ok(())
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: Self::default_base_interval_ms(),
            min_interval_ms: Self::default_min_interval_ms(),
            max_interval_ms: Self::default_max_interval_ms(),
            pressure_multiplier: Self::default_pressure_multiplier(),
            idle_multiplier: Self::default_idle_multiplier(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceLimits {
    #[serde(default = "ResourceLimits::default_image_cache")]
    pub image_cache: usize,
    #[serde(default = "ResourceLimits::default_audio_cache")]
    pub audio_cache: usize,
    /// Cache entries not accessed for this long are expired.
    #[serde(default = "ResourceLimits::default_max_cache_age_ms")]
    pub max_cache_age_ms: u64,
    #[serde(default = "ResourceLimits::default_max_memory_pressure")]
    pub max_memory_pressure: f64,
}

impl ResourceLimits {
    fn default_image_cache() -> usize {
        50
    }

    fn default_audio_cache() -> usize {
        20
    }

    fn default_max_cache_age_ms() -> u64 {
        300_000
    }

    fn default_max_memory_pressure() -> f64 {
        0.8
    }

    pub fn validate(&self) -> Result<()> {
        if self.image_cache == 0 || self.audio_cache == 0 {
            return Err(MemwardenError::InvalidConfig(
                "cleanup.limits cache capacities must be at least 1".into(),
            ));
        }
        check_ratio("cleanup.limits.max_memory_pressure", self.max_memory_pressure)
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            image_cache: Self::default_image_cache(),
            audio_cache: Self::default_audio_cache(),
            max_cache_age_ms: Self::default_max_cache_age_ms(),
            max_memory_pressure: Self::default_max_memory_pressure(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CleanupConfig {
    #[serde(default = "CleanupConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: CleanupMode,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub limits: ResourceLimits,
    /// Minimum spacing between two runs of the same custom cleanup.
    #[serde(default = "CleanupConfig::default_custom_cleanup_cooldown_ms")]
    pub custom_cleanup_cooldown_ms: u64,
}

impl CleanupConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_custom_cleanup_cooldown_ms() -> u64 {
        30_000
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduling.validate()?;
        self.limits.validate()
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            mode: CleanupMode::default(),
            scheduling: SchedulingConfig::default(),
            limits: ResourceLimits::default(),
            custom_cleanup_cooldown_ms: Self::default_custom_cleanup_cooldown_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct MemwardenConfig {
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub leak: LeakDetectorConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MemwardenConfig {
    pub fn validate(&self) -> Result<()> {
        self.analyzer.validate()?;
        self.leak.validate()?;
        self.cleanup.validate()
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Layered load: `default.toml`, then `local.toml` from `config_dir`,
    /// then `MEMWARDEN__*` environment variables. Missing files are fine.
    pub fn load_from_sources(config_dir: &Path) -> Result<Self> {
        let config: Self = cfg::Config::builder()
            .add_source(cfg::File::from(config_dir.join("default.toml")).required(false))
            .add_source(cfg::File::from(config_dir.join("local.toml")).required(false))
            .add_source(cfg::Environment::with_prefix("MEMWARDEN").separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        info!(dir = %config_dir.display(), "Loaded memwarden configuration");
        Ok(config)
    }
}
