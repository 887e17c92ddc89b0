//! Memory usage analysis, heuristic leak detection and proactive cleanup.
//!
//! The three components work on their own; [`MemoryMonitor`] drives them
//! from a single memory source.

pub mod monitor;

pub use memwarden_analyzer as analyzer;
pub use memwarden_cleanup as cleanup;
pub use memwarden_leak as leak;

pub use memwarden_analyzer::{AnalysisOutcome, MemoryUsageAnalyzer};
pub use memwarden_cleanup::{CleanupContext, CleanupOutcome, ProactiveCleanupManager, StrategyKind};
pub use memwarden_core::{
    init_tracing, Clock, GcHint, ManualClock, MemoryInfoSource, MemoryReading, MemwardenConfig,
    MemwardenError, Result, RiskLevel,
};
pub use memwarden_leak::{LeakDetectionOutcome, LeakDetector};
pub use monitor::{MemoryMonitor, MemoryMonitorBuilder, MonitorTick};
