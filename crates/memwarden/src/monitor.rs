use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use memwarden_analyzer::{MemoryUsageAnalyzer, DEFAULT_PREDICTION_MS};
use memwarden_cleanup::{CleanupContext, CleanupOutcome, ProactiveCleanupManager, TimerCanceller};
use memwarden_core::{
    init_tracing, MemoryReading, MemwardenConfig, Result, SharedClock, SharedGcHint,
    SharedMemorySource, SystemClock, SystemMemoryInfo,
};
use memwarden_leak::{LeakDetectionOutcome, LeakDetector};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const MONITOR_SOURCE: &str = "monitor";

/// Summary of one monitoring step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorTick {
    pub timestamp: u64,
    pub reading: Option<MemoryReading>,
    pub pressure: f64,
    pub predicted_pressure: f64,
    pub pressure_event_recorded: bool,
    pub leak: LeakDetectionOutcome,
    /// Present only when a cleanup was due.
    pub cleanup: Option<CleanupOutcome>,
}

/// Wires the analyzer, leak detector and cleanup manager to one memory
/// source and drives them together.
pub struct MemoryMonitor {
    analyzer: MemoryUsageAnalyzer,
    leak: Mutex<LeakDetector>,
    cleanup: Mutex<ProactiveCleanupManager>,
    memory: SharedMemorySource,
    clock: SharedClock,
}

impl std::fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMonitor").finish_non_exhaustive()
    }
}

pub struct MemoryMonitorBuilder {
    config: MemwardenConfig,
    clock: SharedClock,
    memory: SharedMemorySource,
    gc: Option<SharedGcHint>,
    timers: Option<Arc<dyn TimerCanceller>>,
}

impl MemoryMonitorBuilder {
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn memory_source(mut self, memory: SharedMemorySource) -> Self {
        self.memory = memory;
        self
    }

    pub fn gc_hint(mut self, gc: SharedGcHint) -> Self {
        self.gc = Some(gc);
        self
    }

    pub fn timer_canceller(mut self, timers: Arc<dyn TimerCanceller>) -> Self {
        self.timers = Some(timers);
        self
    }

    pub fn build(self) -> Result<MemoryMonitor> {
        self.config.validate()?;

        let analyzer = MemoryUsageAnalyzer::with_clock(self.config.analyzer, self.clock.clone())?;
        let leak = LeakDetector::with_clock(self.config.leak, self.clock.clone())?
            .with_memory_source(self.memory.clone());

        let mut cleanup = ProactiveCleanupManager::with_clock(self.config.cleanup, self.clock.clone())?
            .with_memory_source(self.memory.clone());
        if let Some(gc) = self.gc {
            cleanup = cleanup.with_gc_hint(gc);
        }
        if let Some(timers) = self.timers {
            cleanup = cleanup.with_timer_canceller(timers);
        }

        info!("Memory monitor initialized");
        Ok(MemoryMonitor {
            analyzer,
            leak: Mutex::new(leak),
            cleanup: Mutex::new(cleanup),
            memory: self.memory,
            clock: self.clock,
        })
    }
}

impl MemoryMonitor {
    /// Defaults to the system clock and host memory read through `sysinfo`.
    pub fn builder(config: MemwardenConfig) -> MemoryMonitorBuilder {
        MemoryMonitorBuilder {
            config,
            clock: SystemClock::shared(),
            memory: Arc::new(SystemMemoryInfo::new()),
            gc: None,
            timers: None,
        }
    }

    pub fn new(config: MemwardenConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Loads `default.toml`, `local.toml` and `MEMWARDEN__*` overrides and
    /// installs the configured log filter unless a subscriber exists.
    pub fn from_config_dir(dir: &Path) -> Result<Self> {
        let config = MemwardenConfig::load_from_sources(dir)?;
        init_tracing(&config.logging.level);
        Self::new(config)
    }

    pub fn analyzer(&self) -> &MemoryUsageAnalyzer {
        &self.analyzer
    }

    pub fn leak_detector(&self) -> MutexGuard<'_, LeakDetector> {
        self.leak.lock()
    }

    pub fn cleanup_manager(&self) -> MutexGuard<'_, ProactiveCleanupManager> {
        self.cleanup.lock()
    }

    /// Reads memory once, feeds every component, runs leak detection and,
    /// when due, a cleanup seeded with the worse of current and forecast
    /// pressure.
    #[instrument(skip(self))]
    pub fn tick(&self) -> MonitorTick {
        let timestamp = self.clock.now_ms();
        let reading = self.memory.read();
        let pressure = reading.map_or(0.0, |r| r.pressure());

        let mut pressure_event_recorded = false;
        if let Some(r) = reading {
            self.analyzer
                .record_usage(r.used, r.total, json!({ "source": MONITOR_SOURCE }));
            pressure_event_recorded = self.leak.lock().record_memory_pressure(
                pressure,
                MONITOR_SOURCE,
                json!({ "used": r.used, "total": r.total }),
            );
        } else {
            debug!("No memory reading available");
        }

        let leak = self.leak.lock().perform_leak_detection();
        let predicted_pressure = self.analyzer.predict_usage(DEFAULT_PREDICTION_MS).predicted;

        let cleanup = {
            let mut manager = self.cleanup.lock();
            if manager.is_cleanup_due() {
                let seed = pressure.max(predicted_pressure);
                Some(manager.perform_intelligent_cleanup(&CleanupContext::with_pressure(seed)))
            } else {
                None
            }
        };

        if leak.detected() {
            warn!(pressure, predicted_pressure, "Monitor tick flagged a possible leak");
        }

        MonitorTick {
            timestamp,
            reading,
            pressure,
            predicted_pressure,
            pressure_event_recorded,
            leak,
            cleanup,
        }
    }

    /// Starts the analyzer's continuous task and a periodic `tick` loop on
    /// the current tokio runtime. The loop ends once the monitor is dropped.
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No tokio runtime available, memory monitor not started");
                return None;
            }
        };

        self.analyzer.start_continuous_analysis();
        let weak: Weak<Self> = Arc::downgrade(self);

        info!(interval_ms = interval.as_millis() as u64, "Memory monitor loop started");
        Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(monitor) => {
                        monitor.tick();
                    }
                    None => break,
                }
            }
        }))
    }

    pub fn reset(&self) {
        self.analyzer.reset();
        self.leak.lock().reset();
    }

    pub fn dispose(&self) {
        self.analyzer.dispose();
    }
}
