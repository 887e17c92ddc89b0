use std::collections::BTreeMap;
use std::sync::Arc;

use memwarden_core::{
    CleanupConfig, CleanupMode, NoGcHint, NoMemoryInfo, Result, SharedClock, SharedGcHint,
    SharedMemorySource, SystemClock,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::actions::{execute_action, ActionEnv, ActionTally};
use crate::schedule::{next_interval, smoothed_efficiency};
use crate::strategy::{select_strategy, CleanupStrategy, StrategyKind};
use crate::targets::{
    AssetHandle, CanvasRegistration, CleanupTargets, CustomCleanup, EventTarget, ListenerId,
    ListenerRegistration, NoTimers, TimerCanceller, TimerId, TimerKind, TimerRegistration,
};

pub const IMAGE_EVICT_ON_FULL: usize = 5;
pub const AUDIO_EVICT_ON_FULL: usize = 3;
pub const DEFAULT_CUSTOM_PRIORITY: u32 = 5;

/// Caller-provided hints for a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupContext {
    /// Falls back to the memory source when absent.
    pub memory_pressure: Option<f64>,
}

impl CleanupContext {
    pub fn with_pressure(memory_pressure: f64) -> Self {
        Self {
            memory_pressure: Some(memory_pressure),
        }
    }
}

struct StrategyRun {
    actions: Vec<String>,
    tally: ActionTally,
}

struct MeasuredRun {
    run: StrategyRun,
    cleanup_time_ms: f64,
    memory_freed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub strategy: StrategyKind,
    pub memory_pressure: f64,
    pub memory_freed: u64,
    pub cleanup_time_ms: f64,
    /// Bytes freed per millisecond for this pass.
    pub efficiency: f64,
    /// Executed action names, with `_timeout` / `_error` markers.
    pub actions: Vec<String>,
    #[serde(flatten)]
    pub tally: ActionTally,
    pub next_cleanup_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupSkipReason {
    Disabled,
    TooFrequent,
}

impl CleanupSkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "Cleanup disabled",
            Self::TooFrequent => "Too frequent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CleanupOutcome {
    Skipped { reason: CleanupSkipReason },
    Performed(Box<CleanupReport>),
}

impl CleanupOutcome {
    pub fn performed(&self) -> bool {
        matches!(self, Self::Performed(_))
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Skipped { reason } => Some(reason.as_str()),
            Self::Performed(_) => None,
        }
    }

    pub fn report(&self) -> Option<&CleanupReport> {
        match self {
            Self::Performed(report) => Some(report),
            Self::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupStats {
    pub enabled: bool,
    pub mode: CleanupMode,
    pub cleanup_count: u64,
    pub total_memory_freed: u64,
    pub average_cleanup_time_ms: f64,
    pub efficiency: f64,
    pub strategies_used: BTreeMap<StrategyKind, u64>,
    pub last_report: Option<CleanupReport>,
    pub registered_timers: usize,
    pub registered_listeners: usize,
    pub canvas_contexts: usize,
    pub image_cache_size: usize,
    pub audio_cache_size: usize,
    pub custom_cleanups: usize,
    pub next_cleanup_in_ms: u64,
}

pub struct ProactiveCleanupManager {
    config: CleanupConfig,
    clock: SharedClock,
    memory: SharedMemorySource,
    gc: SharedGcHint,
    timers: Arc<dyn TimerCanceller>,
    targets: CleanupTargets,
    last_cleanup: Option<u64>,
    next_cleanup_ms: u64,
    cleanup_count: u64,
    total_memory_freed: u64,
    average_cleanup_time_ms: f64,
    efficiency: f64,
    strategies_used: BTreeMap<StrategyKind, u64>,
    last_report: Option<CleanupReport>,
}

impl ProactiveCleanupManager {
    pub fn new(config: CleanupConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    pub fn with_clock(config: CleanupConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            next_cleanup_ms: config.scheduling.base_interval_ms,
            config,
            clock,
            memory: Arc::new(NoMemoryInfo),
            gc: Arc::new(NoGcHint),
            timers: Arc::new(NoTimers),
            targets: CleanupTargets::default(),
            last_cleanup: None,
            cleanup_count: 0,
            total_memory_freed: 0,
            average_cleanup_time_ms: 0.0,
            efficiency: 1.0,
            strategies_used: BTreeMap::new(),
            last_report: None,
        })
    }

    pub fn with_memory_source(mut self, memory: SharedMemorySource) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_gc_hint(mut self, gc: SharedGcHint) -> Self {
        self.gc = gc;
        self
    }

    pub fn with_timer_canceller(mut self, timers: Arc<dyn TimerCanceller>) -> Self {
        self.timers = timers;
        self
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.config
    }

    pub fn update_config(&mut self, config: CleanupConfig) -> Result<()> {
        config.validate()?;
        self.next_cleanup_ms = self.next_cleanup_ms.clamp(
            config.scheduling.min_interval_ms,
            config.scheduling.max_interval_ms,
        );
        self.config = config;
        Ok(())
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn set_mode(&mut self, mode: CleanupMode) {
        self.config.mode = mode;
    }

    /// Picks a strategy for the current conditions, runs it and
    /// reschedules. Refuses to run more often than the minimum interval.
    pub fn perform_intelligent_cleanup(&mut self, context: &CleanupContext) -> CleanupOutcome {
        if !self.config.enabled {
            return CleanupOutcome::Skipped {
                reason: CleanupSkipReason::Disabled,
            };
        }

        let now = self.clock.now_ms();
        let since_last = self
            .last_cleanup
            .map_or(u64::MAX, |last| now.saturating_sub(last));
        if since_last < self.config.scheduling.min_interval_ms {
            debug!(since_last_ms = since_last, "Skipping cleanup, too frequent");
            return CleanupOutcome::Skipped {
                reason: CleanupSkipReason::TooFrequent,
            };
        }

        let memory_pressure = self.resolve_pressure(context);

        let kind = select_strategy(
            memory_pressure,
            self.efficiency,
            self.config.mode,
            since_last,
            self.config.scheduling.max_interval_ms,
        );
        info!(strategy = %kind, memory_pressure, "Running proactive cleanup");

        let measured = self.run_measured(kind.strategy());

        self.update_stats(measured.cleanup_time_ms, measured.memory_freed, kind);
        self.next_cleanup_ms =
            next_interval(&self.config.scheduling, memory_pressure, self.efficiency);
        self.last_cleanup = Some(now);

        let report = self.build_report(kind, memory_pressure, measured);
        debug!(
            strategy = %kind,
            memory_freed = report.memory_freed,
            cleanup_time_ms = report.cleanup_time_ms,
            reclaimed = report.tally.total(),
            next_cleanup_ms = report.next_cleanup_ms,
            "Cleanup pass complete"
        );

        self.last_report = Some(report.clone());
        CleanupOutcome::Performed(Box::new(report))
    }

    /// Runs a strategy right away. The report carries the context's
    /// pressure but statistics and scheduling are left untouched.
    pub fn force_cleanup(&mut self, kind: StrategyKind, context: &CleanupContext) -> CleanupReport {
        let memory_pressure = self.resolve_pressure(context);
        info!(strategy = %kind, memory_pressure, "Forced cleanup");
        let measured = self.run_measured(kind.strategy());
        self.build_report(kind, memory_pressure, measured)
    }

    /// Like [`force_cleanup`](Self::force_cleanup); unknown names run the
    /// standard strategy.
    pub fn force_cleanup_named(&mut self, name: &str, context: &CleanupContext) -> CleanupReport {
        let kind = name.parse::<StrategyKind>().unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to standard cleanup");
            StrategyKind::Standard
        });
        self.force_cleanup(kind, context)
    }

    fn run_measured(&mut self, strategy: &CleanupStrategy) -> MeasuredRun {
        let started = self.clock.precise_ms();
        let memory_before = self.used_memory();
        let run = self.execute_strategy(strategy);
        MeasuredRun {
            run,
            cleanup_time_ms: (self.clock.precise_ms() - started).max(0.0),
            memory_freed: memory_before.saturating_sub(self.used_memory()),
        }
    }

    fn build_report(
        &self,
        kind: StrategyKind,
        memory_pressure: f64,
        measured: MeasuredRun,
    ) -> CleanupReport {
        CleanupReport {
            strategy: kind,
            memory_pressure,
            memory_freed: measured.memory_freed,
            cleanup_time_ms: measured.cleanup_time_ms,
            efficiency: measured.memory_freed as f64 / measured.cleanup_time_ms.max(1.0),
            actions: measured.run.actions,
            tally: measured.run.tally,
            next_cleanup_ms: self.next_cleanup_ms,
        }
    }

    fn execute_strategy(&mut self, strategy: &CleanupStrategy) -> StrategyRun {
        let started = self.clock.precise_ms();
        let mut actions = Vec::with_capacity(strategy.actions.len());
        let mut tally = ActionTally::default();

        let env = ActionEnv {
            now_ms: self.clock.now_ms(),
            limits: &self.config.limits,
            custom_cooldown_ms: self.config.custom_cleanup_cooldown_ms,
            timers: self.timers.as_ref(),
            gc: self.gc.as_ref(),
            memory: self.memory.as_ref(),
        };

        for &action in strategy.actions {
            if self.clock.precise_ms() - started > strategy.time_limit_ms {
                warn!(
                    strategy = %strategy.kind,
                    %action,
                    time_limit_ms = strategy.time_limit_ms,
                    "Cleanup time budget exhausted"
                );
                actions.push(format!("{action}_timeout"));
                break;
            }

            match execute_action(action, &mut self.targets, &env) {
                Ok(result) => {
                    tally += result;
                    actions.push(action.as_str().to_string());
                }
                Err(e) => {
                    error!(%action, error = %e, "Cleanup action failed");
                    actions.push(format!("{action}_error"));
                }
            }
        }

        StrategyRun { actions, tally }
    }

    fn update_stats(&mut self, cleanup_time_ms: f64, memory_freed: u64, kind: StrategyKind) {
        self.cleanup_count += 1;
        self.total_memory_freed = self.total_memory_freed.saturating_add(memory_freed);
        self.average_cleanup_time_ms = (self.average_cleanup_time_ms + cleanup_time_ms) / 2.0;
        self.efficiency = smoothed_efficiency(self.efficiency, memory_freed, cleanup_time_ms);
        *self.strategies_used.entry(kind).or_insert(0) += 1;
    }

    fn used_memory(&self) -> u64 {
        self.memory.read().map_or(0, |reading| reading.used)
    }

    fn resolve_pressure(&self, context: &CleanupContext) -> f64 {
        context
            .memory_pressure
            .filter(|p| p.is_finite())
            .unwrap_or_else(|| self.memory.read().map_or(0.0, |reading| reading.pressure()))
    }

    /// True when enabled and the adaptive interval has elapsed.
    pub fn is_cleanup_due(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.last_cleanup.map_or(true, |last| {
            self.clock.now_ms().saturating_sub(last) >= self.next_cleanup_ms
        })
    }

    pub fn next_cleanup_ms(&self) -> u64 {
        self.next_cleanup_ms
    }

    pub fn efficiency(&self) -> f64 {
        self.efficiency
    }

    pub fn register_timer(&mut self, id: TimerId, kind: TimerKind) {
        let created = self.clock.now_ms();
        self.targets
            .timers
            .insert(id, TimerRegistration { id, kind, created });
    }

    /// Stops tracking a timer without cancelling it.
    pub fn unregister_timer(&mut self, id: TimerId) -> bool {
        self.targets.timers.remove(&id).is_some()
    }

    /// Returns the registry key, `"{type_name}_{event}"`.
    pub fn register_event_listener(
        &mut self,
        target: Arc<dyn EventTarget>,
        event: &str,
        listener: ListenerId,
    ) -> String {
        let key = format!("{}_{}", target.type_name(), event);
        let created = self.clock.now_ms();
        self.targets
            .listeners
            .entry(key.clone())
            .or_default()
            .push(ListenerRegistration {
                target,
                event: event.to_string(),
                listener,
                created,
            });
        key
    }

    pub fn unregister_event_listener(
        &mut self,
        target: &Arc<dyn EventTarget>,
        event: &str,
        listener: ListenerId,
    ) -> bool {
        let key = format!("{}_{}", target.type_name(), event);
        let Some(registrations) = self.targets.listeners.get_mut(&key) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| !(r.listener == listener && Arc::ptr_eq(&r.target, target)));
        let removed = registrations.len() < before;
        if registrations.is_empty() {
            self.targets.listeners.remove(&key);
        }
        removed
    }

    pub fn register_canvas_context(&mut self, context: AssetHandle, canvas: AssetHandle) {
        let created = self.clock.now_ms();
        self.targets.canvases.push(CanvasRegistration {
            context,
            canvas,
            created,
        });
    }

    /// Returns how many entries were evicted to make room.
    pub fn add_to_image_cache(&mut self, key: &str, image: AssetHandle, size: u64) -> usize {
        let now = self.clock.now_ms();
        let capacity = self.config.limits.image_cache;
        self.targets
            .images
            .insert(key, image, size, now, capacity, IMAGE_EVICT_ON_FULL)
    }

    pub fn add_to_audio_cache(&mut self, key: &str, audio: AssetHandle, size: u64) -> usize {
        let now = self.clock.now_ms();
        let capacity = self.config.limits.audio_cache;
        self.targets
            .audio
            .insert(key, audio, size, now, capacity, AUDIO_EVICT_ON_FULL)
    }

    pub fn get_image(&mut self, key: &str) -> Option<AssetHandle> {
        let now = self.clock.now_ms();
        self.targets.images.get(key, now)
    }

    pub fn get_audio(&mut self, key: &str) -> Option<AssetHandle> {
        let now = self.clock.now_ms();
        self.targets.audio.get(key, now)
    }

    /// Replaces any cleanup registered under the same name.
    pub fn register_custom_cleanup<F>(&mut self, name: &str, cleanup: F, priority: u32)
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.targets.custom.insert(
            name.to_string(),
            CustomCleanup {
                cleanup: Box::new(cleanup),
                priority,
                last_run: None,
                run_count: 0,
            },
        );
    }

    pub fn unregister_custom_cleanup(&mut self, name: &str) -> bool {
        self.targets.custom.remove(name).is_some()
    }

    pub fn targets(&self) -> &CleanupTargets {
        &self.targets
    }

    pub fn get_stats(&self) -> CleanupStats {
        let next_cleanup_in_ms = match self.last_cleanup {
            Some(last) => self
                .next_cleanup_ms
                .saturating_sub(self.clock.now_ms().saturating_sub(last)),
            None => 0,
        };

        CleanupStats {
            enabled: self.config.enabled,
            mode: self.config.mode,
            cleanup_count: self.cleanup_count,
            total_memory_freed: self.total_memory_freed,
            average_cleanup_time_ms: self.average_cleanup_time_ms,
            efficiency: self.efficiency,
            strategies_used: self.strategies_used.clone(),
            last_report: self.last_report.clone(),
            registered_timers: self.targets.timers.len(),
            registered_listeners: self.targets.listener_count(),
            canvas_contexts: self.targets.canvases.len(),
            image_cache_size: self.targets.images.len(),
            audio_cache_size: self.targets.audio.len(),
            custom_cleanups: self.targets.custom.len(),
            next_cleanup_in_ms,
        }
    }
}

impl Default for ProactiveCleanupManager {
    fn default() -> Self {
        let config = CleanupConfig::default();
        Self {
            next_cleanup_ms: config.scheduling.base_interval_ms,
            config,
            clock: SystemClock::shared(),
            memory: Arc::new(NoMemoryInfo),
            gc: Arc::new(NoGcHint),
            timers: Arc::new(NoTimers),
            targets: CleanupTargets::default(),
            last_cleanup: None,
            cleanup_count: 0,
            total_memory_freed: 0,
            average_cleanup_time_ms: 0.0,
            efficiency: 1.0,
            strategies_used: BTreeMap::new(),
            last_report: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memwarden_core::{ManualClock, StaticMemoryInfo};

    fn manager() -> (ProactiveCleanupManager, Arc<ManualClock>) {
        let clock = ManualClock::shared(10_000_000);
        let manager = ProactiveCleanupManager::with_clock(CleanupConfig::default(), clock.clone())
            .expect("default config is valid");
        (manager, clock)
    }

    fn asset() -> AssetHandle {
        Arc::new(0u8)
    }

    #[test]
    fn test_disabled_and_rate_limited() {
        let (mut manager, clock) = manager();
        manager.set_enabled(false);
        assert_eq!(
            manager
                .perform_intelligent_cleanup(&CleanupContext::default())
                .reason(),
            Some("Cleanup disabled")
        );

        manager.set_enabled(true);
        assert!(manager
            .perform_intelligent_cleanup(&CleanupContext::with_pressure(0.5))
            .performed());
        clock.advance(1_000);
        assert_eq!(
            manager
                .perform_intelligent_cleanup(&CleanupContext::with_pressure(0.5))
                .reason(),
            Some("Too frequent")
        );
    }

    #[test]
    fn test_first_pass_is_comprehensive() {
        let (mut manager, _) = manager();
        let outcome = manager.perform_intelligent_cleanup(&CleanupContext::with_pressure(0.5));
        let report = outcome.report().unwrap();
        assert_eq!(report.strategy, StrategyKind::Comprehensive);
        assert_eq!(report.actions.len(), 6);
    }

    #[test]
    fn test_efficiency_decays_without_reclaimed_memory() {
        let (mut manager, clock) = manager();
        manager.perform_intelligent_cleanup(&CleanupContext::with_pressure(0.5));
        // (1.0 + 0) / 2
        assert_eq!(manager.efficiency(), 0.5);

        clock.advance(10_000);
        manager.perform_intelligent_cleanup(&CleanupContext::with_pressure(0.5));
        assert_eq!(manager.efficiency(), 0.25);

        clock.advance(10_000);
        let report = manager
            .perform_intelligent_cleanup(&CleanupContext::with_pressure(0.5))
            .report()
            .cloned()
            .unwrap();
        assert_eq!(report.strategy, StrategyKind::Aggressive);
    }

    #[test]
    fn test_pressure_from_memory_source() {
        let (manager, _) = manager();
        let mut manager = manager.with_memory_source(StaticMemoryInfo::shared(960, 1000));
        let report = manager
            .perform_intelligent_cleanup(&CleanupContext::default())
            .report()
            .cloned()
            .unwrap();
        assert_eq!(report.strategy, StrategyKind::Emergency);
        assert_eq!(report.memory_pressure, 0.96);
        // 30s base halved under pressure
        assert_eq!(report.next_cleanup_ms, 15_000);
    }

    #[test]
    fn test_explicit_zero_pressure_honoured() {
        let (manager, _) = manager();
        let mut manager = manager.with_memory_source(StaticMemoryInfo::shared(960, 1000));
        let report = manager
            .perform_intelligent_cleanup(&CleanupContext::with_pressure(0.0))
            .report()
            .cloned()
            .unwrap();
        assert_eq!(report.memory_pressure, 0.0);
        assert_ne!(report.strategy, StrategyKind::Emergency);
    }

    #[test]
    fn test_cleanup_due_follows_schedule() {
        let (mut manager, clock) = manager();
        assert!(manager.is_cleanup_due());
        manager.perform_intelligent_cleanup(&CleanupContext::with_pressure(0.5));
        assert!(!manager.is_cleanup_due());

        let next = manager.next_cleanup_ms();
        assert_eq!(manager.get_stats().next_cleanup_in_ms, next);
        clock.advance(next);
        assert!(manager.is_cleanup_due());
        assert_eq!(manager.get_stats().next_cleanup_in_ms, 0);
    }

    #[test]
    fn test_image_cache_never_exceeds_limit() {
        let (mut manager, clock) = manager();
        let limit = manager.config().limits.image_cache;
        for i in 0..limit {
            manager.add_to_image_cache(&format!("img{i}"), asset(), 1024);
            clock.advance(1);
        }
        assert_eq!(manager.get_stats().image_cache_size, limit);

        let evicted = manager.add_to_image_cache("overflow", asset(), 1024);
        assert_eq!(evicted, 5);
        assert_eq!(manager.get_stats().image_cache_size, limit - 4);
        assert!(manager.get_image("img0").is_none());
        assert!(manager.get_image("img5").is_some());
    }

    #[test]
    fn test_audio_cache_evicts_three() {
        let (mut manager, clock) = manager();
        let limit = manager.config().limits.audio_cache;
        for i in 0..limit {
            manager.add_to_audio_cache(&format!("sfx{i}"), asset(), 10);
            clock.advance(1);
        }
        assert!(manager.get_audio("sfx0").is_some());
        assert_eq!(manager.add_to_audio_cache("new", asset(), 10), 3);
        assert!(manager.get_audio("sfx0").is_some());
        assert!(manager.get_audio("sfx1").is_none());
    }

    #[test]
    fn test_failing_custom_cleanup_does_not_abort_pass() {
        let (mut manager, _) = manager();
        manager.register_custom_cleanup("broken", || anyhow::bail!("boom"), 9);
        manager.register_custom_cleanup("fine", || Ok(()), DEFAULT_CUSTOM_PRIORITY);

        let run = manager.force_cleanup(StrategyKind::Standard, &CleanupContext::default());
        assert_eq!(run.tally.custom_cleanups_run, 1);
        assert!(run.actions.contains(&"custom_cleanups".to_string()));
        assert!(manager.unregister_custom_cleanup("broken"));
        assert!(!manager.unregister_custom_cleanup("broken"));
    }

    #[test]
    fn test_update_config_rejects_invalid() {
        let (mut manager, _) = manager();
        let mut config = manager.config().clone();
        config.scheduling.min_interval_ms = 1_000_000;
        assert!(manager.update_config(config).is_err());
        assert_eq!(manager.config().scheduling.min_interval_ms, 5_000);

        let mut config = manager.config().clone();
        config.mode = CleanupMode::Aggressive;
        manager.update_config(config).unwrap();
        assert_eq!(manager.get_stats().mode, CleanupMode::Aggressive);
    }
}
