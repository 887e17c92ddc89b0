use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use memwarden_cleanup::{
    CleanupContext, EventTarget, ListenerId, ProactiveCleanupManager, StrategyKind,
    TimerCanceller, TimerId, TimerKind,
};
use memwarden_core::{CleanupConfig, CleanupMode, ManualClock};
use parking_lot::Mutex;

#[derive(Default)]
struct RecordingTimers {
    timeouts: Mutex<Vec<TimerId>>,
    intervals: Mutex<Vec<TimerId>>,
}

impl TimerCanceller for RecordingTimers {
    fn clear_timeout(&self, id: TimerId) -> anyhow::Result<()> {
        self.timeouts.lock().push(id);
        Ok(())
    }

    fn clear_interval(&self, id: TimerId) -> anyhow::Result<()> {
        self.intervals.lock().push(id);
        Ok(())
    }
}

struct Window {
    removed: Mutex<Vec<(String, ListenerId)>>,
}

impl EventTarget for Window {
    fn type_name(&self) -> &str {
        "Window"
    }

    fn remove_listener(&self, event: &str, listener: ListenerId) -> anyhow::Result<()> {
        self.removed.lock().push((event.to_string(), listener));
        Ok(())
    }
}

struct DetachedCanvas;

impl EventTarget for DetachedCanvas {
    fn type_name(&self) -> &str {
        "HTMLCanvasElement"
    }

    fn remove_listener(&self, _event: &str, _listener: ListenerId) -> anyhow::Result<()> {
        anyhow::bail!("listener already removed")
    }
}

fn manager() -> (ProactiveCleanupManager, Arc<ManualClock>, Arc<RecordingTimers>) {
    let clock = ManualClock::shared(50_000_000);
    let timers = Arc::new(RecordingTimers::default());
    let manager = ProactiveCleanupManager::with_clock(CleanupConfig::default(), clock.clone())
        .unwrap()
        .with_timer_canceller(timers.clone());
    (manager, clock, timers)
}

#[test]
fn emergency_cleanup_cancels_interval_once() {
    let (mut manager, _, timers) = manager();
    manager.register_timer(TimerId(7), TimerKind::Interval);

    let run = manager.force_cleanup_named("emergency", &CleanupContext::default());

    assert_eq!(run.strategy, StrategyKind::Emergency);
    assert_eq!(run.tally.timers_cleared, 1);
    assert_eq!(*timers.intervals.lock(), vec![TimerId(7)]);
    assert!(timers.timeouts.lock().is_empty());
    assert_eq!(manager.get_stats().registered_timers, 0);
}

#[test]
fn severe_pressure_always_selects_emergency() {
    for mode in [
        CleanupMode::Conservative,
        CleanupMode::Adaptive,
        CleanupMode::Aggressive,
    ] {
        let (mut manager, _, _) = manager();
        manager.set_mode(mode);
        let outcome = manager.perform_intelligent_cleanup(&CleanupContext::with_pressure(0.95));
        assert_eq!(outcome.report().unwrap().strategy, StrategyKind::Emergency);
    }
}

#[test]
fn age_bounded_timer_cleanup() {
    let (mut manager, clock, timers) = manager();
    manager.register_timer(TimerId(1), TimerKind::Timeout);
    clock.advance(240_000);
    manager.register_timer(TimerId(2), TimerKind::Timeout);
    clock.advance(60_000);

    // Only timer 1 is five minutes old.
    let run = manager.force_cleanup(StrategyKind::Minimal, &CleanupContext::default());
    assert_eq!(run.tally.timers_cleared, 1);
    assert_eq!(*timers.timeouts.lock(), vec![TimerId(1)]);

    let run = manager.force_cleanup(StrategyKind::Standard, &CleanupContext::default());
    assert_eq!(run.tally.timers_cleared, 1);
    assert_eq!(manager.get_stats().registered_timers, 0);
}

#[test]
fn listeners_are_detached_through_their_target() {
    let (mut manager, clock, _) = manager();
    let window = Arc::new(Window {
        removed: Mutex::new(Vec::new()),
    });
    let target: Arc<dyn EventTarget> = window.clone();

    let key = manager.register_event_listener(target.clone(), "resize", ListenerId(1));
    manager.register_event_listener(target.clone(), "resize", ListenerId(2));
    assert_eq!(key, "Window_resize");
    assert!(manager.unregister_event_listener(&target, "resize", ListenerId(2)));
    assert_eq!(manager.get_stats().registered_listeners, 1);

    clock.advance(1);
    let run = manager.force_cleanup(StrategyKind::Comprehensive, &CleanupContext::default());
    assert_eq!(run.tally.listeners_removed, 1);
    assert_eq!(
        *window.removed.lock(),
        vec![("resize".to_string(), ListenerId(1))]
    );
    assert_eq!(manager.get_stats().registered_listeners, 0);
}

#[test]
fn unknown_strategy_name_runs_standard() {
    let (mut manager, _, _) = manager();
    let run = manager.force_cleanup_named("nuclear", &CleanupContext::default());
    assert_eq!(run.strategy, StrategyKind::Standard);
    assert_eq!(
        run.actions,
        vec!["cleanup_timers", "cleanup_listeners", "evict_cache", "custom_cleanups"]
    );
}

#[test]
fn slow_action_exhausts_time_budget() {
    let (mut manager, clock, _) = manager();
    let slow_clock = clock.clone();
    manager.register_custom_cleanup(
        "slow",
        move || {
            slow_clock.advance(500);
            Ok(())
        },
        5,
    );

    let run = manager.force_cleanup(StrategyKind::Comprehensive, &CleanupContext::default());
    assert_eq!(run.actions.last().map(String::as_str), Some("force_gc_timeout"));
    assert_eq!(run.tally.custom_cleanups_run, 1);
}

#[test]
fn orphaned_canvases_are_released() {
    let (mut manager, _, _) = manager();
    let held = Arc::new(String::from("game canvas"));
    manager.register_canvas_context(Arc::new(1u32), held.clone());
    manager.register_canvas_context(Arc::new(2u32), Arc::new(String::from("offscreen")));

    let run = manager.force_cleanup(StrategyKind::Comprehensive, &CleanupContext::default());
    assert_eq!(run.tally.contexts_cleared, 1);
    assert_eq!(manager.get_stats().canvas_contexts, 1);

    let run = manager.force_cleanup(StrategyKind::Emergency, &CleanupContext::default());
    assert_eq!(run.tally.contexts_cleared, 1);
    drop(held);
}

#[test]
fn stats_track_strategies_and_serialize() {
    let (mut manager, clock, _) = manager();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    manager.register_custom_cleanup(
        "pool",
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        5,
    );

    manager.perform_intelligent_cleanup(&CleanupContext::with_pressure(0.95));
    clock.advance(60_000);
    manager.perform_intelligent_cleanup(&CleanupContext::with_pressure(0.95));

    let stats = manager.get_stats();
    assert_eq!(stats.cleanup_count, 2);
    assert_eq!(stats.strategies_used.get(&StrategyKind::Emergency), Some(&2));
    // emergency passes skip custom cleanups
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["strategies_used"]["emergency"], 2);
    assert_eq!(json["last_report"]["strategy"], "emergency");
}

#[test]
fn failed_listener_detach_is_still_forgotten() {
    let (mut manager, clock, _) = manager();
    let target: Arc<dyn EventTarget> = Arc::new(DetachedCanvas);
    manager.register_event_listener(target.clone(), "click", ListenerId(1));
    manager.register_event_listener(target, "mousemove", ListenerId(2));
    assert_eq!(manager.get_stats().registered_listeners, 2);

    clock.advance(1);
    let report = manager.force_cleanup(StrategyKind::Comprehensive, &CleanupContext::default());
    assert_eq!(report.tally.listeners_removed, 0);
    assert_eq!(manager.get_stats().registered_listeners, 0);
}

#[test]
fn failing_custom_cleanup_is_retried_next_pass() {
    let (mut manager, clock, _) = manager();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    manager.register_custom_cleanup(
        "texture_pool",
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("pool locked")
        },
        5,
    );

    manager.force_cleanup(StrategyKind::Standard, &CleanupContext::default());
    clock.advance(1_000);
    let report = manager.force_cleanup(StrategyKind::Standard, &CleanupContext::default());

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.tally.custom_cleanups_run, 0);
    let cleanup = &manager.targets().custom["texture_pool"];
    assert_eq!(cleanup.run_count, 0);
    assert!(cleanup.last_run.is_none());
}

#[test]
fn forced_cleanup_reports_context_pressure_without_rescheduling() {
    let (mut manager, _, _) = manager();
    let next_before = manager.next_cleanup_ms();

    let report = manager.force_cleanup(StrategyKind::Minimal, &CleanupContext::with_pressure(0.82));

    assert_eq!(report.strategy, StrategyKind::Minimal);
    assert_eq!(report.memory_pressure, 0.82);
    assert_eq!(report.next_cleanup_ms, next_before);
    assert_eq!(manager.next_cleanup_ms(), next_before);
    assert_eq!(manager.get_stats().cleanup_count, 0);
    assert!(manager.get_stats().last_report.is_none());
}
