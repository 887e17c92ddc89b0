use std::ops::AddAssign;

use memwarden_core::{GcHint, MemoryInfoSource, ResourceLimits};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::strategy::CleanupAction;
use crate::targets::{CleanupTargets, TimerCanceller};

const OLD_TIMER_AGE_MS: u64 = 300_000;
const TIMER_AGE_MS: u64 = 60_000;
const LISTENER_AGE_MS: u64 = 300_000;
const CACHE_EVICT_FRACTION: f64 = 0.3;
const CACHE_EVICT_ALL_FRACTION: f64 = 0.7;
const EMERGENCY_GC_PRESSURE: f64 = 0.9;

/// Resources reclaimed by one or more actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTally {
    pub timers_cleared: usize,
    pub listeners_removed: usize,
    pub cache_items_evicted: usize,
    pub contexts_cleared: usize,
    pub custom_cleanups_run: usize,
}

impl ActionTally {
    pub fn total(&self) -> usize {
        self.timers_cleared
            + self.listeners_removed
            + self.cache_items_evicted
            + self.contexts_cleared
            + self.custom_cleanups_run
    }
}

impl AddAssign for ActionTally {
    fn add_assign(&mut self, other: Self) {
        self.timers_cleared += other.timers_cleared;
        self.listeners_removed += other.listeners_removed;
        self.cache_items_evicted += other.cache_items_evicted;
        self.contexts_cleared += other.contexts_cleared;
        self.custom_cleanups_run += other.custom_cleanups_run;
    }
}

/// Host collaborators and settings an action may need.
pub struct ActionEnv<'a> {
    pub now_ms: u64,
    pub limits: &'a ResourceLimits,
    pub custom_cooldown_ms: u64,
    pub timers: &'a dyn TimerCanceller,
    pub gc: &'a dyn GcHint,
    pub memory: &'a dyn MemoryInfoSource,
}

pub fn execute_action(
    action: CleanupAction,
    targets: &mut CleanupTargets,
    env: &ActionEnv<'_>,
) -> anyhow::Result<ActionTally> {
    use CleanupAction::*;

    let mut tally = ActionTally::default();
    match action {
        CleanupOldTimers => {
            tally.timers_cleared = targets.cleanup_timers(env.now_ms, OLD_TIMER_AGE_MS, env.timers)
        }
        CleanupTimers => {
            tally.timers_cleared = targets.cleanup_timers(env.now_ms, TIMER_AGE_MS, env.timers)
        }
        CleanupAllTimers => tally.timers_cleared = targets.cleanup_timers(env.now_ms, 0, env.timers),
        EmergencyTimerCleanup | ClearAllTimers => {
            tally.timers_cleared = targets.clear_all_timers(env.timers)
        }
        CleanupListeners => {
            tally.listeners_removed = targets.cleanup_listeners(env.now_ms, LISTENER_AGE_MS)
        }
        CleanupAllListeners => tally.listeners_removed = targets.cleanup_listeners(env.now_ms, 0),
        EmergencyListenerCleanup | ClearAllListeners => {
            tally.listeners_removed = targets.clear_all_listeners()
        }
        CleanupContexts => tally.contexts_cleared = targets.cleanup_contexts(),
        ClearAllContexts => tally.contexts_cleared = targets.clear_all_contexts(),
        EvictExpiredCache => {
            tally.cache_items_evicted =
                targets.evict_expired_cache(env.now_ms, env.limits.max_cache_age_ms)
        }
        EvictCache => tally.cache_items_evicted = targets.evict_cache_fraction(CACHE_EVICT_FRACTION),
        EvictAllCache => {
            tally.cache_items_evicted = targets.evict_cache_fraction(CACHE_EVICT_ALL_FRACTION)
        }
        PurgeAllCache | ClearAllCache => tally.cache_items_evicted = targets.clear_caches(),
        CustomCleanups => {
            tally.custom_cleanups_run =
                targets.run_custom_cleanups(env.now_ms, env.custom_cooldown_ms, false)
        }
        EmergencyCustomCleanups => {
            tally.custom_cleanups_run =
                targets.run_custom_cleanups(env.now_ms, env.custom_cooldown_ms, true)
        }
        ForceGc => env.gc.request()?,
        EmergencyGc => {
            env.gc.request()?;
            let critical = env
                .memory
                .read()
                .is_some_and(|r| r.used as f64 > EMERGENCY_GC_PRESSURE * r.total as f64);
            if critical {
                debug!("Memory still critical, requesting full collection");
                env.gc.request_full()?;
            }
        }
    }
    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memwarden_core::{NoMemoryInfo, StaticMemoryInfo};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::targets::NoTimers;

    #[derive(Default)]
    struct RecordingGc {
        light: AtomicUsize,
        full: AtomicUsize,
    }

    impl GcHint for RecordingGc {
        fn request(&self) -> anyhow::Result<()> {
            self.light.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn request_full(&self) -> anyhow::Result<()> {
            self.full.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenGc;

    impl GcHint for BrokenGc {
        fn request(&self) -> anyhow::Result<()> {
            anyhow::bail!("gc unavailable")
        }
    }

    fn env<'a>(
        limits: &'a ResourceLimits,
        gc: &'a dyn GcHint,
        memory: &'a dyn MemoryInfoSource,
    ) -> ActionEnv<'a> {
        ActionEnv {
            now_ms: 1_000_000,
            limits,
            custom_cooldown_ms: 30_000,
            timers: &NoTimers,
            gc,
            memory,
        }
    }

    #[test]
    fn test_emergency_gc_escalates_when_critical() {
        let limits = ResourceLimits::default();
        let gc = RecordingGc::default();
        let memory = StaticMemoryInfo::new(None);
        memory.set(950, 1000);
        let mut targets = CleanupTargets::default();

        execute_action(CleanupAction::EmergencyGc, &mut targets, &env(&limits, &gc, &memory))
            .unwrap();
        assert_eq!(gc.light.load(Ordering::SeqCst), 1);
        assert_eq!(gc.full.load(Ordering::SeqCst), 1);

        memory.set(500, 1000);
        execute_action(CleanupAction::EmergencyGc, &mut targets, &env(&limits, &gc, &memory))
            .unwrap();
        assert_eq!(gc.full.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_gc_failure_surfaces() {
        let limits = ResourceLimits::default();
        let mut targets = CleanupTargets::default();
        let result = execute_action(
            CleanupAction::ForceGc,
            &mut targets,
            &env(&limits, &BrokenGc, &NoMemoryInfo),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_tally_accumulates() {
        let mut total = ActionTally::default();
        total += ActionTally {
            timers_cleared: 2,
            cache_items_evicted: 3,
            ..Default::default()
        };
        total += ActionTally {
            timers_cleared: 1,
            ..Default::default()
        };
        assert_eq!(total.timers_cleared, 3);
        assert_eq!(total.total(), 6);
    }
}
