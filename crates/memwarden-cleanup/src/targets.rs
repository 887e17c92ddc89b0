use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Opaque host object (canvas, context, image, audio clip).
pub type AssetHandle = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    Timeout,
    Interval,
}

/// Host primitives that cancel a registered timer.
pub trait TimerCanceller: Send + Sync {
    fn clear_timeout(&self, id: TimerId) -> anyhow::Result<()>;

    fn clear_interval(&self, id: TimerId) -> anyhow::Result<()>;

    fn cancel(&self, id: TimerId, kind: TimerKind) -> anyhow::Result<()> {
        match kind {
            TimerKind::Timeout => self.clear_timeout(id),
            TimerKind::Interval => self.clear_interval(id),
        }
    }
}

/// Host without timers to cancel.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTimers;

impl TimerCanceller for NoTimers {
    fn clear_timeout(&self, _id: TimerId) -> anyhow::Result<()> {
        Ok(())
    }

    fn clear_interval(&self, _id: TimerId) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

/// Something listeners can be detached from.
pub trait EventTarget: Send + Sync {
    /// Groups registrations as `"{type_name}_{event}"`.
    fn type_name(&self) -> &str;

    fn remove_listener(&self, event: &str, listener: ListenerId) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRegistration {
    pub id: TimerId,
    pub kind: TimerKind,
    pub created: u64,
}

#[derive(Clone)]
pub struct ListenerRegistration {
    pub target: Arc<dyn EventTarget>,
    pub event: String,
    pub listener: ListenerId,
    pub created: u64,
}

impl ListenerRegistration {
    fn detach(&self) -> anyhow::Result<()> {
        self.target.remove_listener(&self.event, self.listener)
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("target", &self.target.type_name())
            .field("event", &self.event)
            .field("listener", &self.listener)
            .field("created", &self.created)
            .finish()
    }
}

pub struct CanvasRegistration {
    pub context: AssetHandle,
    pub canvas: AssetHandle,
    pub created: u64,
}

impl CanvasRegistration {
    /// True once the host dropped every other reference to the canvas.
    pub fn is_orphaned(&self) -> bool {
        Arc::strong_count(&self.canvas) <= 1
    }
}

pub struct CacheEntry {
    pub handle: AssetHandle,
    pub size: u64,
    pub accessed: u64,
    pub created: u64,
}

pub type CleanupFn = Box<dyn FnMut() -> anyhow::Result<()> + Send>;

pub struct CustomCleanup {
    pub cleanup: CleanupFn,
    pub priority: u32,
    pub last_run: Option<u64>,
    pub run_count: u64,
}

/// LRU cache of host assets keyed by name.
#[derive(Default)]
pub struct AssetCache {
    entries: HashMap<String, CacheEntry>,
}

impl AssetCache {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }

    /// Inserts an entry. A new key arriving at capacity first evicts the
    /// `evict_on_full` least recently accessed entries.
    pub fn insert(
        &mut self,
        key: &str,
        handle: AssetHandle,
        size: u64,
        now_ms: u64,
        capacity: usize,
        evict_on_full: usize,
    ) -> usize {
        let mut evicted = 0;
        if !self.entries.contains_key(key) && self.entries.len() >= capacity {
            evicted = self.evict_oldest(evict_on_full);
        }
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                handle,
                size,
                accessed: now_ms,
                created: now_ms,
            },
        );
        evicted
    }

    /// Returns the handle and marks the entry as recently used.
    pub fn get(&mut self, key: &str, now_ms: u64) -> Option<AssetHandle> {
        self.entries.get_mut(key).map(|entry| {
            entry.accessed = now_ms;
            entry.handle.clone()
        })
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn evict_oldest(&mut self, count: usize) -> usize {
        let mut by_access: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.accessed, key.clone()))
            .collect();
        by_access.sort();

        let count = count.min(by_access.len());
        for (_, key) in by_access.into_iter().take(count) {
            self.entries.remove(&key);
        }
        count
    }

    /// Evicts `floor(len * fraction)` entries in LRU order.
    pub fn evict_fraction(&mut self, fraction: f64) -> usize {
        let count = (self.entries.len() as f64 * fraction).floor() as usize;
        self.evict_oldest(count)
    }

    pub fn evict_expired(&mut self, now_ms: u64, max_age_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now_ms.saturating_sub(entry.accessed) <= max_age_ms);
        before - self.entries.len()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }
}

/// Every resource the manager tracks on behalf of the host.
#[derive(Default)]
pub struct CleanupTargets {
    pub timers: HashMap<TimerId, TimerRegistration>,
    pub listeners: HashMap<String, Vec<ListenerRegistration>>,
    pub canvases: Vec<CanvasRegistration>,
    pub images: AssetCache,
    pub audio: AssetCache,
    pub custom: HashMap<String, CustomCleanup>,
}

impl CleanupTargets {
    pub fn listener_count(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    /// Cancels timers at least `max_age_ms` old. A timer whose cancel
    /// fails stays tracked.
    pub fn cleanup_timers(
        &mut self,
        now_ms: u64,
        max_age_ms: u64,
        canceller: &dyn TimerCanceller,
    ) -> usize {
        let mut cleared = 0;
        self.timers.retain(|id, timer| {
            if now_ms.saturating_sub(timer.created) < max_age_ms {
                return true;
            }
            match canceller.cancel(*id, timer.kind) {
                Ok(()) => {
                    cleared += 1;
                    false
                }
                Err(e) => {
                    error!(timer = %id, error = %e, "Failed to cancel timer");
                    true
                }
            }
        });
        cleared
    }

    /// Cancels and forgets every timer, whether or not cancel succeeds.
    pub fn clear_all_timers(&mut self, canceller: &dyn TimerCanceller) -> usize {
        let count = self.timers.len();
        for (id, timer) in self.timers.drain() {
            if let Err(e) = canceller.cancel(id, timer.kind) {
                error!(timer = %id, error = %e, "Failed to cancel timer");
            }
        }
        count
    }

    /// Detaches listeners at least `max_age_ms` old. A listener whose
    /// detach fails is forgotten too, since its target may already have
    /// dropped it.
    pub fn cleanup_listeners(&mut self, now_ms: u64, max_age_ms: u64) -> usize {
        let mut removed = 0;
        for (key, registrations) in self.listeners.iter_mut() {
            registrations.retain(|registration| {
                if now_ms.saturating_sub(registration.created) < max_age_ms {
                    return true;
                }
                match registration.detach() {
                    Ok(()) => {
                        removed += 1;
                        false
                    }
                    Err(e) => {
                        error!(key = %key, error = %e, "Failed to remove event listener");
                        false
                    }
                }
            });
        }
        self.listeners.retain(|_, registrations| !registrations.is_empty());
        removed
    }

    pub fn clear_all_listeners(&mut self) -> usize {
        let mut removed = 0;
        for (key, registrations) in self.listeners.drain() {
            for registration in registrations {
                if let Err(e) = registration.detach() {
                    error!(key = %key, error = %e, "Failed to remove event listener");
                }
                removed += 1;
            }
        }
        removed
    }

    pub fn cleanup_contexts(&mut self) -> usize {
        let before = self.canvases.len();
        self.canvases.retain(|registration| !registration.is_orphaned());
        before - self.canvases.len()
    }

    pub fn clear_all_contexts(&mut self) -> usize {
        let count = self.canvases.len();
        self.canvases.clear();
        count
    }

    pub fn evict_expired_cache(&mut self, now_ms: u64, max_age_ms: u64) -> usize {
        self.images.evict_expired(now_ms, max_age_ms) + self.audio.evict_expired(now_ms, max_age_ms)
    }

    pub fn evict_cache_fraction(&mut self, fraction: f64) -> usize {
        self.images.evict_fraction(fraction) + self.audio.evict_fraction(fraction)
    }

    pub fn clear_caches(&mut self) -> usize {
        self.images.clear() + self.audio.clear()
    }

    /// Runs custom cleanups, highest priority first. Outside an emergency
    /// a cleanup that succeeded within `cooldown_ms` is skipped; failed
    /// runs leave `last_run` alone so the next pass retries.
    pub fn run_custom_cleanups(&mut self, now_ms: u64, cooldown_ms: u64, emergency: bool) -> usize {
        let mut order: Vec<(u32, String)> = self
            .custom
            .iter()
            .map(|(name, cleanup)| (cleanup.priority, name.clone()))
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut ran = 0;
        for (_, name) in order {
            let Some(custom) = self.custom.get_mut(&name) else {
                continue;
            };
            let cooled_down = custom
                .last_run
                .map_or(true, |last| now_ms.saturating_sub(last) > cooldown_ms);
            if !emergency && !cooled_down {
                debug!(cleanup = %name, "Custom cleanup still cooling down");
                continue;
            }

            match (custom.cleanup)() {
                Ok(()) => {
                    custom.last_run = Some(now_ms);
                    custom.run_count += 1;
                    ran += 1;
                }
                Err(e) => error!(cleanup = %name, error = %e, "Custom cleanup failed"),
            }
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCanceller {
        calls: AtomicUsize,
    }

    impl TimerCanceller for CountingCanceller {
        fn clear_timeout(&self, _id: TimerId) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn clear_interval(&self, id: TimerId) -> anyhow::Result<()> {
            if id.0 == 13 {
                anyhow::bail!("host refused");
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn asset() -> AssetHandle {
        Arc::new(())
    }

    fn timer(id: u64, kind: TimerKind, created: u64) -> (TimerId, TimerRegistration) {
        (
            TimerId(id),
            TimerRegistration {
                id: TimerId(id),
                kind,
                created,
            },
        )
    }

    #[test]
    fn test_age_cutoff_is_inclusive() {
        let mut targets = CleanupTargets::default();
        targets.timers.extend([
            timer(1, TimerKind::Timeout, 0),
            timer(2, TimerKind::Timeout, 40_000),
        ]);
        let canceller = CountingCanceller::default();

        assert_eq!(targets.cleanup_timers(60_000, 60_000, &canceller), 1);
        assert!(targets.timers.contains_key(&TimerId(2)));
        assert_eq!(targets.cleanup_timers(60_000, 0, &canceller), 1);
        assert!(targets.timers.is_empty());
    }

    #[test]
    fn test_timer_exactly_five_minutes_old_is_cleared() {
        let mut targets = CleanupTargets::default();
        targets.timers.extend([
            timer(1, TimerKind::Timeout, 0),
            timer(2, TimerKind::Interval, 1),
        ]);
        let canceller = CountingCanceller::default();

        assert_eq!(targets.cleanup_timers(300_000, 300_000, &canceller), 1);
        assert!(!targets.timers.contains_key(&TimerId(1)));
        assert!(targets.timers.contains_key(&TimerId(2)));
    }

    #[test]
    fn test_failed_cancel_keeps_timer() {
        let mut targets = CleanupTargets::default();
        targets.timers.extend([timer(13, TimerKind::Interval, 0)]);
        let canceller = CountingCanceller::default();

        assert_eq!(targets.cleanup_timers(10, 0, &canceller), 0);
        assert_eq!(targets.timers.len(), 1);
        assert_eq!(targets.clear_all_timers(&canceller), 1);
        assert!(targets.timers.is_empty());
    }

    #[test]
    fn test_cache_evicts_before_insert() {
        let mut cache = AssetCache::default();
        for i in 0..3 {
            cache.insert(&format!("img{i}"), asset(), 10, i, 3, 5);
        }
        let evicted = cache.insert("img3", asset(), 10, 10, 3, 5);
        assert_eq!(evicted, 3);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("img3"));
    }

    #[test]
    fn test_replacing_key_does_not_evict() {
        let mut cache = AssetCache::default();
        cache.insert("a", asset(), 1, 0, 2, 5);
        cache.insert("b", asset(), 1, 1, 2, 5);
        assert_eq!(cache.insert("a", asset(), 2, 2, 2, 5), 0);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.total_size(), 3);
    }

    #[test]
    fn test_lru_respects_access() {
        let mut cache = AssetCache::default();
        for i in 0..10 {
            cache.insert(&format!("k{i}"), asset(), 1, i, 50, 5);
        }
        assert!(cache.get("k0", 100).is_some());
        assert_eq!(cache.evict_fraction(0.3), 3);
        assert!(cache.contains("k0"));
        assert!(!cache.contains("k1"));
        assert!(cache.contains("k4"));
    }

    #[test]
    fn test_orphaned_canvas_released() {
        let mut targets = CleanupTargets::default();
        let kept = asset();
        targets.canvases.push(CanvasRegistration {
            context: asset(),
            canvas: kept.clone(),
            created: 0,
        });
        targets.canvases.push(CanvasRegistration {
            context: asset(),
            canvas: asset(),
            created: 0,
        });
        assert_eq!(targets.cleanup_contexts(), 1);
        assert_eq!(targets.canvases.len(), 1);
        drop(kept);
        assert_eq!(targets.cleanup_contexts(), 1);
    }

    #[test]
    fn test_custom_cleanups_respect_cooldown() {
        let mut targets = CleanupTargets::default();
        let order: Arc<Mutex<Vec<&str>>> = Arc::default();
        for (name, priority) in [("low", 1), ("high", 9)] {
            let log = order.clone();
            targets.custom.insert(
                name.to_string(),
                CustomCleanup {
                    cleanup: Box::new(move || -> anyhow::Result<()> {
                        log.lock().push(name);
                        Ok(())
                    }),
                    priority,
                    last_run: None,
                    run_count: 0,
                },
            );
        }

        assert_eq!(targets.run_custom_cleanups(1_000, 30_000, false), 2);
        assert_eq!(*order.lock(), vec!["high", "low"]);
        assert_eq!(targets.run_custom_cleanups(2_000, 30_000, false), 0);
        assert_eq!(targets.run_custom_cleanups(2_000, 30_000, true), 2);
        assert_eq!(targets.custom["high"].run_count, 2);
    }
}
