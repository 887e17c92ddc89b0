use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sysinfo::System;
use tracing::debug;

/// A single reading of the host memory counters, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryReading {
    pub used: u64,
    pub total: u64,
}

impl MemoryReading {
    pub fn new(used: u64, total: u64) -> Self {
        Self { used, total }
    }

    /// Ratio of used to total memory, 0 when the total is unknown.
    pub fn pressure(&self) -> f64 {
        crate::pressure_ratio(self.used, self.total)
    }
}

/// Where memory counters come from. Returning `None` means the platform
/// offers no introspection; callers degrade to zero values.
pub trait MemoryInfoSource: Send + Sync {
    fn read(&self) -> Option<MemoryReading>;
}

/// Best-effort garbage collection hint. Calling it is advisory only.
pub trait GcHint: Send + Sync {
    fn request(&self) -> anyhow::Result<()>;

    /// Stronger hint used in emergencies.
    fn request_full(&self) -> anyhow::Result<()> {
        self.request()
    }
}

pub type SharedMemorySource = Arc<dyn MemoryInfoSource>;
pub type SharedGcHint = Arc<dyn GcHint>;

/// Platform without memory introspection.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMemoryInfo;

impl MemoryInfoSource for NoMemoryInfo {
    fn read(&self) -> Option<MemoryReading> {
        None
    }
}

/// Platform without a collector to hint.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGcHint;

impl GcHint for NoGcHint {
    fn request(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Host memory read through `sysinfo`.
pub struct SystemMemoryInfo {
    system: Mutex<System>,
}

impl SystemMemoryInfo {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemoryInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInfoSource for SystemMemoryInfo {
    fn read(&self) -> Option<MemoryReading> {
        let mut system = self.system.lock();
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            debug!("sysinfo reported zero total memory");
            return None;
        }
        Some(MemoryReading::new(system.used_memory(), total))
    }
}

/// Reading pushed in by the host (or a test). Starts empty.
#[derive(Debug, Default)]
pub struct StaticMemoryInfo {
    reading: Mutex<Option<MemoryReading>>,
}

impl StaticMemoryInfo {
    pub fn new(reading: Option<MemoryReading>) -> Self {
        Self {
            reading: Mutex::new(reading),
        }
    }

    pub fn shared(used: u64, total: u64) -> Arc<Self> {
        Arc::new(Self::new(Some(MemoryReading::new(used, total))))
    }

    pub fn set(&self, used: u64, total: u64) {
        *self.reading.lock() = Some(MemoryReading::new(used, total));
    }

    pub fn clear(&self) {
        *self.reading.lock() = None;
    }
}

impl MemoryInfoSource for StaticMemoryInfo {
    fn read(&self) -> Option<MemoryReading> {
        *self.reading.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_source_roundtrip() {
        let source = StaticMemoryInfo::default();
        assert!(source.read().is_none());

        source.set(512, 1024);
        let reading = source.read().unwrap();
        assert_eq!(reading.used, 512);
        assert_eq!(reading.pressure(), 0.5);

        source.clear();
        assert!(source.read().is_none());
    }

    #[test]
    fn test_missing_capabilities_degrade() {
        assert!(NoMemoryInfo.read().is_none());
        assert!(NoGcHint.request().is_ok());
        assert!(NoGcHint.request_full().is_ok());
    }

    #[test]
    fn test_zero_total_pressure() {
        assert_eq!(MemoryReading::new(10, 0).pressure(), 0.0);
    }
}
