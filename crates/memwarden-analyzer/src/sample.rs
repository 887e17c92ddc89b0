use memwarden_core::pressure_ratio;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One recorded (used, total) observation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSample {
    pub used: u64,
    pub total: u64,
    pub pressure: f64,
    pub timestamp: u64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl UsageSample {
    pub fn new(used: u64, total: u64, timestamp: u64, metadata: serde_json::Value) -> Self {
        Self {
            used,
            total,
            pressure: pressure_ratio(used, total),
            timestamp,
            metadata,
        }
    }
}

/// Bounded FIFO of samples, oldest first.
#[derive(Debug, Clone, Default)]
pub struct UsageHistory {
    samples: VecDeque<UsageSample>,
    capacity: usize,
}

impl UsageHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, sample: UsageSample) {
        self.samples.push_back(sample);
        self.trim();
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.trim();
    }

    fn trim(&mut self) {
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&UsageSample> {
        self.samples.back()
    }

    /// The trailing `n` samples, oldest first.
    pub fn tail(&self, n: usize) -> Vec<&UsageSample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).collect()
    }

    /// Samples taken at or after `since_ms`, oldest first.
    pub fn since(&self, since_ms: u64) -> Vec<&UsageSample> {
        self.samples
            .iter()
            .filter(|s| s.timestamp >= since_ms)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UsageSample> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_history_is_bounded() {
        let mut history = UsageHistory::new(3);
        for i in 0..10 {
            history.push(UsageSample::new(i, 10, i * 1000, Value::Null));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().unwrap().used, 9);
        assert_eq!(history.iter().next().unwrap().used, 7);
    }

    #[test]
    fn test_tail_and_since() {
        let mut history = UsageHistory::new(10);
        for i in 0..5 {
            history.push(UsageSample::new(i, 10, i * 1000, Value::Null));
        }
        let tail: Vec<u64> = history.tail(2).iter().map(|s| s.used).collect();
        assert_eq!(tail, vec![3, 4]);
        assert_eq!(history.tail(50).len(), 5);
        assert_eq!(history.since(3000).len(), 2);
    }

    #[test]
    fn test_shrinking_capacity_trims_oldest() {
        let mut history = UsageHistory::new(5);
        for i in 0..5 {
            history.push(UsageSample::new(i, 10, i, Value::Null));
        }
        history.set_capacity(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().next().unwrap().used, 3);
    }
}
