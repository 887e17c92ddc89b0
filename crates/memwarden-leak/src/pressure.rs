use memwarden_core::Severity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// Events considered by the pressure analysis.
pub const PRESSURE_WINDOW: usize = 10;
/// Consecutive rising events that make a pressure trend.
pub const PRESSURE_TREND_EVENTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPressureEvent {
    pub pressure: f64,
    pub source: String,
    pub context: Value,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureAnalysis {
    pub event_count: usize,
    /// Events per minute over the span of the window.
    pub frequency: f64,
    pub average_pressure: f64,
    pub severity: Severity,
}

impl PressureAnalysis {
    pub fn empty() -> Self {
        Self {
            event_count: 0,
            frequency: 0.0,
            average_pressure: 0.0,
            severity: Severity::None,
        }
    }
}

pub fn analyze_pressure(events: &VecDeque<MemoryPressureEvent>) -> PressureAnalysis {
    let skip = events.len().saturating_sub(PRESSURE_WINDOW);
    let window: Vec<&MemoryPressureEvent> = events.iter().skip(skip).collect();
    let (first, last) = match (window.first(), window.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return PressureAnalysis::empty(),
    };

    let span_minutes = last.timestamp.saturating_sub(first.timestamp) as f64 / 60_000.0;
    let frequency = window.len() as f64 / span_minutes.max(1.0);
    let average_pressure =
        window.iter().map(|e| e.pressure).sum::<f64>() / window.len() as f64;

    let severity = if frequency > 5.0 && average_pressure > 0.95 {
        Severity::Critical
    } else if frequency > 3.0 && average_pressure > 0.9 {
        Severity::High
    } else if frequency > 1.0 && average_pressure > 0.85 {
        Severity::Medium
    } else {
        Severity::Low
    };

    PressureAnalysis {
        event_count: window.len(),
        frequency,
        average_pressure,
        severity,
    }
}

/// True when the latest events rise strictly.
pub fn is_rising(events: &VecDeque<MemoryPressureEvent>) -> bool {
    if events.len() < PRESSURE_TREND_EVENTS {
        return false;
    }
    let recent: Vec<f64> = events
        .iter()
        .skip(events.len() - PRESSURE_TREND_EVENTS)
        .map(|e| e.pressure)
        .collect();
    recent.windows(2).all(|pair| pair[1] > pair[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(points: &[(u64, f64)]) -> VecDeque<MemoryPressureEvent> {
        points
            .iter()
            .map(|&(timestamp, pressure)| MemoryPressureEvent {
                pressure,
                source: "test".into(),
                context: Value::Null,
                timestamp,
            })
            .collect()
    }

    #[test]
    fn test_empty_is_none() {
        let analysis = analyze_pressure(&VecDeque::new());
        assert_eq!(analysis.severity, Severity::None);
        assert_eq!(analysis.event_count, 0);
    }

    #[test]
    fn test_burst_within_a_minute_is_critical() {
        let points: Vec<(u64, f64)> = (0..8).map(|i| (i * 1000, 0.97)).collect();
        let analysis = analyze_pressure(&events(&points));
        assert_eq!(analysis.frequency, 8.0);
        assert_eq!(analysis.severity, Severity::Critical);
    }

    #[test]
    fn test_sparse_events_are_low() {
        let analysis = analyze_pressure(&events(&[(0, 0.99), (600_000, 0.99)]));
        assert!(analysis.frequency < 1.0);
        assert_eq!(analysis.severity, Severity::Low);
    }

    #[test]
    fn test_only_last_ten_events() {
        let points: Vec<(u64, f64)> = (0..15).map(|i| (i * 1000, 0.9)).collect();
        assert_eq!(analyze_pressure(&events(&points)).event_count, 10);
    }

    #[test]
    fn test_rising_needs_strict_increase() {
        assert!(is_rising(&events(&[(0, 0.81), (1, 0.82), (2, 0.83)])));
        assert!(!is_rising(&events(&[(0, 0.81), (1, 0.82), (2, 0.82)])));
        assert!(!is_rising(&events(&[(0, 0.81), (1, 0.82)])));
    }
}
