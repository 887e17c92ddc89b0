use memwarden_core::SchedulingConfig;

const HIGH_PRESSURE: f64 = 0.8;
const IDLE_PRESSURE: f64 = 0.3;

/// Milliseconds until the next cleanup: shorter under pressure, longer
/// when idle, nudged by how productive recent passes were.
pub fn next_interval(scheduling: &SchedulingConfig, memory_pressure: f64, efficiency: f64) -> u64 {
    let mut interval = scheduling.base_interval_ms as f64;

    if memory_pressure > HIGH_PRESSURE {
        interval *= scheduling.pressure_multiplier;
    } else if memory_pressure < IDLE_PRESSURE {
        interval *= scheduling.idle_multiplier;
    }

    if efficiency < 0.5 {
        interval *= 0.8;
    } else if efficiency > 1.5 {
        interval *= 1.2;
    }

    interval
        .round()
        .clamp(
            scheduling.min_interval_ms as f64,
            scheduling.max_interval_ms as f64,
        ) as u64
}

/// Exponential moving average of bytes freed per millisecond.
pub fn smoothed_efficiency(previous: f64, memory_freed: u64, cleanup_time_ms: f64) -> f64 {
    (previous + memory_freed as f64 / cleanup_time_ms.max(1.0)) / 2.0
}
