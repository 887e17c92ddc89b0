use std::fmt;
use std::str::FromStr;

use memwarden_core::CleanupMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Minimal,
    Standard,
    Comprehensive,
    Aggressive,
    Emergency,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        Self::Minimal,
        Self::Standard,
        Self::Comprehensive,
        Self::Aggressive,
        Self::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Standard => "standard",
            Self::Comprehensive => "comprehensive",
            Self::Aggressive => "aggressive",
            Self::Emergency => "emergency",
        }
    }

    pub fn strategy(&self) -> &'static CleanupStrategy {
        match self {
            Self::Minimal => &MINIMAL,
            Self::Standard => &STANDARD,
            Self::Comprehensive => &COMPREHENSIVE,
            Self::Aggressive => &AGGRESSIVE,
            Self::Emergency => &EMERGENCY,
        }
    }

    /// Unknown names resolve to the standard strategy.
    pub fn from_name_or_standard(name: &str) -> Self {
        name.parse().unwrap_or(Self::Standard)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown cleanup strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupAction {
    CleanupOldTimers,
    CleanupTimers,
    CleanupAllTimers,
    EmergencyTimerCleanup,
    ClearAllTimers,
    CleanupListeners,
    CleanupAllListeners,
    EmergencyListenerCleanup,
    ClearAllListeners,
    CleanupContexts,
    ClearAllContexts,
    EvictExpiredCache,
    EvictCache,
    EvictAllCache,
    PurgeAllCache,
    ClearAllCache,
    CustomCleanups,
    EmergencyCustomCleanups,
    ForceGc,
    EmergencyGc,
}

impl CleanupAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CleanupOldTimers => "cleanup_old_timers",
            Self::CleanupTimers => "cleanup_timers",
            Self::CleanupAllTimers => "cleanup_all_timers",
            Self::EmergencyTimerCleanup => "emergency_timer_cleanup",
            Self::ClearAllTimers => "clear_all_timers",
            Self::CleanupListeners => "cleanup_listeners",
            Self::CleanupAllListeners => "cleanup_all_listeners",
            Self::EmergencyListenerCleanup => "emergency_listener_cleanup",
            Self::ClearAllListeners => "clear_all_listeners",
            Self::CleanupContexts => "cleanup_contexts",
            Self::ClearAllContexts => "clear_all_contexts",
            Self::EvictExpiredCache => "evict_expired_cache",
            Self::EvictCache => "evict_cache",
            Self::EvictAllCache => "evict_all_cache",
            Self::PurgeAllCache => "purge_all_cache",
            Self::ClearAllCache => "clear_all_cache",
            Self::CustomCleanups => "custom_cleanups",
            Self::EmergencyCustomCleanups => "emergency_custom_cleanups",
            Self::ForceGc => "force_gc",
            Self::EmergencyGc => "emergency_gc",
        }
    }
}

impl fmt::Display for CleanupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, ordered list of actions with a time budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupStrategy {
    pub kind: StrategyKind,
    pub priority: u8,
    pub actions: &'static [CleanupAction],
    pub memory_threshold: f64,
    /// Budget in milliseconds, checked between actions.
    pub time_limit_ms: f64,
}

use CleanupAction::*;

pub static MINIMAL: CleanupStrategy = CleanupStrategy {
    kind: StrategyKind::Minimal,
    priority: 1,
    actions: &[CleanupOldTimers, EvictExpiredCache],
    memory_threshold: 0.3,
    time_limit_ms: 10.0,
};

pub static STANDARD: CleanupStrategy = CleanupStrategy {
    kind: StrategyKind::Standard,
    priority: 2,
    actions: &[CleanupTimers, CleanupListeners, EvictCache, CustomCleanups],
    memory_threshold: 0.6,
    time_limit_ms: 50.0,
};

pub static COMPREHENSIVE: CleanupStrategy = CleanupStrategy {
    kind: StrategyKind::Comprehensive,
    priority: 3,
    actions: &[
        CleanupAllTimers,
        CleanupAllListeners,
        CleanupContexts,
        EvictAllCache,
        CustomCleanups,
        ForceGc,
    ],
    memory_threshold: 0.8,
    time_limit_ms: 100.0,
};

pub static AGGRESSIVE: CleanupStrategy = CleanupStrategy {
    kind: StrategyKind::Aggressive,
    priority: 4,
    actions: &[
        EmergencyTimerCleanup,
        EmergencyListenerCleanup,
        PurgeAllCache,
        EmergencyCustomCleanups,
        ForceGc,
    ],
    memory_threshold: 1.0,
    time_limit_ms: 200.0,
};

pub static EMERGENCY: CleanupStrategy = CleanupStrategy {
    kind: StrategyKind::Emergency,
    priority: 5,
    actions: &[
        ClearAllTimers,
        ClearAllListeners,
        ClearAllCache,
        ClearAllContexts,
        EmergencyGc,
    ],
    memory_threshold: 1.0,
    time_limit_ms: 500.0,
};

/// Escalation ladder; the first matching rule wins.
pub fn select_strategy(
    memory_pressure: f64,
    recent_efficiency: f64,
    mode: CleanupMode,
    since_last_cleanup_ms: u64,
    max_interval_ms: u64,
) -> StrategyKind {
    if memory_pressure > 0.9 {
        StrategyKind::Emergency
    } else if memory_pressure > 0.7 || recent_efficiency < 0.5 {
        StrategyKind::Aggressive
    } else if mode == CleanupMode::Aggressive || since_last_cleanup_ms > max_interval_ms {
        StrategyKind::Comprehensive
    } else if memory_pressure < 0.3 && recent_efficiency > 0.8 {
        StrategyKind::Minimal
    } else {
        StrategyKind::Standard
    }
}
