use chrono::{DateTime, Utc};

pub use pacemaker_core::types::StaminaLevel;

/// Mutable fatigue-with-inertia state (spec §4.3). `momentum` tracks recent
/// message-arrival intensity and drags on recovery; `current` is the stamina
/// pool itself.
#[derive(Debug, Clone)]
pub struct StaminaState {
    pub current: f64,
    pub momentum: f64,
    pub last_update_at: DateTime<Utc>,
    pub rest_mode: bool,
}

impl StaminaState {
    pub fn new(s_max: f64, rest_mode: bool) -> Self {
        Self {
            current: s_max,
            momentum: 0.0,
            last_update_at: Utc::now(),
            rest_mode,
        }
    }
}

/// Snapshot for the observability surface.
#[derive(Debug, Clone, Copy)]
pub struct StaminaSnapshot {
    pub current: f64,
    pub s_max: f64,
    pub momentum: f64,
    pub level: StaminaLevel,
    pub rest_mode: bool,
}
