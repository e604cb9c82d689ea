use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tracing::{debug, info, instrument};

use pacemaker_core::config::StaminaConfig;
use pacemaker_core::types::StaminaLevel;

use crate::types::{StaminaSnapshot, StaminaState};

/// Notified when `level()` crosses into a different [`StaminaLevel`] bucket.
/// No behavioral branch in this crate depends on observers firing — this is
/// purely for the observability surface (mirrors the hook engine's After
/// dispatch elsewhere in this workspace, minus the Before/Block machinery
/// since nothing here can veto a stamina update).
pub trait StaminaObserver: Send + Sync {
    fn on_level_changed(&self, previous: StaminaLevel, current: StaminaLevel);
}

/// Central fatigue-with-inertia model (spec §4.3). A single instance is
/// shared (via `Arc`) between the batch assembler, which calls `consume()`
/// after every flush, and the background regen loop, which calls the same
/// elapsed-time update with zero intensity.
pub struct StaminaController {
    config: StaminaConfig,
    state: Mutex<StaminaState>,
    observers: RwLock<Vec<Arc<dyn StaminaObserver>>>,
}

impl StaminaController {
    pub fn new(config: StaminaConfig) -> Self {
        let state = StaminaState::new(config.s_max, config.rest_mode);
        Self {
            config,
            state: Mutex::new(state),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn register_observer(&self, observer: Arc<dyn StaminaObserver>) {
        self.observers.write().expect("observer list poisoned").push(observer);
    }

    /// `can_reply()` per spec §4.3: stamina must cover at least one message's
    /// worth of consumption and rest mode must be off. Written literally as
    /// `k * 1^p` rather than simplified to `k`, matching the spec text.
    pub fn can_reply(&self) -> bool {
        let state = self.state.lock().unwrap();
        !state.rest_mode && state.current >= self.config.k * 1f64.powf(self.config.p)
    }

    /// Current derived label over `current / S_max` (spec §4.3). The three
    /// breakpoints in the spec text are 70%, 50%, and `criticalThresh` —
    /// `lowThresh` is accepted in configuration but does not gate this
    /// derivation; see the resolved Open Question in DESIGN.md.
    pub fn level(&self) -> StaminaLevel {
        let state = self.state.lock().unwrap();
        self.level_of(state.current)
    }

    fn level_of(&self, current: f64) -> StaminaLevel {
        let ratio_pct = (current / self.config.s_max) * 100.0;
        if ratio_pct >= 70.0 {
            StaminaLevel::High
        } else if ratio_pct >= 50.0 {
            StaminaLevel::Medium
        } else if ratio_pct >= self.config.critical_thresh {
            StaminaLevel::Low
        } else {
            StaminaLevel::Critical
        }
    }

    pub fn snapshot(&self) -> StaminaSnapshot {
        let state = self.state.lock().unwrap();
        StaminaSnapshot {
            current: state.current,
            s_max: self.config.s_max,
            momentum: state.momentum,
            level: self.level_of(state.current),
            rest_mode: state.rest_mode,
        }
    }

    /// Admin operation: force `current` to an operator-chosen value (clamped
    /// to `[0, S_max]`). Logs the override.
    pub fn set_current(&self, value: f64) {
        let mut state = self.state.lock().unwrap();
        state.current = value.clamp(0.0, self.config.s_max);
        info!(current = state.current, "stamina: current forced by operator");
    }

    pub fn set_rest_mode(&self, rest_mode: bool) {
        let mut state = self.state.lock().unwrap();
        state.rest_mode = rest_mode;
        info!(rest_mode, "stamina: rest mode toggled");
    }

    /// Apply an elapsed-time catch-up tick with zero arrival intensity. Used
    /// both by `consume()` (to account for time since the last update before
    /// applying the batch-sized kick) and by the background regen loop.
    #[instrument(skip(self))]
    pub fn tick(&self) {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let dt = (now - state.last_update_at)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0;
        state.last_update_at = now;
        self.apply_update(&mut state, 0.0, dt);
    }

    /// Batch processing calls `consume(messageCount)`: first an elapsed
    /// background tick, then `update(messageCount, dt = 1)` — both steps
    /// exactly as spec §4.3 describes them.
    #[instrument(skip(self))]
    pub fn consume(&self, message_count: u32) {
        self.tick();
        let mut state = self.state.lock().unwrap();
        let previous_level = self.level_of(state.current);
        self.apply_update(&mut state, message_count as f64, 1.0);
        let new_level = self.level_of(state.current);
        let current = state.current;
        let momentum = state.momentum;
        drop(state);

        debug!(current, momentum, "stamina updated after consume");
        if previous_level != new_level {
            self.notify_level_changed(previous_level, new_level);
        }
    }

    fn apply_update(&self, state: &mut StaminaState, intensity: f64, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let cfg = &self.config;

        state.momentum = (state.momentum * (1.0 - cfg.beta * dt) + cfg.alpha * intensity * dt).max(0.0);

        if state.rest_mode {
            return;
        }

        let consume = cfg.k * intensity.powf(cfg.p) * dt;
        let recover = (cfg.r * (1.0 - state.current / cfg.s_max) - cfg.gamma * state.momentum) * dt;
        state.current = (state.current - consume + recover).clamp(0.0, cfg.s_max);
    }

    fn notify_level_changed(&self, previous: StaminaLevel, current: StaminaLevel) {
        info!(?previous, ?current, "stamina level transition");
        let observers = self.observers.read().expect("observer list poisoned");
        for observer in observers.iter() {
            observer.on_level_changed(previous, current);
        }
    }
}

/// Background regen loop: ticks every `regenIntervalMs` until `shutdown`
/// reports `true` (mirrors the scheduler engine's interval-tick-vs-shutdown
/// select loop elsewhere in this workspace).
pub async fn run_regen_loop(
    controller: Arc<StaminaController>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval =
        tokio::time::interval(std::time::Duration::from_millis(controller.config.regen_interval_ms));
    info!("stamina regen loop started");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                controller.tick();
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("stamina regen loop shutting down");
                    break;
                }
            }
        }
    }
}
