use chrono::{DateTime, Utc};

use pacemaker_core::types::{FlushReason, QueuedMessage};

/// Per-context queue state (spec §3). Not exposed outside this crate — the
/// orchestrator and correlator only ever see the events `QueueManager`
/// emits, never this type directly.
pub(crate) struct PerContextQueueState {
    pub messages: Vec<QueuedMessage>,
    pub processing: bool,
    pub last_flush_at: Option<DateTime<Utc>>,
    pub last_flush_reason: Option<FlushReason>,
    /// Bumped every time the silence timer is (re-)armed or cancelled, so a
    /// stale timer firing after a flush or a re-arm is a silent no-op
    /// instead of racing the current state.
    pub silence_generation: u64,
    /// Whether a silence timer is currently outstanding for this context.
    pub timer_armed: bool,
}

impl PerContextQueueState {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            processing: false,
            last_flush_at: None,
            last_flush_reason: None,
            silence_generation: 0,
            timer_armed: false,
        }
    }

    pub fn is_idle_and_empty(&self) -> bool {
        self.messages.is_empty() && !self.processing && !self.timer_armed
    }
}
