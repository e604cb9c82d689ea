use async_trait::async_trait;

use pacemaker_core::types::TaskPayload;

/// Registered per `TaskKind` (spec §4.6 `register(kind, handler)`). The
/// handler owns the actual side effect — posting a reply to the event bus,
/// appending a thought-log record — the runner only owns retry/ordering.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, payload: &TaskPayload) -> Result<(), String>;
}
