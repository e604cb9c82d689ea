use async_trait::async_trait;

use pacemaker_core::types::{FlushReason, LlmDecisionResult};

use crate::error::QueueError;

/// Emitted when a flush successfully hands a batch all the way through C5/C3/C2.
#[derive(Debug, Clone)]
pub struct QueueFlushedEvent {
    pub context_id: String,
    pub reason: FlushReason,
    pub correlated_inbound_ids: Vec<String>,
    pub result: LlmDecisionResult,
}

/// C4's single subscribed listener (spec §4.4 step 5/6) — the correlator
/// (C7) is the only implementer in the full pipeline, but the trait keeps C4
/// from depending on C7's crate.
#[async_trait]
pub trait QueueListener: Send + Sync {
    async fn on_queue_flushed(&self, event: QueueFlushedEvent);
    async fn on_queue_error(&self, context_id: &str, err: QueueError);
}

/// The C5→C2 pipeline as C4 sees it: hand a drained batch to the assembler
/// and LLM client, get back a decision or a processing error. The
/// orchestrator wires the real `pacemaker-assembler` + `pacemaker-llm`
/// collaboration behind this trait.
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    async fn process_messages(
        &self,
        context_id: &str,
        snapshot: &[pacemaker_core::types::QueuedMessage],
    ) -> std::result::Result<LlmDecisionResult, QueueError>;
}
