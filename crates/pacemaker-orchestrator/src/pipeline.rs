use std::sync::Arc;

use async_trait::async_trait;

use pacemaker_core::types::{LlmDecision, LlmDecisionResult, QueuedMessage};
use pacemaker_llm::LlmClient;
use pacemaker_queue::{BatchProcessor, QueueError};

use pacemaker_assembler::BatchAssembler;

/// Glues C5 (assembler) and C2 (LLM client) behind the [`BatchProcessor`]
/// trait C4 depends on, closing the loop without C4 ever knowing about the
/// orchestrator crate (spec §9 cyclic-reference resolution).
pub struct PipelineProcessor {
    assembler: Arc<BatchAssembler>,
    llm: Arc<LlmClient>,
}

impl PipelineProcessor {
    pub fn new(assembler: Arc<BatchAssembler>, llm: Arc<LlmClient>) -> Self {
        Self { assembler, llm }
    }
}

#[async_trait]
impl BatchProcessor for PipelineProcessor {
    async fn process_messages(
        &self,
        context_id: &str,
        snapshot: &[QueuedMessage],
    ) -> std::result::Result<LlmDecisionResult, QueueError> {
        let (main_content, structured_context) = self
            .assembler
            .assemble(context_id, snapshot)
            .map_err(|e| QueueError::ProcessingFailed(e.to_string()))?;

        let result = self
            .llm
            .generate(&main_content, &structured_context)
            .await
            .map_err(|e| QueueError::ProcessingFailed(e.to_string()))?;

        if let LlmDecision::Reply { messages, .. } = &result.decision {
            if let Some(last) = messages.last() {
                self.assembler.commit_reply(context_id, last.clone());
            }
        }

        Ok(result)
    }
}
