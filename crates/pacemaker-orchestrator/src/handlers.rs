use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use pacemaker_core::interfaces::{EventBus, OutboundRequest, ThoughtSink};
use pacemaker_core::types::{ThoughtRecord, TaskPayload};
use pacemaker_tasks::TaskHandler;

/// Dispatches a `deliver-reply` task onto the external event bus (spec §4.6,
/// §4.7 step 4). Bus errors are surfaced to the runner as retryable failures.
pub struct DeliverReplyHandler {
    bus: Arc<dyn EventBus>,
}

impl DeliverReplyHandler {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl TaskHandler for DeliverReplyHandler {
    async fn handle(&self, payload: &TaskPayload) -> Result<(), String> {
        let TaskPayload::DeliverReply { target, content, mention } = payload else {
            return Err("deliver-reply handler received a mismatched payload".into());
        };
        let request = OutboundRequest::for_target(target, content.clone(), mention.clone());
        self.bus.send(request).await.map_err(|e| e.to_string())
    }
}

/// Dispatches a `record-thought` task onto the external thought-log sink
/// (spec §4.6, §6 persisted state).
pub struct RecordThoughtHandler {
    sink: Arc<dyn ThoughtSink>,
}

impl RecordThoughtHandler {
    pub fn new(sink: Arc<dyn ThoughtSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl TaskHandler for RecordThoughtHandler {
    async fn handle(&self, payload: &TaskPayload) -> Result<(), String> {
        let TaskPayload::RecordThought { content, metadata } = payload else {
            return Err("record-thought handler received a mismatched payload".into());
        };
        let entry = ThoughtRecord {
            memory_type: "reasoning".into(),
            content: content.clone(),
            metadata: metadata.clone(),
            recorded_at: Utc::now(),
        };
        self.sink.record(entry).await.map_err(|e| {
            warn!(error = %e, "thought sink rejected entry");
            e.to_string()
        })
    }
}
