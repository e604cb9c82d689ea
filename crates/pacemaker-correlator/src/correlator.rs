use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use tracing::{debug, info, instrument, warn};

use pacemaker_core::types::{LlmDecision, OriginatingEvent, PendingCorrelation, TaskKind, TaskPayload, TaskPriority};
use pacemaker_queue::{QueueError, QueueFlushedEvent, QueueListener};
use pacemaker_tasks::TaskRunner;

const EVICTION_TTL_MINUTES: i64 = 30;

/// C7: correlates pending inbound events with LLM outputs and dispatches the
/// resulting replies / thought-log entries onto the Task Runner (spec §4.7).
pub struct Correlator {
    pending: DashMap<String, PendingCorrelation>,
    tasks: Arc<TaskRunner>,
    task_max_attempts: u32,
}

impl Correlator {
    pub fn new(tasks: Arc<TaskRunner>, task_max_attempts: u32) -> Self {
        Self {
            pending: DashMap::new(),
            tasks,
            task_max_attempts,
        }
    }

    /// Called by the Orchestrator (C8) at ingress to record a
    /// `PendingCorrelation` before a message is handed to C4.
    pub fn record(&self, inbound_message_id: String, originating_event: OriginatingEvent) {
        self.pending.insert(
            inbound_message_id.clone(),
            PendingCorrelation {
                inbound_message_id,
                originating_event,
                created_at: Utc::now(),
            },
        );
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Determine which inbound ids this decision answers (spec §4.7 step 1).
    /// Logs which strategy fired.
    fn resolve_correlated_ids(&self, decision_ids: &[String], batch_ids: &[String]) -> Vec<String> {
        if !decision_ids.is_empty() {
            debug!("correlation strategy: explicit decision ids");
            return decision_ids.to_vec();
        }
        if !batch_ids.is_empty() {
            debug!("correlation strategy: flushed batch ids");
            return batch_ids.to_vec();
        }
        warn!("correlation strategy: degraded fallback to all currently-pending ids");
        self.pending.iter().map(|e| e.key().clone()).collect()
    }

    #[instrument(skip(self, event))]
    async fn correlate(&self, event: QueueFlushedEvent) {
        let ids = self.resolve_correlated_ids(&event.result.correlated_inbound_ids, &event.correlated_inbound_ids);

        let entries: Vec<PendingCorrelation> = ids
            .into_iter()
            .filter_map(|id| self.pending.remove(&id).map(|(_, v)| v))
            .collect();

        if entries.is_empty() {
            debug!("no matching pending correlations for this flush");
            return;
        }

        match &event.result.decision {
            LlmDecision::NoReply { reason, thinking } => {
                debug!(reason = %reason, "decision was no-reply");
                if !thinking.is_empty() {
                    self.enqueue_thought(thinking.clone()).await;
                }
            }
            LlmDecision::Reply { messages, thinking, mentions } => {
                let target = entries
                    .iter()
                    .max_by_key(|e| e.created_at)
                    .expect("entries is non-empty")
                    .originating_event
                    .clone();

                let mention = mentions
                    .as_ref()
                    .filter(|set| set.contains(&target.sender_id))
                    .map(|_| target.sender_id.clone());

                for content in messages {
                    self.enqueue_delivery(target.clone(), content.clone(), mention.clone()).await;
                }
                if !thinking.is_empty() {
                    self.enqueue_thought(thinking.clone()).await;
                }
            }
        }
    }

    async fn enqueue_delivery(&self, target: OriginatingEvent, content: String, mention: Option<String>) {
        let payload = TaskPayload::DeliverReply { target, content, mention };
        if let Err(e) = self
            .tasks
            .enqueue(TaskKind::DeliverReply, payload, TaskPriority::Normal, self.task_max_attempts)
            .await
        {
            warn!(error = %e, "failed to enqueue deliver-reply task");
        }
    }

    async fn enqueue_thought(&self, content: String) {
        let payload = TaskPayload::RecordThought { content, metadata: serde_json::Value::Null };
        if let Err(e) = self
            .tasks
            .enqueue(TaskKind::RecordThought, payload, TaskPriority::Normal, self.task_max_attempts)
            .await
        {
            warn!(error = %e, "failed to enqueue record-thought task");
        }
    }

    /// Remove correlations older than 30 minutes; they will never match a
    /// future flush (spec §4.7 eviction). Returns the number evicted.
    pub fn evict_expired(&self) -> usize {
        let cutoff = Utc::now() - ChronoDuration::minutes(EVICTION_TTL_MINUTES);
        let before = self.pending.len();
        self.pending.retain(|_, correlation| correlation.created_at > cutoff);
        before - self.pending.len()
    }

    /// Drop and return every still-pending correlation, for shutdown
    /// reporting (spec §4.8).
    pub fn drain_all(&self) -> Vec<PendingCorrelation> {
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        ids.into_iter().filter_map(|id| self.pending.remove(&id).map(|(_, v)| v)).collect()
    }
}

#[async_trait]
impl QueueListener for Correlator {
    async fn on_queue_flushed(&self, event: QueueFlushedEvent) {
        self.correlate(event).await;
    }

    async fn on_queue_error(&self, context_id: &str, err: QueueError) {
        warn!(context_id, error = %err, "queue flush failed, batch considered delivered-with-error");
    }
}

/// Background eviction sweep (spec §4.7). Mirrors the credential pool's
/// daily-reset loop shape: sleep, act, check shutdown, repeat.
pub async fn run_eviction_loop(correlator: Arc<Correlator>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let evicted = correlator.evict_expired();
                if evicted > 0 {
                    info!(evicted, "correlator: evicted expired pending correlations");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("correlator eviction loop shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacemaker_core::types::{LlmDecisionResult, TaskPayload};
    use pacemaker_tasks::TaskHandler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::watch;

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl TaskHandler for CountingHandler {
        async fn handle(&self, _payload: &TaskPayload) -> std::result::Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn originating(id: &str) -> OriginatingEvent {
        OriginatingEvent { conversation_id: "convo".into(), group_id: None, sender_id: id.into() }
    }

    async fn make_runner(delivery_calls: Arc<AtomicUsize>, thought_calls: Arc<AtomicUsize>) -> Arc<TaskRunner> {
        let runner = TaskRunner::new();
        runner.register(TaskKind::DeliverReply, Arc::new(CountingHandler(delivery_calls)));
        runner.register(TaskKind::RecordThought, Arc::new(CountingHandler(thought_calls)));
        let (_tx, rx) = watch::channel(false);
        tokio::spawn(Arc::clone(&runner).run(rx));
        runner
    }

    fn flushed_event(decision: LlmDecision, batch_ids: Vec<String>, decision_ids: Vec<String>) -> QueueFlushedEvent {
        QueueFlushedEvent {
            context_id: "convo".into(),
            reason: pacemaker_core::types::FlushReason::Silence,
            correlated_inbound_ids: batch_ids,
            result: LlmDecisionResult {
                decision,
                tokens_used: 10,
                correlated_inbound_ids: decision_ids,
            },
        }
    }

    #[tokio::test]
    async fn reply_decision_enqueues_delivery_for_most_recent_target() {
        let delivery_calls = Arc::new(AtomicUsize::new(0));
        let thought_calls = Arc::new(AtomicUsize::new(0));
        let runner = make_runner(delivery_calls.clone(), thought_calls.clone()).await;
        let correlator = Correlator::new(runner, 3);

        correlator.record("m1".into(), originating("u1"));
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        correlator.record("m2".into(), originating("u2"));

        let decision = LlmDecision::Reply {
            messages: vec!["hi".into(), "there".into()],
            thinking: "because".into(),
            mentions: None,
        };
        correlator
            .on_queue_flushed(flushed_event(decision, vec!["m1".into(), "m2".into()], vec![]))
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(delivery_calls.load(Ordering::SeqCst), 2);
        assert_eq!(thought_calls.load(Ordering::SeqCst), 1);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn no_reply_with_empty_thinking_enqueues_nothing() {
        let delivery_calls = Arc::new(AtomicUsize::new(0));
        let thought_calls = Arc::new(AtomicUsize::new(0));
        let runner = make_runner(delivery_calls.clone(), thought_calls.clone()).await;
        let correlator = Correlator::new(runner, 3);

        correlator.record("m1".into(), originating("u1"));
        let decision = LlmDecision::NoReply { reason: "nothing to add".into(), thinking: String::new() };
        correlator.on_queue_flushed(flushed_event(decision, vec!["m1".into()], vec![])).await;

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(delivery_calls.load(Ordering::SeqCst), 0);
        assert_eq!(thought_calls.load(Ordering::SeqCst), 0);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn degraded_fallback_uses_all_pending_when_no_ids_available() {
        let delivery_calls = Arc::new(AtomicUsize::new(0));
        let thought_calls = Arc::new(AtomicUsize::new(0));
        let runner = make_runner(delivery_calls.clone(), thought_calls.clone()).await;
        let correlator = Correlator::new(runner, 3);

        correlator.record("m1".into(), originating("u1"));
        let decision = LlmDecision::NoReply { reason: "r".into(), thinking: String::new() };
        correlator.on_queue_flushed(flushed_event(decision, vec![], vec![])).await;

        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn eviction_removes_entries_older_than_ttl() {
        let delivery_calls = Arc::new(AtomicUsize::new(0));
        let thought_calls = Arc::new(AtomicUsize::new(0));
        let runner = make_runner(delivery_calls, thought_calls).await;
        let correlator = Correlator::new(runner, 3);

        correlator.pending.insert(
            "stale".into(),
            PendingCorrelation {
                inbound_message_id: "stale".into(),
                originating_event: originating("u1"),
                created_at: Utc::now() - ChronoDuration::minutes(31),
            },
        );
        correlator.record("fresh".into(), originating("u2"));

        let evicted = correlator.evict_expired();
        assert_eq!(evicted, 1);
        assert_eq!(correlator.pending_count(), 1);
    }
}
