//! Exercises the end-to-end scenarios from spec §8 against a real
//! `Orchestrator` wired with in-process test doubles for every external
//! collaborator — no real chat platform or model endpoint involved.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

use pacemaker_core::config::{
    BotIdentity, CredentialsConfig, LlmConfig, PacemakerConfig, SchedulerConfig, StaminaConfig, TaskRunnerConfig,
};
use pacemaker_core::interfaces::{
    AdminCommand, AdminCommandHandler, BusError, EventBus, LlmBackend, LlmBackendError, LlmCompletion, OutboundRequest,
    ThoughtSink,
};
use pacemaker_core::types::{InboundMessage, MessageKind, ThoughtRecord};
use pacemaker_orchestrator::Orchestrator;

struct RecordingBus {
    sent: Mutex<Vec<OutboundRequest>>,
}

impl RecordingBus {
    fn new() -> Self {
        Self { sent: Mutex::new(vec![]) }
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn send(&self, request: OutboundRequest) -> Result<(), BusError> {
        self.sent.lock().await.push(request);
        Ok(())
    }
}

struct NoAdmin;
impl AdminCommandHandler for NoAdmin {
    fn is_admin(&self, _sender_id: &str) -> bool {
        false
    }
    fn parse(&self, _content: &str) -> Option<AdminCommand> {
        None
    }
}

struct NullThoughtSink;
#[async_trait]
impl ThoughtSink for NullThoughtSink {
    async fn record(&self, _entry: ThoughtRecord) -> pacemaker_core::error::Result<()> {
        Ok(())
    }
}

struct AlwaysReplyBackend;
#[async_trait]
impl LlmBackend for AlwaysReplyBackend {
    async fn complete(&self, _prompt: &str, _credential: &str) -> Result<LlmCompletion, LlmBackendError> {
        Ok(LlmCompletion { text: r#"{"messages": ["ack"], "thinking": "t"}"#.into(), tokens_used: 2 })
    }
}

/// Rate-limits every credential except the one supplied at construction,
/// so `generate()` is forced through the credential-rotation path (spec §4.2).
struct RateLimitUntilCredential {
    good_credential: String,
    calls: AtomicU32,
}

#[async_trait]
impl LlmBackend for RateLimitUntilCredential {
    async fn complete(&self, _prompt: &str, credential: &str) -> Result<LlmCompletion, LlmBackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if credential == self.good_credential {
            Ok(LlmCompletion { text: r#"{"messages": ["ack"], "thinking": "t"}"#.into(), tokens_used: 2 })
        } else {
            Err(LlmBackendError::RateLimited { retry_after_ms: 10 })
        }
    }
}

fn base_config() -> PacemakerConfig {
    PacemakerConfig {
        scheduler: SchedulerConfig { silence_seconds: 1, max_queue_size: 3, max_queue_age_seconds: 30 },
        stamina: StaminaConfig::default(),
        credentials: CredentialsConfig { primary: vec!["k1".into()], backup: vec![] },
        llm: LlmConfig { max_attempts: 1, base_delay_ms: 1, cap_delay_ms: 5, ..LlmConfig::default() },
        tasks: TaskRunnerConfig::default(),
        bot: BotIdentity { bot_id: "bot".into(), bot_name: Some("Botty".into()) },
    }
}

fn inbound(id: &str, sender: &str, content: &str) -> InboundMessage {
    InboundMessage {
        id: id.into(),
        sender_id: sender.into(),
        sender_display_name: None,
        conversation_id: "convo".into(),
        group_id: None,
        content: content.into(),
        received_at: chrono::Utc::now(),
        kind: MessageKind::Text,
    }
}

#[tokio::test]
async fn silence_timer_flushes_a_quiet_context_after_the_configured_window() {
    let bus = Arc::new(RecordingBus::new());
    let orchestrator = Orchestrator::new(
        &base_config(),
        bus.clone(),
        Arc::new(NoAdmin),
        Arc::new(NullThoughtSink),
        Arc::new(AlwaysReplyBackend),
    )
    .unwrap();
    let (_tx, rx) = watch::channel(false);
    orchestrator.initialize(rx).await;

    orchestrator.handle_inbound(inbound("m1", "user-1", "just chatting, no mention here")).await;
    assert_eq!(orchestrator.queue().queue_len("convo"), 1, "not flushed yet — silence timer hasn't elapsed");

    tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
    assert_eq!(orchestrator.queue().total_processed(), 1);
    assert_eq!(bus.sent.lock().await.len(), 1);
}

#[tokio::test]
async fn size_trigger_flushes_as_soon_as_the_queue_fills() {
    let bus = Arc::new(RecordingBus::new());
    let orchestrator = Orchestrator::new(
        &base_config(),
        bus.clone(),
        Arc::new(NoAdmin),
        Arc::new(NullThoughtSink),
        Arc::new(AlwaysReplyBackend),
    )
    .unwrap();
    let (_tx, rx) = watch::channel(false);
    orchestrator.initialize(rx).await;

    for i in 0..3 {
        orchestrator.handle_inbound(inbound(&format!("m{i}"), "user-1", "just chatting")).await;
    }

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(orchestrator.queue().total_processed(), 1, "the third message should hit maxQueueSize and flush immediately");
}

#[tokio::test]
async fn credential_rotation_recovers_from_a_rate_limited_primary_key() {
    let bus = Arc::new(RecordingBus::new());
    let mut config = base_config();
    config.credentials = CredentialsConfig { primary: vec!["bad-key".into(), "good-key".into()], backup: vec![] };
    config.llm.max_attempts = 2;

    let backend = Arc::new(RateLimitUntilCredential { good_credential: "good-key".into(), calls: AtomicU32::new(0) });
    let orchestrator =
        Orchestrator::new(&config, bus.clone(), Arc::new(NoAdmin), Arc::new(NullThoughtSink), backend.clone()).unwrap();
    let (_tx, rx) = watch::channel(false);
    orchestrator.initialize(rx).await;

    orchestrator.handle_inbound(inbound("m1", "user-1", "hey @botty")).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(orchestrator.queue().total_processed(), 1, "rotation should let the second attempt succeed");
    assert_eq!(bus.sent.lock().await.len(), 1);
    assert!(backend.calls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn stamina_critical_drops_the_queue_instead_of_calling_the_llm() {
    let bus = Arc::new(RecordingBus::new());
    let mut config = base_config();
    config.stamina = StaminaConfig { k: 1000.0, alpha: 0.0, beta: 0.0, gamma: 0.0, r: 0.0, ..StaminaConfig::default() };

    let orchestrator = Orchestrator::new(
        &config,
        bus.clone(),
        Arc::new(NoAdmin),
        Arc::new(NullThoughtSink),
        Arc::new(AlwaysReplyBackend),
    )
    .unwrap();
    orchestrator.stamina().consume(1);
    let (_tx, rx) = watch::channel(false);
    orchestrator.initialize(rx).await;

    orchestrator.handle_inbound(inbound("m1", "user-1", "hey @botty")).await;

    assert_eq!(orchestrator.queue().total_processed(), 0);
    assert_eq!(orchestrator.queue().queue_len("convo"), 0, "critical stamina drains rather than retains");
    assert!(bus.sent.lock().await.is_empty());
}
