//! Minimal in-process collaborators so the binary is exercisable end-to-end
//! without a real chat platform or model endpoint wired in — the wire-level
//! adapters the spec excludes. Every trait here is the same shape the teacher
//! workspace's own stub/fake providers take (`AlwaysOk`/`AlwaysFail`), just
//! adapted to this core's boundaries.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use pacemaker_core::config::{
    BotIdentity, CredentialsConfig, LlmConfig, PacemakerConfig, SchedulerConfig, StaminaConfig, TaskRunnerConfig,
};
use pacemaker_core::error::PacemakerError;
use pacemaker_core::interfaces::{
    AdminCommand, AdminCommandHandler, BusError, EventBus, LlmBackend, LlmBackendError, LlmCompletion, OutboundRequest,
    ThoughtSink,
};
use pacemaker_core::types::{InboundMessage, MessageKind, ThoughtRecord};
use pacemaker_orchestrator::Orchestrator;

/// Used when no config file is found (spec §10A service wiring).
pub fn demo_config() -> PacemakerConfig {
    PacemakerConfig {
        scheduler: SchedulerConfig { silence_seconds: 8, max_queue_size: 10, max_queue_age_seconds: 30 },
        stamina: StaminaConfig::default(),
        credentials: CredentialsConfig { primary: vec!["demo-key".into()], backup: vec![] },
        llm: LlmConfig::default(),
        tasks: TaskRunnerConfig::default(),
        bot: BotIdentity { bot_id: "pacemaker".into(), bot_name: Some("Pacemaker".into()) },
    }
}

/// Logs every outbound send instead of delivering it anywhere.
pub struct DemoBus;

#[async_trait]
impl EventBus for DemoBus {
    async fn send(&self, request: OutboundRequest) -> Result<(), BusError> {
        match request {
            OutboundRequest::Group { group_id, content, mention } => {
                info!(group_id, mention = ?mention, "outbound> {content}");
            }
            OutboundRequest::Direct { user_id, content } => {
                info!(user_id, "outbound> {content}");
            }
        }
        Ok(())
    }
}

/// Echoes the user's message back wrapped in the decision envelope the
/// client expects, so the pipeline has something deterministic to parse
/// without a real model endpoint.
pub struct DemoLlmBackend;

#[async_trait]
impl LlmBackend for DemoLlmBackend {
    async fn complete(&self, prompt: &str, _credential: &str) -> Result<LlmCompletion, LlmBackendError> {
        let reply = serde_json::json!({
            "messages": [format!("you said: {}", last_line(prompt))],
            "thinking": "demo backend: echoing the prompt",
        });
        Ok(LlmCompletion { text: reply.to_string(), tokens_used: prompt.split_whitespace().count() as u32 })
    }
}

fn last_line(prompt: &str) -> &str {
    prompt.lines().last().unwrap_or(prompt).trim()
}

/// Writes each thought-log entry to the structured log instead of a file.
pub struct DemoThoughtSink;

#[async_trait]
impl ThoughtSink for DemoThoughtSink {
    async fn record(&self, entry: ThoughtRecord) -> Result<(), PacemakerError> {
        info!(memory_type = %entry.memory_type, "thought> {}", entry.content);
        Ok(())
    }
}

/// Treats one fixed sender id as the operator and recognizes the literal
/// admin command vocabulary from spec §6.
pub struct DemoAdmin {
    admin_id: String,
}

impl DemoAdmin {
    pub fn new(admin_id: String) -> Self {
        Self { admin_id }
    }
}

impl AdminCommandHandler for DemoAdmin {
    fn is_admin(&self, sender_id: &str) -> bool {
        sender_id == self.admin_id
    }

    fn parse(&self, content: &str) -> Option<AdminCommand> {
        let mut parts = content.trim().splitn(2, char::is_whitespace);
        match (parts.next()?, parts.next().unwrap_or("").trim()) {
            ("!queue-status", _) => Some(AdminCommand::QueueStatus),
            ("!queue-flush", "") => Some(AdminCommand::QueueFlush { context_id: None }),
            ("!queue-flush", id) => Some(AdminCommand::QueueFlush { context_id: Some(id.to_string()) }),
            ("!queue-clear", _) => Some(AdminCommand::QueueClear),
            ("!stamina-status", _) => Some(AdminCommand::StaminaStatus),
            ("!stamina-rest", "on") => Some(AdminCommand::StaminaRest(true)),
            ("!stamina-rest", "off") => Some(AdminCommand::StaminaRest(false)),
            ("!stamina-set", value) => value.parse::<f64>().ok().map(AdminCommand::StaminaSet),
            ("!apikeys-status", _) => Some(AdminCommand::ApiKeysStatus),
            ("!apikeys-reset", prefix) => Some(AdminCommand::ApiKeysReset { prefix: prefix.to_string() }),
            ("!apikeys-switch", _) => Some(AdminCommand::ApiKeysSwitch),
            ("!start", _) => Some(AdminCommand::Start),
            ("!stop", _) => Some(AdminCommand::Stop),
            _ => None,
        }
    }
}

/// Reads lines from stdin and feeds them in as chat messages from a single
/// demo conversation, so the whole pipeline can be driven interactively.
pub async fn read_stdin_loop(orchestrator: Arc<Orchestrator>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let message = InboundMessage {
                    id: uuid::Uuid::new_v4().to_string(),
                    sender_id: "console-user".into(),
                    sender_display_name: Some("console".into()),
                    conversation_id: "console".into(),
                    group_id: None,
                    content: line,
                    received_at: chrono::Utc::now(),
                    kind: MessageKind::Text,
                };
                orchestrator.handle_inbound(message).await;
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }
}
