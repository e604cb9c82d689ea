//! Trait boundaries for the external collaborators named in spec §6.
//!
//! None of these are implemented by the core itself beyond a minimal test
//! double — the wire-level event bus decoder, the real LLM HTTP transport
//! selection, the admin command dispatcher, and the thought-log file writer
//! are all out of scope per spec §1. What *is* in scope is the shape of the
//! boundary, so the core can be driven and tested without them.

use async_trait::async_trait;

use crate::types::{InboundMessage, OriginatingEvent, ThoughtRecord};

/// A single outbound send request, mirroring the two shapes the bus accepts
/// (spec §6): a group message with an optional mention, or a direct message.
#[derive(Debug, Clone)]
pub enum OutboundRequest {
    Group {
        group_id: String,
        content: String,
        mention: Option<String>,
    },
    Direct {
        user_id: String,
        content: String,
    },
}

impl OutboundRequest {
    /// Build the correct variant from a reply target and rendered content.
    pub fn for_target(target: &OriginatingEvent, content: String, mention: Option<String>) -> Self {
        match &target.group_id {
            Some(group_id) => OutboundRequest::Group {
                group_id: group_id.clone(),
                content,
                mention,
            },
            None => OutboundRequest::Direct {
                user_id: target.sender_id.clone(),
                content,
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus send failed: {0}")]
    SendFailed(String),
    #[error("bus disconnected")]
    Disconnected,
}

/// The external inbound/outbound event bus (spec §6). The core consumes
/// inbound events and emits outbound send requests; it never implements the
/// wire protocol itself.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Deliver an outbound send request produced by the Task Runner's
    /// `deliver-reply` handler.
    async fn send(&self, request: OutboundRequest) -> Result<(), BusError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmBackendError {
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("credential invalid: {0}")]
    CredentialInvalid(String),
    #[error("transient remote failure: {0}")]
    TransientRemote(String),
}

/// A completed remote-model call: raw text plus a token-count estimate
/// (spec §6 — the LLM backend "accepts a prompt string, returns a text
/// completion plus a token-count estimate").
#[derive(Debug, Clone)]
pub struct LlmCompletion {
    pub text: String,
    pub tokens_used: u32,
}

/// The external LLM backend boundary. A concrete HTTP implementation lives
/// in `pacemaker-llm`, but callers depend on this trait so the client core
/// (retry, credential rotation, parsing) is backend-agnostic.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, prompt: &str, credential: &str) -> Result<LlmCompletion, LlmBackendError>;
}

/// Append-only thought-log sink (spec §6 persisted state). The file-backed
/// NDJSON writer is an external collaborator; this trait is what the
/// `record-thought` task handler calls into.
#[async_trait]
pub trait ThoughtSink: Send + Sync {
    async fn record(&self, entry: ThoughtRecord) -> Result<(), crate::error::PacemakerError>;
}

/// Requests the external admin control surface (spec §6) can issue against
/// the orchestrator. The dispatcher that authenticates an operator and
/// parses their command text into one of these is out of scope; the core
/// only defines what it is prepared to execute once authorized.
#[derive(Debug, Clone)]
pub enum AdminCommand {
    QueueStatus,
    QueueFlush { context_id: Option<String> },
    QueueClear,
    StaminaStatus,
    StaminaRest(bool),
    StaminaSet(f64),
    ApiKeysStatus,
    ApiKeysReset { prefix: String },
    ApiKeysSwitch,
    Start,
    Stop,
}

/// Marker trait implemented by whatever routes admin commands to the
/// orchestrator. Kept separate from `EventBus` because admin commands bypass
/// the queue entirely (spec §4.8).
#[async_trait]
pub trait AdminCommandHandler: Send + Sync {
    /// Return `true` if `sender_id` is the configured admin identity and is
    /// therefore authorized to issue admin commands.
    fn is_admin(&self, sender_id: &str) -> bool;

    /// Parse inbound command text into an [`AdminCommand`], if recognized.
    fn parse(&self, content: &str) -> Option<AdminCommand>;
}

/// Thin marker so orchestrator code can log which inbound message triggered
/// a dispatch without needing the whole `InboundMessage` in scope.
pub fn describe(msg: &InboundMessage) -> String {
    format!("{}@{}", msg.id, msg.context_id())
}
