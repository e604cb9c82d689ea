use std::collections::HashSet;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether an inbound message is ordinary chat text or an admin/slash command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Command,
}

/// A single chat event as handed to the orchestrator by the external event
/// bus. Immutable after construction — nothing downstream of C8 mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub sender_id: String,
    pub sender_display_name: Option<String>,
    pub conversation_id: String,
    pub group_id: Option<String>,
    pub content: String,
    pub received_at: DateTime<Utc>,
    pub kind: MessageKind,
}

impl InboundMessage {
    /// The logical addressing key: group id, else conversation id, else
    /// sender id (spec §4.4 step 1).
    pub fn context_id(&self) -> &str {
        if let Some(group_id) = self.group_id.as_deref() {
            if !group_id.is_empty() {
                return group_id;
            }
        }
        if !self.conversation_id.is_empty() {
            return &self.conversation_id;
        }
        &self.sender_id
    }
}

/// An [`InboundMessage`] that has passed through C4's ingress and is sitting
/// in a per-context queue. Never mutated once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub message: InboundMessage,
    pub is_high_priority: bool,
    pub enqueued_at: DateTime<Utc>,
}

impl Deref for QueuedMessage {
    type Target = InboundMessage;
    fn deref(&self) -> &InboundMessage {
        &self.message
    }
}

/// The reason a per-context queue was flushed. Carried through to the
/// observability surface and used in boundary tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushReason {
    HighPriority,
    Silence,
    Size,
    Age,
    Manual,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::HighPriority => "high_priority",
            FlushReason::Silence => "silence",
            FlushReason::Size => "size",
            FlushReason::Age => "age",
            FlushReason::Manual => "manual",
        }
    }
}

/// Why a flush did not hand a batch to the assembler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushSkipReason {
    /// A flush is already in progress for this context.
    QueueBusy,
    /// `canReply()` returned false and stamina was not critical.
    StaminaInsufficient,
    /// Global `stop` admin command is active for group contexts.
    GroupProcessingStopped,
    /// The snapshot was empty — nothing to hand off.
    Empty,
}

/// Outcome of a single-context flush attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FlushOutcome {
    Processed {
        context_id: String,
        reason: FlushReason,
        correlated_inbound_ids: Vec<String>,
    },
    NotProcessed {
        context_id: String,
        reason: FlushSkipReason,
    },
}

/// Derived label over `current / S_max`. See spec §4.3 for the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaminaLevel {
    High,
    Medium,
    Low,
    Critical,
}

/// The record held between inbound arrival and outbound dispatch, linking
/// the two so a reply can be routed back to its originating event even
/// though the batch that answers it may contain several inbound ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCorrelation {
    pub inbound_message_id: String,
    pub originating_event: OriginatingEvent,
    pub created_at: DateTime<Utc>,
}

/// Just enough of the originating bus event to address a reply: the
/// conversation/group/sender triple. The bus-specific payload (if any) is
/// opaque to the core and is not modeled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginatingEvent {
    pub conversation_id: String,
    pub group_id: Option<String>,
    pub sender_id: String,
}

impl OriginatingEvent {
    pub fn from_inbound(msg: &InboundMessage) -> Self {
        Self {
            conversation_id: msg.conversation_id.clone(),
            group_id: msg.group_id.clone(),
            sender_id: msg.sender_id.clone(),
        }
    }
}

/// The parsed outcome of an LLM call (spec §3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LlmDecision {
    Reply {
        messages: Vec<String>,
        thinking: String,
        mentions: Option<HashSet<String>>,
    },
    NoReply {
        reason: String,
        thinking: String,
    },
}

/// A full decision envelope: the parsed decision plus the bookkeeping C7
/// needs to correlate it back to inbound events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmDecisionResult {
    pub decision: LlmDecision,
    pub tokens_used: u32,
    /// Explicit correlation hint from the LLM call, if any (spec §4.7 step 1a).
    pub correlated_inbound_ids: Vec<String>,
}

/// Priority with which a [`Task`] is inserted into the runner's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Normal,
    High,
}

/// What kind of side effect a [`Task`] performs. The runner dispatches to a
/// registered handler by kind; the handler owns the actual effect (posting a
/// reply to the bus, appending a thought-log record, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    DeliverReply,
    RecordThought,
}

/// Payload carried by a [`Task`], tagged to match its `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskPayload {
    DeliverReply {
        target: OriginatingEvent,
        content: String,
        mention: Option<String>,
    },
    RecordThought {
        content: String,
        metadata: serde_json::Value,
    },
}

/// A unit of work enqueued into the task runner (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub payload: TaskPayload,
    pub attempts: u32,
    pub max_attempts: u32,
}

impl Task {
    pub fn new(kind: TaskKind, payload: TaskPayload, max_attempts: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            payload,
            attempts: 0,
            max_attempts,
        }
    }
}

/// One line of structured context handed to the LLM client (spec §4.5):
/// either a queued batch entry or a prior-history entry, same shape either
/// way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub message_id: String,
    pub content: String,
    pub sender_name: String,
    pub sender_id: String,
    pub timestamp: DateTime<Utc>,
    pub role: ContextRole,
}

/// `"assistant"` iff `senderId` equals the configured bot identity
/// (case-insensitive), else `"user"` (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextRole {
    Assistant,
    User,
}

/// `summary` field of the structured context (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSummary {
    pub message_count: usize,
    pub user_count: usize,
    pub timespan_seconds: i64,
    pub has_high_priority: bool,
}

/// The full object C5 hands to C2 (spec §4.5): a summary, the queued batch
/// itself, and up to 50 prior messages from the same conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredContext {
    pub summary: ContextSummary,
    pub queue_messages: Vec<ContextEntry>,
    pub recent_history: Vec<ContextEntry>,
}

/// A thought-log record, written append-only by the external `ThoughtSink`
/// collaborator (spec §6, persisted state).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtRecord {
    pub memory_type: String,
    pub content: String,
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}
