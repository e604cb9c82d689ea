use std::collections::HashSet;

use chrono::Utc;
use tracing::instrument;

use pacemaker_core::types::{
    ContextEntry, ContextRole, ContextSummary, InboundMessage, QueuedMessage, StructuredContext,
};

use crate::error::{AssemblerError, Result};
use crate::history::ConversationHistory;

/// C5: transforms a drained batch snapshot into `(mainContent,
/// structuredContext)` and commits it to the in-memory conversation history
/// (spec §4.5).
pub struct BatchAssembler {
    bot_id: String,
    history: ConversationHistory,
}

impl BatchAssembler {
    pub fn new(bot_id: String) -> Self {
        Self {
            bot_id,
            history: ConversationHistory::new(),
        }
    }

    fn to_entry(&self, message: &InboundMessage) -> ContextEntry {
        let role = if message.sender_id.eq_ignore_ascii_case(&self.bot_id) {
            ContextRole::Assistant
        } else {
            ContextRole::User
        };
        ContextEntry {
            message_id: message.id.clone(),
            content: message.content.clone(),
            sender_name: message.sender_display_name.clone().unwrap_or_else(|| message.sender_id.clone()),
            sender_id: message.sender_id.clone(),
            timestamp: message.received_at,
            role,
        }
    }

    /// Produce `mainContent` and `structuredContext` for a drained batch
    /// (spec §4.5), and commit the batch into conversation history.
    #[instrument(skip(self, snapshot))]
    pub fn assemble(&self, conversation_id: &str, snapshot: &[QueuedMessage]) -> Result<(String, StructuredContext)> {
        if snapshot.is_empty() {
            return Err(AssemblerError::EmptyBatch);
        }

        let main_content = snapshot
            .iter()
            .rev()
            .find(|m| m.is_high_priority)
            .or_else(|| snapshot.last())
            .map(|m| m.content.clone())
            .expect("snapshot is non-empty");

        let queue_messages: Vec<ContextEntry> = snapshot.iter().map(|m| self.to_entry(m)).collect();

        let user_count = snapshot
            .iter()
            .map(|m| m.sender_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        let has_high_priority = snapshot.iter().any(|m| m.is_high_priority);
        let earliest = snapshot.iter().map(|m| m.enqueued_at).min().unwrap_or_else(Utc::now);
        let latest = snapshot.iter().map(|m| m.enqueued_at).max().unwrap_or(earliest);
        let timespan_seconds = (latest - earliest).num_seconds().max(0);

        let recent_history = self.history.recent(conversation_id);

        self.history.append(conversation_id, queue_messages.clone());

        let context = StructuredContext {
            summary: ContextSummary {
                message_count: snapshot.len(),
                user_count,
                timespan_seconds,
                has_high_priority,
            },
            queue_messages,
            recent_history,
        };

        Ok((main_content, context))
    }

    /// Commit the final chosen reply text as an assistant-role history entry
    /// (spec §4.5 final paragraph).
    pub fn commit_reply(&self, conversation_id: &str, content: String) {
        self.history.commit_reply(conversation_id, &self.bot_id, content);
    }
}
