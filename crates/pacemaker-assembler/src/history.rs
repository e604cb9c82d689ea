use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::Utc;

use pacemaker_core::types::{ContextEntry, ContextRole};

const HISTORY_CAPACITY: usize = 100;
const RECENT_HISTORY_LIMIT: usize = 50;

/// Bounded in-memory per-conversation history. There is no persistence
/// layer (spec §6 Non-goals) — this is the entire replacement for what
/// would otherwise be a `*-memory` crate backed by a database.
pub struct ConversationHistory {
    by_conversation: Mutex<HashMap<String, VecDeque<ContextEntry>>>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self {
            by_conversation: Mutex::new(HashMap::new()),
        }
    }

    /// Up to the most recent 50 prior entries for `conversation_id`, sorted
    /// ascending by time (spec §4.5 `recentHistory`).
    pub fn recent(&self, conversation_id: &str) -> Vec<ContextEntry> {
        let map = self.by_conversation.lock().unwrap();
        match map.get(conversation_id) {
            Some(ring) => ring.iter().rev().take(RECENT_HISTORY_LIMIT).rev().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Append entries, evicting the oldest once the ring exceeds its
    /// 100-entry capacity.
    pub fn append(&self, conversation_id: &str, entries: impl IntoIterator<Item = ContextEntry>) {
        let mut map = self.by_conversation.lock().unwrap();
        let ring = map.entry(conversation_id.to_string()).or_default();
        for entry in entries {
            ring.push_back(entry);
            while ring.len() > HISTORY_CAPACITY {
                ring.pop_front();
            }
        }
    }

    /// Commit the final chosen reply text as an assistant-role entry (spec
    /// §4.5 final paragraph).
    pub fn commit_reply(&self, conversation_id: &str, bot_id: &str, content: String) {
        self.append(
            conversation_id,
            [ContextEntry {
                message_id: uuid::Uuid::new_v4().to_string(),
                content,
                sender_name: bot_id.to_string(),
                sender_id: bot_id.to_string(),
                timestamp: Utc::now(),
                role: ContextRole::Assistant,
            }],
        );
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}
