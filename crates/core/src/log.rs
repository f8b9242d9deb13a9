//! Conversation Log
//!
//! The ordered, append-only record of everything said in a chat session. It is the
//! single source of truth for what a front-end renders: insertion order is display
//! order, and entries are never removed or reordered. The only mutation allowed
//! after an append is the delivery state of a user entry.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Who wrote a chat entry.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    User,
    Bot,
}

/// How far a user message got on its way to the service.
///
/// `Sent` means the transport accepted the frame. The service never acknowledges
/// queries, so it says nothing about whether the question was received.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Sent,
    Failed,
}

/// A single message in the conversation.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatEntry {
    /// Monotonic sequence number, unique within one log.
    pub id: u64,
    pub text: String,
    pub author: Author,
    pub timestamp: DateTime<Utc>,
    /// Only set for [`Author::User`] entries.
    pub delivery: Option<DeliveryState>,
    /// Context snippets attached to a bot answer.
    pub sources: Vec<String>,
}

/// The append-only conversation log.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    entries: Vec<ChatEntry>,
    next_id: u64,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log that opens with a bot greeting.
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        let mut log = Self::new();
        log.append_bot(greeting, Vec::new());
        log
    }

    /// Appends a user message in the `Pending` delivery state and returns its id.
    pub fn append_user(&mut self, text: impl Into<String>) -> u64 {
        self.push(text.into(), Author::User, Some(DeliveryState::Pending), Vec::new())
    }

    /// Appends a bot answer and returns its id.
    pub fn append_bot(&mut self, text: impl Into<String>, sources: Vec<String>) -> u64 {
        self.push(text.into(), Author::Bot, None, sources)
    }

    /// Marks a user entry as accepted by the transport.
    ///
    /// Returns `false` if `id` is unknown or belongs to a bot entry.
    pub fn mark_delivered(&mut self, id: u64) -> bool {
        self.set_delivery(id, DeliveryState::Sent)
    }

    /// Marks a user entry as abandoned before it could be sent.
    pub fn mark_failed(&mut self, id: u64) -> bool {
        self.set_delivery(id, DeliveryState::Failed)
    }

    pub fn get(&self, id: u64) -> Option<&ChatEntry> {
        // Ids are assigned in insertion order, so the vector is sorted by id.
        self.entries
            .binary_search_by_key(&id, |entry| entry.id)
            .ok()
            .map(|idx| &self.entries[idx])
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(
        &mut self,
        text: String,
        author: Author,
        delivery: Option<DeliveryState>,
        sources: Vec<String>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(ChatEntry {
            id,
            text,
            author,
            timestamp: Utc::now(),
            delivery,
            sources,
        });
        id
    }

    fn set_delivery(&mut self, id: u64, state: DeliveryState) -> bool {
        let Ok(idx) = self.entries.binary_search_by_key(&id, |entry| entry.id) else {
            return false;
        };
        match &mut self.entries[idx].delivery {
            Some(delivery) => {
                *delivery = state;
                true
            }
            None => false,
        }
    }
}
