//! Ordering keys and table-of-contents entries for folder conversation lists.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ConversationId;

/// Composite `{ date, id }` key ordering conversations within a folder.
///
/// Most recent first; ties are broken by conversation id so the order is
/// total and deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderingKey {
    /// Date of the most recent message in the conversation.
    pub date: DateTime<Utc>,
    pub id: ConversationId,
}

impl OrderingKey {
    pub fn new(date: DateTime<Utc>, id: ConversationId) -> Self {
        Self { date, id }
    }
}

impl Ord for OrderingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .date
            .cmp(&self.date)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for OrderingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One resident row of a folder table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub key: OrderingKey,
    /// Caller-defined weight (e.g. rendered row count) used for offset math.
    pub height: u32,
}

impl TocEntry {
    pub fn new(key: OrderingKey, height: u32) -> Self {
        Self { key, height }
    }

    pub fn id(&self) -> &ConversationId {
        &self.key.id
    }
}
