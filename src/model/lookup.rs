//! Persisted header-id lookup results.

use serde::{Deserialize, Serialize};

use super::ids::{ConversationId, FullMessageId};

/// What the store knows about a [`HeaderId`](super::ids::HeaderId).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum HeaderLookup {
    /// No message with or referencing this header has been seen.
    #[default]
    Unknown,
    /// Referenced by a message in this conversation, but not yet seen itself.
    Resolved(ConversationId),
    /// Every seen message carrying this header as its own `Message-ID`.
    ///
    /// More than one entry happens with resends and duplicated ids.
    Ambiguous(Vec<FullMessageId>),
}

impl HeaderLookup {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Conversation ids this lookup points at, in stored order.
    pub fn conversation_ids(&self) -> Vec<&ConversationId> {
        match self {
            Self::Unknown => Vec::new(),
            Self::Resolved(id) => vec![id],
            Self::Ambiguous(messages) => messages.iter().map(|m| m.conversation_id()).collect(),
        }
    }
}
