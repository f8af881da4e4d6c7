//! Client-side conversation items shown in a conversation list view.

use chrono::{DateTime, Utc};

use crate::model::{ConversationId, ConversationSummary, FolderId, OrderingKey, Peep, Tidbit};

use super::windowed::ListItem;

/// A conversation row in a [`WindowedListView`](super::WindowedListView).
///
/// The summary is replaced wholesale on every update; keep no references to
/// its authors or tidbits across updates.
#[derive(Debug, Clone)]
pub struct MailConversation {
    summary: ConversationSummary,
    released: bool,
}

impl MailConversation {
    pub fn id(&self) -> &ConversationId {
        &self.summary.id
    }

    /// Date of the most recent message.
    pub fn most_recent_message_date(&self) -> DateTime<Utc> {
        self.summary.date
    }

    pub fn first_subject(&self) -> &str {
        &self.summary.subject
    }

    /// Unique authors, the originator first.
    pub fn authors(&self) -> &[Peep] {
        &self.summary.authors
    }

    pub fn labels(&self) -> impl Iterator<Item = &FolderId> {
        self.summary.folder_ids.iter()
    }

    pub fn header_count(&self) -> u32 {
        self.summary.message_count
    }

    pub fn snippet_count(&self) -> u32 {
        self.summary.snippet_count
    }

    pub fn message_tidbits(&self) -> &[Tidbit] {
        &self.summary.tidbits
    }

    pub fn has_unread(&self) -> bool {
        self.summary.has_unread
    }

    pub fn has_starred(&self) -> bool {
        self.summary.has_starred
    }

    pub fn has_draft(&self) -> bool {
        self.summary.has_draft
    }

    pub fn has_attachments(&self) -> bool {
        self.summary.has_attachments
    }

    pub fn summary(&self) -> &ConversationSummary {
        &self.summary
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl std::fmt::Display for MailConversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[MailConversation: {}]", self.summary.id)
    }
}

impl ListItem for MailConversation {
    type Id = ConversationId;
    type State = ConversationSummary;

    fn create(state: ConversationSummary) -> Self {
        Self {
            summary: state,
            released: false,
        }
    }

    fn update(&mut self, state: ConversationSummary) -> bool {
        if self.summary == state {
            return false;
        }
        self.summary = state;
        true
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn ordering_key(&self) -> OrderingKey {
        self.summary.ordering_key()
    }
}
