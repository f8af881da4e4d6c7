//! Conversation summaries and the per-message facts folded into them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ConversationId, FolderId};
use super::ordering::{OrderingKey, TocEntry};
use super::peep::Peep;

/// Maximum number of message tidbits kept per conversation.
pub const MAX_TIDBITS: usize = 3;

/// Default height of a conversation row.
pub const DEFAULT_HEIGHT: u32 = 1;

/// Summary of one notable message in a conversation.
///
/// Tidbits are replaced wholesale whenever the conversation changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tidbit {
    pub date: DateTime<Utc>,
    pub is_read: bool,
    pub is_starred: bool,
    pub has_attachments: bool,
    pub author: Peep,
    /// `None` until a snippet has been fetched; empty when none could be derived.
    pub snippet: Option<String>,
}

/// Store-owned summary of a conversation.
///
/// Copies handed out by caches and views are read-only snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    /// Date of the most recent message; drives folder ordering.
    pub date: DateTime<Utc>,
    /// Date of the oldest message; its subject and author lead the summary.
    pub first_date: DateTime<Utc>,
    pub height: u32,
    /// Subject of the message that started the conversation.
    pub subject: String,
    pub message_count: u32,
    pub snippet_count: u32,
    /// Union of the folders / labels of every message.
    pub folder_ids: BTreeSet<FolderId>,
    /// Unique authors, the originator first.
    pub authors: Vec<Peep>,
    /// Most recent messages, newest first, at most [`MAX_TIDBITS`].
    pub tidbits: Vec<Tidbit>,
    pub has_unread: bool,
    pub has_starred: bool,
    pub has_draft: bool,
    pub has_attachments: bool,
}

/// The facts about a single message that a conversation summary aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    /// Unique message id assigned by the sync layer.
    pub umid: String,
    pub date: DateTime<Utc>,
    pub author: Peep,
    pub subject: String,
    pub snippet: Option<String>,
    pub folder_ids: BTreeSet<FolderId>,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_draft: bool,
    pub has_attachments: bool,
}

impl ConversationSummary {
    /// An empty conversation, before any message has been folded in.
    pub fn new(id: ConversationId) -> Self {
        Self {
            id,
            date: DateTime::UNIX_EPOCH,
            first_date: DateTime::UNIX_EPOCH,
            height: DEFAULT_HEIGHT,
            subject: String::new(),
            message_count: 0,
            snippet_count: 0,
            folder_ids: BTreeSet::new(),
            authors: Vec::new(),
            tidbits: Vec::new(),
            has_unread: false,
            has_starred: false,
            has_draft: false,
            has_attachments: false,
        }
    }

    /// Fold a newly threaded message into the summary.
    pub fn apply_message(&mut self, message: &MessageInfo) {
        let first = self.message_count == 0;
        self.message_count += 1;
        if message.snippet.is_some() {
            self.snippet_count += 1;
        }

        if first || message.date > self.date {
            self.date = message.date;
        }

        // A message older than everything seen so far becomes the originator.
        let originates = first || message.date < self.first_date;
        if originates {
            self.first_date = message.date;
            self.subject = message.subject.clone();
        }

        match self.authors.iter().position(|a| a.same_address(&message.author)) {
            Some(idx) if originates => {
                let author = self.authors.remove(idx);
                self.authors.insert(0, author);
            }
            Some(_) => {}
            None if originates => self.authors.insert(0, message.author.clone()),
            None => self.authors.push(message.author.clone()),
        }

        self.folder_ids.extend(message.folder_ids.iter().cloned());

        self.has_unread |= !message.is_read;
        self.has_starred |= message.is_starred;
        self.has_draft |= message.is_draft;
        self.has_attachments |= message.has_attachments;

        self.tidbits.push(Tidbit {
            date: message.date,
            is_read: message.is_read,
            is_starred: message.is_starred,
            has_attachments: message.has_attachments,
            author: message.author.clone(),
            snippet: message.snippet.clone(),
        });
        self.tidbits.sort_by(|a, b| b.date.cmp(&a.date));
        self.tidbits.truncate(MAX_TIDBITS);
    }

    /// Whether the conversation is listed in `folder`.
    pub fn in_folder(&self, folder: &FolderId) -> bool {
        self.folder_ids.contains(folder)
    }

    pub fn ordering_key(&self) -> OrderingKey {
        OrderingKey::new(self.date, self.id.clone())
    }

    pub fn toc_entry(&self) -> TocEntry {
        TocEntry::new(self.ordering_key(), self.height)
    }
}
