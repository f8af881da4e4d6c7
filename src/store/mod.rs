//! Store contract consumed by the resolver and folder tables of contents.
//!
//! The persistent key-value store itself lives outside this crate. It must
//! provide batched reads and writes across named collections, and a per-folder
//! change feed that can be attached without losing events generated while the
//! initial snapshot was being loaded: events are buffered from the moment the
//! snapshot is taken until the subscriber calls [`Store::drain_events`].

pub mod memory;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{ConversationId, ConversationSummary, FolderId, HeaderId, HeaderLookup, TocEntry};

/// Callback invoked for every change event of a folder feed.
pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Identifies one subscription to a folder change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Keys to read, grouped by collection.
#[derive(Debug, Clone, Default)]
pub struct ReadRequest {
    pub header_ids: Vec<HeaderId>,
    pub conversations: Vec<ConversationId>,
}

/// Values read, grouped by collection.
///
/// Every requested header id is present (missing ones as
/// [`HeaderLookup::Unknown`]); conversations that do not exist are absent.
#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    pub header_ids: HashMap<HeaderId, HeaderLookup>,
    pub conversations: HashMap<ConversationId, ConversationSummary>,
}

/// Values to write atomically, grouped by collection.
///
/// A conversation mapped to `None` is deleted.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub header_ids: BTreeMap<HeaderId, HeaderLookup>,
    pub conversations: BTreeMap<ConversationId, Option<ConversationSummary>>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.header_ids.is_empty() && self.conversations.is_empty()
    }
}

/// A positional or metadata change to one conversation of a folder.
///
/// - `remove_date: None, add_date: Some`: added to the folder
/// - `remove_date: Some, add_date: None`: removed from the folder
/// - both `Some` and different: moved
/// - equal: metadata-only
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub id: ConversationId,
    /// The conversation's new state, when it is (still) in the folder.
    pub item: Option<ConversationSummary>,
    pub remove_date: Option<DateTime<Utc>>,
    pub add_date: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    pub fn is_metadata_only(&self) -> bool {
        self.remove_date == self.add_date
    }
}

/// Ordered snapshot of a folder plus the (buffering) listener attached to it.
#[derive(Debug)]
pub struct FolderSnapshot {
    /// Entries sorted by [`OrderingKey`](crate::model::OrderingKey).
    pub entries: Vec<TocEntry>,
    pub listener: ListenerId,
}

/// Asynchronous persistent storage with a per-folder change feed.
#[async_trait]
pub trait Store: Send + Sync {
    /// Batched read across collections in a single round trip.
    async fn read(&self, request: ReadRequest) -> Result<ReadResult>;

    /// Atomic batched write. Change events are emitted after the write lands.
    async fn write(&self, batch: WriteBatch) -> Result<()>;

    /// Load the ordered conversations of `folder` and start buffering its
    /// change events.
    async fn load_folder_conversations_and_listen(&self, folder: &FolderId)
        -> Result<FolderSnapshot>;

    /// Deliver buffered events to `handler`, then route live events to it.
    fn drain_events(&self, listener: ListenerId, handler: ChangeHandler);

    /// Detach a listener; pending buffered events are discarded.
    fn stop_listening(&self, listener: ListenerId);
}

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
