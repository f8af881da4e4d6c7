//! In-memory [`Store`] with a buffered per-folder change feed.
//!
//! Used by the CLI and by tests. Reads and writes may be given an artificial
//! latency so that callers really suspend at store round trips.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::{MailError, Result};
use crate::model::{ConversationId, ConversationSummary, FolderId, HeaderId, HeaderLookup, TocEntry};

use super::{
    lock, ChangeEvent, ChangeHandler, FolderSnapshot, ListenerId, ReadRequest, ReadResult, Store,
    WriteBatch,
};

enum ListenerMode {
    /// Snapshot taken, subscriber not attached yet.
    Buffering(Vec<ChangeEvent>),
    Live(ChangeHandler),
}

struct Listener {
    folder: FolderId,
    mode: ListenerMode,
}

#[derive(Default)]
struct MemoryState {
    header_ids: HashMap<HeaderId, HeaderLookup>,
    conversations: HashMap<ConversationId, ConversationSummary>,
    listeners: HashMap<ListenerId, Listener>,
}

/// A [`Store`] keeping every collection in process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    next_listener: AtomicU64,
    latency: Option<Duration>,
    fail_reads: AtomicBool,
    snapshot_loads: AtomicUsize,
    reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every async operation sleeps for `latency` first.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Make subsequent reads (and snapshot loads) fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of folder snapshots served so far.
    pub fn snapshot_loads(&self) -> usize {
        self.snapshot_loads.load(Ordering::SeqCst)
    }

    /// Number of batched reads served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of attached or buffering listeners.
    pub fn listener_count(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    /// Synchronous peek at a stored conversation.
    pub fn conversation(&self, id: &ConversationId) -> Option<ConversationSummary> {
        lock(&self.state).conversations.get(id).cloned()
    }

    async fn round_trip(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_reads(&self, operation: &'static str) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(MailError::store(operation, "injected read failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read(&self, request: ReadRequest) -> Result<ReadResult> {
        self.round_trip().await;
        self.check_reads("read")?;
        self.reads.fetch_add(1, Ordering::SeqCst);

        let state = lock(&self.state);
        let header_ids = request
            .header_ids
            .into_iter()
            .map(|id| {
                let value = state.header_ids.get(&id).cloned().unwrap_or_default();
                (id, value)
            })
            .collect();
        let conversations = request
            .conversations
            .into_iter()
            .filter_map(|id| state.conversations.get(&id).cloned().map(|c| (id, c)))
            .collect();

        Ok(ReadResult {
            header_ids,
            conversations,
        })
    }

    async fn write(&self, batch: WriteBatch) -> Result<()> {
        self.round_trip().await;

        let mut deliveries: Vec<(ChangeHandler, ChangeEvent)> = Vec::new();
        {
            let mut state = lock(&self.state);
            state.header_ids.extend(batch.header_ids);

            for (id, value) in batch.conversations {
                let old = match &value {
                    Some(summary) => state.conversations.insert(id.clone(), summary.clone()),
                    None => state.conversations.remove(&id),
                };

                for listener in state.listeners.values_mut() {
                    let was_in = old.as_ref().filter(|c| c.in_folder(&listener.folder));
                    let now_in = value.as_ref().filter(|c| c.in_folder(&listener.folder));
                    if was_in.is_none() && now_in.is_none() {
                        continue;
                    }
                    let event = ChangeEvent {
                        id: id.clone(),
                        item: now_in.cloned(),
                        remove_date: was_in.map(|c| c.date),
                        add_date: now_in.map(|c| c.date),
                    };
                    match &mut listener.mode {
                        ListenerMode::Buffering(events) => events.push(event),
                        ListenerMode::Live(handler) => deliveries.push((handler.clone(), event)),
                    }
                }
            }
        }

        // Handlers run outside the lock so they may read from the store.
        for (handler, event) in deliveries {
            trace!(id = %event.id, "Delivering change event");
            handler(&event);
        }
        Ok(())
    }

    async fn load_folder_conversations_and_listen(
        &self,
        folder: &FolderId,
    ) -> Result<FolderSnapshot> {
        self.round_trip().await;
        self.check_reads("snapshot")?;
        self.snapshot_loads.fetch_add(1, Ordering::SeqCst);

        let listener = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        let mut state = lock(&self.state);
        let mut entries: Vec<TocEntry> = state
            .conversations
            .values()
            .filter(|c| c.in_folder(folder))
            .map(ConversationSummary::toc_entry)
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        state.listeners.insert(
            listener,
            Listener {
                folder: folder.clone(),
                mode: ListenerMode::Buffering(Vec::new()),
            },
        );
        debug!(folder = %folder, count = entries.len(), ?listener, "Loaded folder snapshot");

        Ok(FolderSnapshot { entries, listener })
    }

    fn drain_events(&self, listener: ListenerId, handler: ChangeHandler) {
        let buffered = {
            let mut state = lock(&self.state);
            let Some(entry) = state.listeners.get_mut(&listener) else {
                return;
            };
            match std::mem::replace(&mut entry.mode, ListenerMode::Live(handler.clone())) {
                ListenerMode::Buffering(events) => events,
                ListenerMode::Live(_) => Vec::new(),
            }
        };
        debug!(?listener, count = buffered.len(), "Draining buffered events");
        for event in &buffered {
            handler(event);
        }
    }

    fn stop_listening(&self, listener: ListenerId) {
        lock(&self.state).listeners.remove(&listener);
    }
}
