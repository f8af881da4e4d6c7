//! Folder conversation tables of contents.
//!
//! A [`FolderConversationsToc`] keeps the complete ordered list of a folder's
//! conversations resident while it is acquired: just each conversation's
//! `{ date, id }` ordering key and row height, which is small enough to hold
//! for every synchronized conversation. Once active, every question about the
//! ordering of the list can be answered synchronously; only conversation
//! summaries themselves require (batched) store reads.
//!
//! The resident sequence is mutated only by change events from the store's
//! folder feed, one event at a time, and each event produces exactly one
//! `(id, metadata_only)` notification to the registered observers.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use lru::LruCache;
use tracing::{debug, info, warn};

use crate::error::{MailError, Result};
use crate::model::conversation::DEFAULT_HEIGHT;
use crate::model::{ConversationId, ConversationSummary, FolderId, OrderingKey, TocEntry};
use crate::store::{lock, ChangeEvent, ListenerId, ReadRequest, Store};

/// Default number of conversation summaries kept in the value cache.
pub const DEFAULT_CACHE_SIZE: usize = 256;

/// Callback receiving `(conversation_id, metadata_only)` for every change.
pub type TocObserver = Arc<dyn Fn(&ConversationId, bool) + Send + Sync>;

/// Handle returned by [`FolderConversationsToc::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Location of a height offset within the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetInfo {
    pub index: usize,
    pub key: OrderingKey,
    /// Cumulative height of every entry before this one.
    pub offset_before: u64,
    /// `offset_before` plus this entry's height.
    pub offset_after: u64,
}

/// Result of [`FolderConversationsToc::data_for_range`].
#[derive(Debug)]
pub struct RangeData {
    /// Ids in the range, in list order.
    pub ids: Vec<ConversationId>,
    /// States available synchronously from the value cache.
    pub cached: HashMap<ConversationId, ConversationSummary>,
    /// Ids the consumer knows after this call: reused known ids plus `cached`.
    /// Ids still being fetched are not included.
    pub known: HashSet<ConversationId>,
    /// Batched read for ids neither known nor cached.
    pub pending: Option<PendingFetch>,
}

/// An outstanding batched read of conversation summaries.
///
/// Failures surface only through [`PendingFetch::wait`].
pub struct PendingFetch {
    store: Arc<dyn Store>,
    shared: Weak<TocShared>,
    ids: Vec<ConversationId>,
    /// TOC generation when the fetch was issued.
    generation: u64,
}

impl std::fmt::Debug for PendingFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingFetch").field("ids", &self.ids).finish()
    }
}

impl PendingFetch {
    pub fn ids(&self) -> &[ConversationId] {
        &self.ids
    }

    /// Perform the read and feed the results into the TOC's value cache.
    ///
    /// Conversations deleted in the meantime are simply absent. A result for
    /// a conversation that changed after the fetch was issued is returned but
    /// not cached, since the change event carried fresher state.
    pub async fn wait(self) -> Result<HashMap<ConversationId, ConversationSummary>> {
        let fetched = self
            .store
            .read(ReadRequest {
                header_ids: Vec::new(),
                conversations: self.ids,
            })
            .await?
            .conversations;

        // A TOC released while the read was in flight keeps an empty cache.
        if let Some(shared) = self.shared.upgrade() {
            let mut state = lock(&shared.state);
            if state.active && state.activated_at <= self.generation {
                for (id, summary) in &fetched {
                    if state.changed_since(id, self.generation) {
                        debug!(%id, "Skipping stale fetch result");
                        continue;
                    }
                    state.cache.put(id.clone(), summary.clone());
                }
            }
        }
        Ok(fetched)
    }
}

struct TocState {
    active: bool,
    entries: Vec<TocEntry>,
    cache: LruCache<ConversationId, ConversationSummary>,
    /// Bumped by every applied change and every activation.
    generation: u64,
    activated_at: u64,
    /// Generation of the last change applied to each conversation.
    changed_at: HashMap<ConversationId, u64>,
}

impl TocState {
    fn changed_since(&self, id: &ConversationId, generation: u64) -> bool {
        self.changed_at.get(id).is_some_and(|&at| at > generation)
    }
}

struct TocShared {
    state: Mutex<TocState>,
    observers: Mutex<Vec<(ObserverId, TocObserver)>>,
}

impl TocShared {
    fn apply_change(&self, change: &ChangeEvent) {
        let metadata_only = {
            let mut state = lock(&self.state);
            if !state.active {
                return;
            }
            state.generation += 1;
            let generation = state.generation;
            state.changed_at.insert(change.id.clone(), generation);
            match &change.item {
                Some(item) => {
                    state.cache.put(change.id.clone(), item.clone());
                }
                None => {
                    state.cache.pop(&change.id);
                }
            }

            if change.is_metadata_only() {
                if let (Some(date), Some(item)) = (change.add_date, &change.item) {
                    let key = OrderingKey::new(date, change.id.clone());
                    if let Ok(idx) = state.entries.binary_search_by(|e| e.key.cmp(&key)) {
                        state.entries[idx].height = item.height;
                    }
                }
                true
            } else {
                apply_positional_change(&mut state.entries, change)
            }
        };

        debug!(id = %change.id, metadata_only, "TOC change");
        let observers: Vec<TocObserver> = lock(&self.observers)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(&change.id, metadata_only);
        }
    }
}

/// Remove the old key and insert the new one. Returns whether the
/// conversation ended up where it was (a metadata-only change after all).
fn apply_positional_change(entries: &mut Vec<TocEntry>, change: &ChangeEvent) -> bool {
    let mut old_index = None;
    if let Some(date) = change.remove_date {
        let key = OrderingKey::new(date, change.id.clone());
        match entries.binary_search_by(|e| e.key.cmp(&key)) {
            Ok(idx) => {
                entries.remove(idx);
                old_index = Some(idx);
            }
            Err(_) => {
                warn!(id = %change.id, %date, "Removal of a conversation not in the TOC");
                debug_assert!(false, "removed key missing from TOC: {}", change.id);
            }
        }
    }

    let mut new_index = None;
    if let Some(date) = change.add_date {
        let key = OrderingKey::new(date, change.id.clone());
        let height = change.item.as_ref().map_or(DEFAULT_HEIGHT, |c| c.height);
        match entries.binary_search_by(|e| e.key.cmp(&key)) {
            Ok(idx) => {
                warn!(id = %change.id, %date, "Insertion of a key already in the TOC");
                debug_assert!(false, "duplicate key inserted into TOC: {}", change.id);
                new_index = Some(idx);
            }
            Err(idx) => {
                entries.insert(idx, TocEntry::new(key, height));
                new_index = Some(idx);
            }
        }
    }

    debug_assert!(check_invariants(entries).is_ok(), "{:?}", check_invariants(entries));
    old_index == new_index
}

/// Verify the sequence is strictly sorted and holds each id once.
pub fn check_invariants(entries: &[TocEntry]) -> Result<()> {
    for pair in entries.windows(2) {
        if pair[0].key >= pair[1].key {
            return Err(MailError::IndexInvariant(format!(
                "entries out of order at {} / {}",
                pair[0].id(),
                pair[1].id()
            )));
        }
    }
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.id()) {
            return Err(MailError::IndexInvariant(format!(
                "duplicate conversation {}",
                entry.id()
            )));
        }
    }
    Ok(())
}

#[derive(Default)]
struct Activation {
    ref_count: usize,
    listener: Option<ListenerId>,
}

/// Resident ordered index of the conversations in one folder.
pub struct FolderConversationsToc {
    store: Arc<dyn Store>,
    folder_id: FolderId,
    shared: Arc<TocShared>,
    activation: tokio::sync::Mutex<Activation>,
    next_observer: AtomicU64,
}

impl FolderConversationsToc {
    pub fn new(store: Arc<dyn Store>, folder_id: FolderId) -> Self {
        Self::with_cache_size(store, folder_id, DEFAULT_CACHE_SIZE)
    }

    /// Create an inactive TOC whose value cache holds `cache_size` summaries.
    pub fn with_cache_size(store: Arc<dyn Store>, folder_id: FolderId, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            folder_id,
            shared: Arc::new(TocShared {
                state: Mutex::new(TocState {
                    active: false,
                    entries: Vec::new(),
                    cache: LruCache::new(capacity),
                    generation: 0,
                    activated_at: 0,
                    changed_at: HashMap::new(),
                }),
                observers: Mutex::new(Vec::new()),
            }),
            activation: tokio::sync::Mutex::new(Activation::default()),
            next_observer: AtomicU64::new(0),
        }
    }

    pub fn folder_id(&self) -> &FolderId {
        &self.folder_id
    }

    /// Take a reference, activating the TOC on the first one.
    ///
    /// Activation loads the folder snapshot and attaches to its change feed,
    /// replaying events buffered since the snapshot. Concurrent callers wait
    /// for the in-flight activation instead of starting another.
    pub async fn acquire(&self) -> Result<()> {
        let mut activation = self.activation.lock().await;
        if activation.ref_count == 0 {
            let snapshot = self
                .store
                .load_folder_conversations_and_listen(&self.folder_id)
                .await?;
            {
                let mut state = lock(&self.shared.state);
                debug_assert!(check_invariants(&snapshot.entries).is_ok());
                state.entries = snapshot.entries;
                state.active = true;
                state.generation += 1;
                state.activated_at = state.generation;
                info!(folder = %self.folder_id, count = state.entries.len(), "TOC activated");
            }

            let shared = Arc::downgrade(&self.shared);
            self.store.drain_events(
                snapshot.listener,
                Arc::new(move |change: &ChangeEvent| {
                    if let Some(shared) = shared.upgrade() {
                        shared.apply_change(change);
                    }
                }),
            );
            activation.listener = Some(snapshot.listener);
        }
        activation.ref_count += 1;
        Ok(())
    }

    /// Drop a reference, deactivating the TOC on the last one.
    pub async fn release(&self) -> Result<()> {
        let mut activation = self.activation.lock().await;
        match activation.ref_count {
            0 => {
                return Err(MailError::ContractViolation(format!(
                    "release of inactive TOC for folder {}",
                    self.folder_id
                )))
            }
            1 => {
                if let Some(listener) = activation.listener.take() {
                    self.store.stop_listening(listener);
                }
                let mut state = lock(&self.shared.state);
                state.active = false;
                state.entries = Vec::new();
                state.cache.clear();
                state.changed_at.clear();
                info!(folder = %self.folder_id, "TOC deactivated");
            }
            _ => {}
        }
        activation.ref_count -= 1;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        lock(&self.shared.state).active
    }

    pub fn len(&self) -> usize {
        lock(&self.shared.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply one change event from the store's folder feed.
    pub fn apply_change(&self, change: &ChangeEvent) {
        self.shared.apply_change(change);
    }

    /// Register an observer; it is called synchronously, in registration order.
    pub fn on_change(&self, observer: TocObserver) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::SeqCst));
        lock(&self.shared.observers).push((id, observer));
        id
    }

    pub fn remove_observer(&self, id: ObserverId) {
        lock(&self.shared.observers).retain(|(observer_id, _)| *observer_id != id);
    }

    /// Ids occupying positions `[begin, end)`, clamped to the list.
    pub fn slice_ids(&self, begin: usize, end: usize) -> Vec<ConversationId> {
        let state = lock(&self.shared.state);
        let end = end.min(state.entries.len());
        let begin = begin.min(end);
        state.entries[begin..end]
            .iter()
            .map(|e| e.id().clone())
            .collect()
    }

    pub fn ordering_key_at(&self, index: usize) -> Option<OrderingKey> {
        lock(&self.shared.state)
            .entries
            .get(index)
            .map(|e| e.key.clone())
    }

    /// Position at which `key` is, or would be inserted.
    pub fn find_insertion_index(&self, key: &OrderingKey) -> usize {
        match lock(&self.shared.state)
            .entries
            .binary_search_by(|e| e.key.cmp(key))
        {
            Ok(idx) | Err(idx) => idx,
        }
    }

    /// Exact position of `key`, if resident.
    pub fn index_of(&self, key: &OrderingKey) -> Option<usize> {
        lock(&self.shared.state)
            .entries
            .binary_search_by(|e| e.key.cmp(key))
            .ok()
    }

    /// Sum of all entry heights.
    pub fn total_height(&self) -> u64 {
        lock(&self.shared.state)
            .entries
            .iter()
            .map(|e| u64::from(e.height))
            .sum()
    }

    /// Find the entry whose height span contains `desired_offset`.
    ///
    /// Offsets past the end map to the last entry. This is a linear scan from
    /// the front, which is fine for resident folder sizes.
    pub fn offset_info(&self, desired_offset: u64) -> Option<OffsetInfo> {
        let state = lock(&self.shared.state);
        let last = state.entries.len().checked_sub(1)?;
        let mut before = 0u64;
        for (index, entry) in state.entries.iter().enumerate() {
            let after = before + u64::from(entry.height);
            if desired_offset < after || index == last {
                return Some(OffsetInfo {
                    index,
                    key: entry.key.clone(),
                    offset_before: before,
                    offset_after: after,
                });
            }
            before = after;
        }
        None
    }

    /// Partition the ids in `[begin, end)` into known, cached and to-fetch.
    ///
    /// Never blocks: ids needing a read are returned as a [`PendingFetch`].
    pub fn data_for_range(
        &self,
        begin: usize,
        end: usize,
        already_known: &HashSet<ConversationId>,
    ) -> RangeData {
        let mut state = lock(&self.shared.state);
        let end = end.min(state.entries.len());
        let begin = begin.min(end);
        let ids: Vec<ConversationId> = state.entries[begin..end]
            .iter()
            .map(|e| e.id().clone())
            .collect();

        let mut cached = HashMap::new();
        let mut known = HashSet::new();
        let mut need = Vec::new();
        for id in &ids {
            if already_known.contains(id) {
                known.insert(id.clone());
            } else if let Some(summary) = state.cache.get(id) {
                known.insert(id.clone());
                cached.insert(id.clone(), summary.clone());
            } else {
                need.push(id.clone());
            }
        }

        let pending = (!need.is_empty()).then(|| PendingFetch {
            store: self.store.clone(),
            shared: Arc::downgrade(&self.shared),
            ids: need,
            generation: state.generation,
        });

        RangeData {
            ids,
            cached,
            known,
            pending,
        }
    }
}
