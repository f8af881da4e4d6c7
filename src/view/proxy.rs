//! Provider side of a windowed conversation list.
//!
//! A [`WindowedListProxy`] serves one view handle from a folder TOC: it turns
//! seek requests into index ranges, sends the view each conversation's state
//! at most once until that state changes, and re-anchors a focused window
//! when the conversation it was anchored on disappears.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{ConversationId, ConversationSummary, OrderingKey};
use crate::store::lock;
use crate::toc::{FolderConversationsToc, ObserverId};

use super::transport::{SeekMode, SeekRequest, UpdateBatch, ViewHandle, ViewRequest};

pub type ConversationBatch = UpdateBatch<ConversationId, ConversationSummary>;

#[derive(Default)]
struct ProxyState {
    dirty: bool,
    /// Ids whose current state the view holds.
    known: HashSet<ConversationId>,
}

pub struct WindowedListProxy {
    handle: ViewHandle,
    toc: Arc<FolderConversationsToc>,
    observer: Option<ObserverId>,
    state: Arc<Mutex<ProxyState>>,
    request: Option<SeekRequest>,
    /// Anchor of focus-mode windows; follows re-anchoring. A focus-index
    /// seek on an empty list leaves it unset until the list fills.
    focus_key: Option<OrderingKey>,
}

impl WindowedListProxy {
    /// Acquire `toc` and start tracking its changes for `handle`.
    pub async fn open(toc: Arc<FolderConversationsToc>, handle: ViewHandle) -> Result<Self> {
        toc.acquire().await?;
        let state: Arc<Mutex<ProxyState>> = Arc::default();
        let sink = state.clone();
        let observer = toc.on_change(Arc::new(move |id: &ConversationId, metadata_only: bool| {
            let mut state = lock(&sink);
            let was_known = state.known.remove(id);
            if was_known || !metadata_only {
                state.dirty = true;
            }
        }));
        debug!(%handle, folder = %toc.folder_id(), "Proxy opened");
        Ok(Self {
            handle,
            toc,
            observer: Some(observer),
            state,
            request: None,
            focus_key: None,
        })
    }

    pub fn handle(&self) -> ViewHandle {
        self.handle
    }

    pub fn is_released(&self) -> bool {
        self.observer.is_none()
    }

    /// Record a new seek; the next [`flush`](Self::flush) serves it.
    pub fn seek(&mut self, request: SeekRequest) {
        self.focus_key = match request.mode {
            SeekMode::Focus => request.focus_key.clone(),
            SeekMode::Top | SeekMode::Bottom | SeekMode::FocusIndex => None,
        };
        self.request = Some(request);
        self.anchor_requested_index();
        lock(&self.state).dirty = true;
    }

    /// Handle one request from the view, returning the batches to deliver.
    pub async fn handle_request(&mut self, request: ViewRequest) -> Result<Vec<ConversationBatch>> {
        match request {
            ViewRequest::Seek { request, .. } => {
                self.seek(request);
                self.flush().await
            }
            ViewRequest::Cleanup { .. } => {
                self.release().await?;
                Ok(Vec::new())
            }
        }
    }

    /// Produce the update batches owed to the view, if anything changed.
    ///
    /// The first batch carries cached states and placeholders; when some
    /// states had to be read from the store a second batch carries them.
    pub async fn flush(&mut self) -> Result<Vec<ConversationBatch>> {
        if self.is_released() || self.request.is_none() {
            return Ok(Vec::new());
        }
        let known = {
            let mut state = lock(&self.state);
            if !state.dirty {
                return Ok(Vec::new());
            }
            state.dirty = false;
            state.known.clone()
        };

        let (begin, end) = self.window_range();
        let data = self.toc.data_for_range(begin, end, &known);
        let total_count = self.toc.len();
        lock(&self.state).known = data.known.clone();

        let mut batches = vec![UpdateBatch {
            offset: begin,
            total_count,
            ids: data.ids.clone(),
            values: data.cached,
        }];

        if let Some(pending) = data.pending {
            let requested: Vec<ConversationId> = pending.ids().to_vec();
            let fetched: HashMap<ConversationId, ConversationSummary> = match pending.wait().await {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!(handle = %self.handle, error = %e, "Window fetch failed");
                    // The first batch is never delivered, so its cached states
                    // are owed again.
                    let mut state = lock(&self.state);
                    state.known.retain(|id| known.contains(id));
                    state.dirty = true;
                    return Err(e);
                }
            };
            {
                let mut state = lock(&self.state);
                // Ids invalidated while the read was in flight stay unknown.
                if !state.dirty {
                    state.known.extend(fetched.keys().cloned());
                }
            }
            debug!(
                handle = %self.handle,
                requested = requested.len(),
                fetched = fetched.len(),
                "Window fetch completed"
            );
            batches.push(UpdateBatch {
                offset: begin,
                total_count,
                ids: data.ids,
                values: fetched,
            });
        }
        Ok(batches)
    }

    /// Resolve the current request to a clamped `[begin, end)` range.
    fn window_range(&mut self) -> (usize, usize) {
        let len = self.toc.len();
        let Some((mode, above, below)) = self.request.as_ref().map(|r| (r.mode, r.above, r.below))
        else {
            return (0, 0);
        };
        match mode {
            SeekMode::Top => (0, below.min(len)),
            SeekMode::Bottom => (len.saturating_sub(above), len),
            SeekMode::Focus | SeekMode::FocusIndex => {
                match self.anchor_index() {
                    Some(index) => (
                        index.saturating_sub(above),
                        (index + 1 + below).min(len),
                    ),
                    None => (0, 0),
                }
            }
        }
    }

    /// Position of the focus anchor, re-anchoring when it was removed.
    ///
    /// The replacement is the next more recent entry, else the next older.
    fn anchor_index(&mut self) -> Option<usize> {
        self.anchor_requested_index();
        let key = self.focus_key.as_ref()?;
        if let Some(index) = self.toc.index_of(key) {
            return Some(index);
        }
        let insertion = self.toc.find_insertion_index(key);
        let index = insertion.checked_sub(1).unwrap_or(insertion);
        let replacement = self.toc.ordering_key_at(index)?;
        debug!(
            handle = %self.handle,
            from = %key.id,
            to = %replacement.id,
            "Re-anchoring focused window"
        );
        self.focus_key = Some(replacement);
        Some(index)
    }

    /// Pin an unresolved focus-index request to the key now at its index,
    /// clamped to the last entry.
    fn anchor_requested_index(&mut self) {
        if self.focus_key.is_some() {
            return;
        }
        let Some(request) = self.request.as_ref() else {
            return;
        };
        if request.mode != SeekMode::FocusIndex {
            return;
        }
        let last = self.toc.len().saturating_sub(1);
        let index = request.index.unwrap_or(0).min(last);
        self.focus_key = self.toc.ordering_key_at(index);
    }

    /// Stop tracking the TOC and drop this proxy's reference to it.
    pub async fn release(&mut self) -> Result<()> {
        let Some(observer) = self.observer.take() else {
            return Ok(());
        };
        self.toc.remove_observer(observer);
        debug!(handle = %self.handle, "Proxy released");
        self.toc.release().await
    }
}
