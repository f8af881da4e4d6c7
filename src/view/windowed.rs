//! Windowed list view: a bounded, observable window over a large ordered list.
//!
//! The view never computes its own contents. Seeks only send a request to the
//! provider; the window changes when the provider's [`UpdateBatch`] is passed
//! to [`WindowedListView::process_update`], which applies it atomically and
//! emits exactly one change notification. Items carry the serial of the batch
//! that last constructed or updated them, so consumers can find what changed
//! by comparing against [`WindowedListView::serial`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use tracing::{debug, warn};

use crate::error::{MailError, Result};
use crate::model::OrderingKey;

use super::transport::{SeekRequest, UpdateBatch, ViewHandle, ViewRequest, ViewTransport};

/// An item type a [`WindowedListView`] can materialize.
pub trait ListItem: Sized {
    type Id: Clone + Eq + Hash + Debug;
    type State;

    fn create(state: Self::State) -> Self;

    /// Apply new state, returning whether anything changed.
    fn update(&mut self, state: Self::State) -> bool;

    /// Called once when the item leaves the view.
    fn release(&mut self);

    fn ordering_key(&self) -> OrderingKey;
}

/// A materialized item and the serial of the batch that last touched it.
#[derive(Debug)]
pub struct WindowedItem<T> {
    serial: u64,
    item: T,
}

impl<T> WindowedItem<T> {
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn item(&self) -> &T {
        &self.item
    }
}

/// One position of the window.
#[derive(Debug)]
pub enum Slot<'a, T: ListItem> {
    Loaded(&'a WindowedItem<T>),
    /// Id known, state not delivered yet.
    Pending(&'a T::Id),
}

/// Flags describing what one applied batch changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeekChangeInfo {
    pub offset: bool,
    pub total_count: bool,
    /// Window length changed, an item was constructed, or one was released.
    pub item_set: bool,
    /// At least one existing item was updated in place.
    pub item_contents: bool,
}

pub type SeekObserver = Box<dyn FnMut(&SeekChangeInfo)>;

pub struct WindowedListView<T: ListItem> {
    handle: ViewHandle,
    transport: Box<dyn ViewTransport>,
    offset: usize,
    total_count: usize,
    items: Vec<T::Id>,
    items_by_id: HashMap<T::Id, WindowedItem<T>>,
    serial: u64,
    complete: bool,
    released: bool,
    observers: Vec<SeekObserver>,
}

impl<T: ListItem> WindowedListView<T> {
    pub fn new(handle: ViewHandle, transport: Box<dyn ViewTransport>) -> Self {
        Self {
            handle,
            transport,
            offset: 0,
            total_count: 0,
            items: Vec::new(),
            items_by_id: HashMap::new(),
            serial: 0,
            complete: false,
            released: false,
            observers: Vec::new(),
        }
    }

    pub fn handle(&self) -> ViewHandle {
        self.handle
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// True once a batch has been applied with every slot materialized.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn at_top(&self) -> bool {
        self.offset == 0
    }

    pub fn at_bottom(&self) -> bool {
        self.offset + self.items.len() >= self.total_count
    }

    pub fn items(&self) -> impl Iterator<Item = Slot<'_, T>> {
        self.items.iter().map(|id| match self.items_by_id.get(id) {
            Some(item) => Slot::Loaded(item),
            None => Slot::Pending(id),
        })
    }

    pub fn get(&self, id: &T::Id) -> Option<&WindowedItem<T>> {
        self.items_by_id.get(id)
    }

    /// Register an observer for change notifications.
    pub fn on_seeked(&mut self, observer: SeekObserver) {
        self.observers.push(observer);
    }

    pub fn seek_top(&self, count: usize) -> Result<()> {
        self.send_seek(SeekRequest::top(count))
    }

    pub fn seek_bottom(&self, count: usize) -> Result<()> {
        self.send_seek(SeekRequest::bottom(count))
    }

    /// Anchor the window on a materialized item of the current window.
    pub fn seek_focus(&self, id: &T::Id, above: usize, below: usize) -> Result<()> {
        let item = self.items_by_id.get(id).ok_or_else(|| {
            MailError::ContractViolation(format!("focus on {id:?}, which is not in {}", self.handle))
        })?;
        self.send_seek(SeekRequest::focus(item.item.ordering_key(), above, below))
    }

    pub fn seek_focus_index(&self, index: usize, above: usize, below: usize) -> Result<()> {
        self.send_seek(SeekRequest::focus_index(index, above, below))
    }

    fn send_seek(&self, request: SeekRequest) -> Result<()> {
        if self.released {
            return Err(MailError::ContractViolation(format!(
                "seek on released {}",
                self.handle
            )));
        }
        debug!(handle = %self.handle, mode = ?request.mode, "Seek requested");
        self.transport.send(ViewRequest::Seek {
            handle: self.handle,
            request,
        })
    }

    /// Apply one provider batch. Returns `None` (and changes nothing) once
    /// the view has been released.
    pub fn process_update(
        &mut self,
        batch: UpdateBatch<T::Id, T::State>,
    ) -> Option<SeekChangeInfo> {
        if self.released {
            warn!(handle = %self.handle, "Dropping update for released view");
            return None;
        }

        self.serial += 1;
        let serial = self.serial;
        let UpdateBatch {
            offset,
            total_count,
            ids,
            mut values,
        } = batch;

        let mut previous = std::mem::take(&mut self.items_by_id);
        let mut current = HashMap::with_capacity(ids.len());
        let mut item_set = ids.len() != self.items.len();
        let mut item_contents = false;

        for id in &ids {
            let state = values.remove(id);
            match (previous.remove(id), state) {
                (Some(mut existing), Some(state)) => {
                    if existing.item.update(state) {
                        existing.serial = serial;
                        item_contents = true;
                    }
                    current.insert(id.clone(), existing);
                }
                (Some(existing), None) => {
                    current.insert(id.clone(), existing);
                }
                (None, Some(state)) => {
                    item_set = true;
                    current.insert(
                        id.clone(),
                        WindowedItem {
                            serial,
                            item: T::create(state),
                        },
                    );
                }
                (None, None) => {}
            }
        }

        for (_, mut dead) in previous {
            item_set = true;
            dead.item.release();
        }

        let info = SeekChangeInfo {
            offset: offset != self.offset,
            total_count: total_count != self.total_count,
            item_set,
            item_contents,
        };
        if !self.complete && ids.iter().all(|id| current.contains_key(id)) {
            self.complete = true;
        }
        self.offset = offset;
        self.total_count = total_count;
        self.items = ids;
        self.items_by_id = current;

        debug!(
            handle = %self.handle,
            serial,
            offset,
            total_count,
            len = self.items.len(),
            "Applied update"
        );
        for observer in &mut self.observers {
            observer(&info);
        }
        Some(info)
    }

    /// Tell the provider to drop this view and release every item.
    ///
    /// Later batches are ignored. Releasing twice is a no-op.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let sent = self.transport.send(ViewRequest::Cleanup {
            handle: self.handle,
        });
        for (_, mut item) in self.items_by_id.drain() {
            item.item.release();
        }
        self.items.clear();
        debug!(handle = %self.handle, "View released");
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConversationId;
    use crate::view::transport::{ChannelTransport, SeekMode};
    use chrono::{TimeZone, Utc};
    use std::cell::Cell;
    use std::rc::Rc;
    use tokio::sync::mpsc::UnboundedReceiver;

    thread_local! {
        static CREATED: Cell<usize> = const { Cell::new(0) };
        static RELEASED: Cell<usize> = const { Cell::new(0) };
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: String,
        date: i64,
        label: String,
    }

    #[derive(Debug)]
    struct RowItem {
        row: Row,
    }

    impl ListItem for RowItem {
        type Id = String;
        type State = Row;

        fn create(state: Row) -> Self {
            CREATED.with(|c| c.set(c.get() + 1));
            Self { row: state }
        }

        fn update(&mut self, state: Row) -> bool {
            if self.row == state {
                return false;
            }
            self.row = state;
            true
        }

        fn release(&mut self) {
            RELEASED.with(|c| c.set(c.get() + 1));
        }

        fn ordering_key(&self) -> OrderingKey {
            OrderingKey::new(
                Utc.timestamp_opt(self.row.date, 0).unwrap(),
                ConversationId::new(self.row.id.clone()),
            )
        }
    }

    fn row(id: &str, date: i64) -> Row {
        Row {
            id: id.to_string(),
            date,
            label: format!("row {id}"),
        }
    }

    fn batch(offset: usize, total: usize, ids: &[&str], rows: &[Row]) -> UpdateBatch<String, Row> {
        UpdateBatch {
            offset,
            total_count: total,
            ids: ids.iter().map(|s| s.to_string()).collect(),
            values: rows.iter().map(|r| (r.id.clone(), r.clone())).collect(),
        }
    }

    fn view() -> (WindowedListView<RowItem>, UnboundedReceiver<ViewRequest>) {
        let (transport, rx) = ChannelTransport::new();
        (WindowedListView::new(ViewHandle(1), Box::new(transport)), rx)
    }

    fn created() -> usize {
        CREATED.with(Cell::get)
    }

    fn released() -> usize {
        RELEASED.with(Cell::get)
    }

    #[test]
    fn test_seek_top_short_list() {
        let (mut view, mut rx) = view();
        view.seek_top(10).unwrap();
        match rx.try_recv().unwrap() {
            ViewRequest::Seek { request, .. } => {
                assert_eq!(request.mode, SeekMode::Top);
                assert_eq!(request.below, 10);
            }
            other => panic!("unexpected request {other:?}"),
        }

        let info = view
            .process_update(batch(0, 3, &["a", "b", "c"], &[row("a", 3), row("b", 2), row("c", 1)]))
            .unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.offset(), 0);
        assert!(view.at_top() && view.at_bottom());
        assert!(view.is_complete());
        assert!(info.item_set && info.total_count && !info.offset);
    }

    #[test]
    fn test_reapplying_batch_is_idempotent() {
        let (mut view, _rx) = view();
        let first = batch(0, 2, &["a", "b"], &[row("a", 2), row("b", 1)]);
        view.process_update(first.clone()).unwrap();
        let constructed = created();
        let serial_before = view.get(&"a".to_string()).unwrap().serial();

        let info = view.process_update(first).unwrap();
        assert_eq!(view.serial(), 2);
        assert_eq!(created(), constructed);
        assert!(!info.item_set && !info.item_contents);
        assert_eq!(view.get(&"a".to_string()).unwrap().serial(), serial_before);
    }

    #[test]
    fn test_changed_state_updates_in_place() {
        let (mut view, _rx) = view();
        view.process_update(batch(0, 2, &["a", "b"], &[row("a", 2), row("b", 1)]))
            .unwrap();
        let constructed = created();

        let mut renamed = row("b", 1);
        renamed.label = "renamed".to_string();
        let info = view
            .process_update(batch(0, 2, &["a", "b"], &[renamed]))
            .unwrap();
        assert!(info.item_contents);
        assert!(!info.item_set);
        assert_eq!(created(), constructed);
        let b = view.get(&"b".to_string()).unwrap();
        assert_eq!(b.serial(), view.serial());
        assert_eq!(b.item().row.label, "renamed");
        assert_eq!(view.get(&"a".to_string()).unwrap().serial(), 1);
    }

    #[test]
    fn test_placeholder_then_materialized() {
        let (mut view, _rx) = view();
        view.process_update(batch(0, 2, &["a", "b"], &[row("a", 2)]))
            .unwrap();
        assert!(!view.is_complete());
        let slots: Vec<bool> = view
            .items()
            .map(|slot| matches!(slot, Slot::Loaded(_)))
            .collect();
        assert_eq!(slots, vec![true, false]);

        let info = view
            .process_update(batch(0, 2, &["a", "b"], &[row("b", 1)]))
            .unwrap();
        assert!(info.item_set);
        assert!(view.is_complete());
    }

    #[test]
    fn test_removed_items_are_released() {
        let (mut view, _rx) = view();
        view.process_update(batch(0, 3, &["a", "b", "c"], &[row("a", 3), row("b", 2), row("c", 1)]))
            .unwrap();
        let before = released();

        let info = view
            .process_update(batch(1, 2, &["b", "c"], &[]))
            .unwrap();
        assert_eq!(released(), before + 1);
        assert!(info.item_set && info.offset && info.total_count);
        assert!(view.get(&"a".to_string()).is_none());
        assert!(!view.at_top());
    }

    #[test]
    fn test_release_drops_late_batches() {
        let (mut view, mut rx) = view();
        view.process_update(batch(0, 2, &["a", "b"], &[row("a", 2), row("b", 1)]))
            .unwrap();
        let before = released();

        view.release().unwrap();
        assert_eq!(released(), before + 2);
        assert!(matches!(rx.try_recv().unwrap(), ViewRequest::Cleanup { .. }));

        let serial = view.serial();
        assert!(view
            .process_update(batch(5, 9, &["x"], &[row("x", 9)]))
            .is_none());
        assert_eq!(view.serial(), serial);
        assert_eq!(view.offset(), 0);
        assert_eq!(view.total_count(), 2);
        assert!(view.is_empty());

        // Second release sends nothing.
        view.release().unwrap();
        assert!(rx.try_recv().is_err());
        assert!(view.seek_top(5).is_err());
    }

    #[test]
    fn test_seek_focus_requires_present_item() {
        let (mut view, mut rx) = view();
        view.process_update(batch(0, 2, &["a", "b"], &[row("a", 2)]))
            .unwrap();

        let err = view.seek_focus(&"b".to_string(), 1, 1).unwrap_err();
        assert!(matches!(err, MailError::ContractViolation(_)));
        assert!(view.seek_focus(&"zz".to_string(), 1, 1).is_err());
        assert!(rx.try_recv().is_err());

        view.seek_focus(&"a".to_string(), 2, 3).unwrap();
        match rx.try_recv().unwrap() {
            ViewRequest::Seek { request, .. } => {
                assert_eq!(request.mode, SeekMode::Focus);
                let key = request.focus_key.unwrap();
                assert_eq!(key.id, ConversationId::from("a"));
                assert_eq!((request.above, request.below), (2, 3));
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_one_notification_per_batch() {
        let (mut view, _rx) = view();
        let seen: Rc<Cell<usize>> = Rc::default();
        let sink = seen.clone();
        view.on_seeked(Box::new(move |_: &SeekChangeInfo| sink.set(sink.get() + 1)));

        view.process_update(batch(0, 3, &["a", "b", "c"], &[row("a", 3)]))
            .unwrap();
        view.process_update(batch(0, 3, &["a", "b", "c"], &[row("b", 2), row("c", 1)]))
            .unwrap();
        assert_eq!(seen.get(), 2);
    }
}
