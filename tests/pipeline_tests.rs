//! End-to-end tests: message files are threaded into a store, a folder TOC
//! tracks the store, and a windowed view is fed by a proxy over a channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tokio::sync::mpsc::UnboundedReceiver;

use mailconv::model::{ConversationId, ConversationSummary, FolderId};
use mailconv::parser::parse_eml;
use mailconv::store::memory::MemoryStore;
use mailconv::store::{ChangeEvent, Store, WriteBatch};
use mailconv::threading::{ingest_message, IngestOutcome};
use mailconv::toc::FolderConversationsToc;
use mailconv::view::{
    ChannelTransport, ConversationListView, Slot, ViewHandle, ViewRequest, WindowedListProxy,
};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("thread")
        .join(name)
}

fn inbox() -> FolderId {
    FolderId::from("INBOX")
}

async fn ingest(store: &MemoryStore, name: &str) -> IngestOutcome {
    let parsed = parse_eml(fixture(name)).unwrap();
    ingest_message(store, &parsed.into_incoming(name, inbox()))
        .await
        .unwrap()
}

/// Deliver every queued view request to the proxy and apply the batches.
async fn pump(
    proxy: &mut WindowedListProxy,
    requests: &mut UnboundedReceiver<ViewRequest>,
    view: &mut ConversationListView,
) {
    while let Ok(request) = requests.try_recv() {
        for batch in proxy.handle_request(request).await.unwrap() {
            view.process_update(batch);
        }
    }
}

async fn open_view(
    store: &Arc<MemoryStore>,
) -> (
    Arc<FolderConversationsToc>,
    WindowedListProxy,
    UnboundedReceiver<ViewRequest>,
    ConversationListView,
) {
    let toc = Arc::new(FolderConversationsToc::new(store.clone(), inbox()));
    let proxy = WindowedListProxy::open(toc.clone(), ViewHandle(1))
        .await
        .unwrap();
    let (transport, requests) = ChannelTransport::new();
    let view = ConversationListView::new(ViewHandle(1), Box::new(transport));
    (toc, proxy, requests, view)
}

fn subjects(view: &ConversationListView) -> Vec<String> {
    view.items()
        .map(|slot| match slot {
            Slot::Loaded(item) => item.item().first_subject().to_string(),
            Slot::Pending(id) => format!("<pending {id}>"),
        })
        .collect()
}

// ─── Threading ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_fixture_messages_thread_together() {
    let store = MemoryStore::new();
    let start = ingest(&store, "01-start.eml").await;
    let reply = ingest(&store, "02-reply.eml").await;
    let lunch = ingest(&store, "03-unrelated.eml").await;
    let followup = ingest(&store, "04-followup.eml").await;

    assert!(!start.resolution.existing_conversation);
    assert!(reply.resolution.existing_conversation);
    assert_eq!(reply.conversation.id, start.conversation.id);
    assert_eq!(followup.conversation.id, start.conversation.id);
    assert_ne!(lunch.conversation.id, start.conversation.id);

    let thread = store.conversation(&start.conversation.id).unwrap();
    assert_eq!(thread.message_count, 3);
    assert_eq!(thread.subject, "Release planning");
    assert_eq!(thread.authors.len(), 2);
    assert_eq!(thread.authors[0].address, "ann@example.com");
    assert_eq!(
        thread.date,
        Utc.with_ymd_and_hms(2024, 10, 9, 8, 30, 0).unwrap()
    );
}

#[tokio::test]
async fn test_bridging_message_records_single_merge() {
    let store = MemoryStore::new();
    let start = ingest(&store, "01-start.eml").await;
    let lunch = ingest(&store, "03-unrelated.eml").await;
    let bridge = ingest(&store, "05-bridge.eml").await;

    assert_eq!(bridge.conversation.id, start.conversation.id);
    let merge = bridge.resolution.deferred_merge.expect("merge recorded");
    assert_eq!(merge.survivor, start.conversation.id);
    assert_eq!(merge.absorbed, vec![lunch.conversation.id.clone()]);
    // The merge is not executed here.
    assert!(store.conversation(&lunch.conversation.id).is_some());
}

// ─── Windowed listing ───────────────────────────────────────────────

#[tokio::test]
async fn test_top_window_materializes_in_date_order() {
    let store = Arc::new(MemoryStore::new());
    for name in ["01-start.eml", "02-reply.eml", "03-unrelated.eml", "04-followup.eml"] {
        ingest(&store, name).await;
    }
    let (_toc, mut proxy, mut requests, mut view) = open_view(&store).await;

    view.seek_top(10).unwrap();
    pump(&mut proxy, &mut requests, &mut view).await;

    assert_eq!(view.total_count(), 2);
    assert_eq!(view.offset(), 0);
    assert!(view.is_complete());
    assert_eq!(subjects(&view), vec!["Release planning", "Lunch on Friday"]);
}

#[tokio::test]
async fn test_new_message_moves_conversation_to_top() {
    let store = Arc::new(MemoryStore::new());
    for name in ["01-start.eml", "02-reply.eml", "03-unrelated.eml"] {
        ingest(&store, name).await;
    }
    let (_toc, mut proxy, mut requests, mut view) = open_view(&store).await;
    view.seek_top(10).unwrap();
    pump(&mut proxy, &mut requests, &mut view).await;
    assert_eq!(subjects(&view), vec!["Lunch on Friday", "Release planning"]);
    let serial = view.serial();

    ingest(&store, "04-followup.eml").await;
    let batches = proxy.flush().await.unwrap();
    assert_eq!(batches.len(), 1);
    let info = view.process_update(batches.into_iter().next().unwrap()).unwrap();

    assert_eq!(subjects(&view), vec!["Release planning", "Lunch on Friday"]);
    assert!(info.item_contents);
    assert!(!info.item_set);
    let moved = view
        .items()
        .find_map(|slot| match slot {
            Slot::Loaded(item) if item.item().header_count() == 3 => Some(item.serial()),
            _ => None,
        })
        .expect("updated conversation");
    assert_eq!(moved, serial + 1);
}

#[tokio::test]
async fn test_focus_survives_removal_of_anchor() {
    let store = Arc::new(MemoryStore::new());
    let start = ingest(&store, "01-start.eml").await;
    ingest(&store, "03-unrelated.eml").await;
    let (_toc, mut proxy, mut requests, mut view) = open_view(&store).await;
    view.seek_top(10).unwrap();
    pump(&mut proxy, &mut requests, &mut view).await;

    // Lunch (Oct 8) is more recent than the release thread (Oct 7).
    let lunch_id = view
        .items()
        .find_map(|slot| match slot {
            Slot::Loaded(item) if item.item().first_subject() == "Lunch on Friday" => {
                Some(item.item().id().clone())
            }
            _ => None,
        })
        .unwrap();
    view.seek_focus(&lunch_id, 0, 0).unwrap();
    pump(&mut proxy, &mut requests, &mut view).await;
    assert_eq!(subjects(&view), vec!["Lunch on Friday"]);

    let mut batch = WriteBatch::default();
    batch.conversations.insert(lunch_id, None);
    store.write(batch).await.unwrap();

    for batch in proxy.flush().await.unwrap() {
        view.process_update(batch);
    }
    assert_eq!(subjects(&view), vec!["Release planning"]);
    assert_eq!(
        view.items().next().map(|slot| match slot {
            Slot::Loaded(item) => item.item().id().clone(),
            Slot::Pending(id) => id.clone(),
        }),
        Some(start.conversation.id)
    );
}

#[tokio::test]
async fn test_stale_batch_after_release_is_dropped() {
    let store = Arc::new(MemoryStore::new());
    ingest(&store, "01-start.eml").await;
    let (toc, mut proxy, mut requests, mut view) = open_view(&store).await;

    view.seek_top(5).unwrap();
    let request = requests.try_recv().unwrap();
    let batches = proxy.handle_request(request).await.unwrap();

    view.release().unwrap();
    for batch in batches {
        assert!(view.process_update(batch).is_none());
    }
    assert!(view.is_empty());
    assert_eq!(view.total_count(), 0);
    assert_eq!(view.serial(), 0);

    pump(&mut proxy, &mut requests, &mut view).await;
    assert!(proxy.is_released());
    assert!(!toc.is_active());
    assert_eq!(store.listener_count(), 0);
}

// ─── TOC ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_toc_scenario_insert_between() {
    let store = Arc::new(MemoryStore::new());
    for (id, secs) in [("A", 5), ("B", 3)] {
        let mut conv = ConversationSummary::new(ConversationId::from(id));
        conv.date = Utc.timestamp_opt(secs, 0).unwrap();
        conv.folder_ids.insert(inbox());
        let mut batch = WriteBatch::default();
        batch.conversations.insert(conv.id.clone(), Some(conv));
        store.write(batch).await.unwrap();
    }
    let toc = FolderConversationsToc::new(store.clone(), inbox());
    toc.acquire().await.unwrap();

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    toc.on_change(Arc::new(move |id: &ConversationId, metadata_only: bool| {
        sink.lock().unwrap().push((id.clone(), metadata_only));
    }));

    toc.apply_change(&ChangeEvent {
        id: ConversationId::from("C"),
        item: None,
        remove_date: None,
        add_date: Some(Utc.timestamp_opt(4, 0).unwrap()),
    });

    let order: Vec<String> = toc
        .slice_ids(0, toc.len())
        .iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(order, vec!["A", "C", "B"]);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(ConversationId::from("C"), false)]
    );
    toc.release().await.unwrap();
}

#[tokio::test]
async fn test_events_during_activation_are_not_lost() {
    let store = Arc::new(MemoryStore::with_latency(std::time::Duration::from_millis(5)));
    ingest(&store, "01-start.eml").await;
    let toc = Arc::new(FolderConversationsToc::new(store.clone(), inbox()));

    let activating = {
        let toc = toc.clone();
        tokio::spawn(async move { toc.acquire().await })
    };
    ingest(&store, "03-unrelated.eml").await;
    activating.await.unwrap().unwrap();

    assert_eq!(toc.len(), 2);
    assert_eq!(store.snapshot_loads(), 1);
}
