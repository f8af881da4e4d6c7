use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};

use mailconv::model::{ConversationId, ConversationSummary, FolderId};
use mailconv::store::memory::MemoryStore;
use mailconv::store::{ChangeEvent, Store, WriteBatch};
use mailconv::toc::FolderConversationsToc;

const CONVERSATIONS: i64 = 10_000;

fn populated_toc(runtime: &tokio::runtime::Runtime) -> FolderConversationsToc {
    runtime.block_on(async {
        let store = Arc::new(MemoryStore::new());
        let mut batch = WriteBatch::default();
        for n in 0..CONVERSATIONS {
            let mut conv = ConversationSummary::new(ConversationId::new(format!("c{n:05}")));
            conv.date = Utc.timestamp_opt(n * 60, 0).unwrap();
            conv.folder_ids.insert(FolderId::from("INBOX"));
            batch.conversations.insert(conv.id.clone(), Some(conv));
        }
        store.write(batch).await.unwrap();

        let toc = FolderConversationsToc::new(store, FolderId::from("INBOX"));
        toc.acquire().await.unwrap();
        toc
    })
}

fn bench_apply_change(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let toc = populated_toc(&runtime);
    let id = ConversationId::new("c00000");
    let oldest = Utc.timestamp_opt(0, 0).unwrap();
    let newest = Utc.timestamp_opt(CONVERSATIONS * 60, 0).unwrap();

    // Move the oldest conversation to the top and back again.
    c.bench_function("toc_move_to_top_and_back", |b| {
        b.iter(|| {
            toc.apply_change(&ChangeEvent {
                id: id.clone(),
                item: None,
                remove_date: Some(oldest),
                add_date: Some(newest),
            });
            toc.apply_change(&ChangeEvent {
                id: id.clone(),
                item: None,
                remove_date: Some(newest),
                add_date: Some(oldest),
            });
        })
    });
}

fn bench_queries(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let toc = populated_toc(&runtime);
    let known = HashSet::new();

    c.bench_function("toc_offset_info_middle", |b| {
        b.iter(|| toc.offset_info(CONVERSATIONS as u64 / 2))
    });
    c.bench_function("toc_data_for_range_window", |b| {
        b.iter(|| toc.data_for_range(5_000, 5_050, &known).ids.len())
    });
}

criterion_group!(benches, bench_apply_change, bench_queries);
criterion_main!(benches);
