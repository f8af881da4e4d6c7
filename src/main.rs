//! CLI entry point for `mailconv`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use mailconv::config::Config;
use mailconv::model::{ConversationSummary, FolderId};
use mailconv::parser::parse_eml;
use mailconv::store::memory::MemoryStore;
use mailconv::threading::{ingest_message, IngestOutcome};
use mailconv::toc::FolderConversationsToc;
use mailconv::view::{
    ChannelTransport, ConversationBatch, ConversationListView, Slot, ViewHandle,
    WindowedListProxy,
};

#[derive(Parser)]
#[command(
    name = "mailconv",
    version,
    about = "Thread messages into conversations and list folder windows"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Thread messages and print the conversation each one joins
    Resolve {
        /// `.eml` files or directories containing them
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Thread messages, then print a window of the folder's conversation list
    List {
        /// `.eml` files or directories containing them
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Folder the messages are filed in
        #[arg(long)]
        folder: Option<String>,
        /// Show the N most recent conversations
        #[arg(long, value_name = "N", conflicts_with_all = ["bottom", "index"])]
        top: Option<usize>,
        /// Show the N oldest conversations
        #[arg(long, value_name = "N", conflicts_with = "index")]
        bottom: Option<usize>,
        /// Center the window on this position
        #[arg(long, value_name = "I")]
        index: Option<usize>,
        /// Rows above the focused position
        #[arg(long, requires = "index")]
        above: Option<usize>,
        /// Rows below the focused position
        #[arg(long, requires = "index")]
        below: Option<usize>,
        #[arg(long)]
        json: bool,
    },
}

/// How the list window is positioned.
enum Window {
    Top(usize),
    Bottom(usize),
    Index {
        index: usize,
        above: usize,
        below: usize,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = mailconv::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Resolve { paths, json } => cmd_resolve(&paths, json, &config).await,
        Commands::List {
            paths,
            folder,
            top,
            bottom,
            index,
            above,
            below,
            json,
        } => {
            let window = match (top, bottom, index) {
                (_, Some(n), _) => Window::Bottom(n),
                (_, _, Some(index)) => Window::Index {
                    index,
                    above: above.unwrap_or(config.view.focus_above),
                    below: below.unwrap_or(config.view.focus_below),
                },
                (Some(n), _, _) => Window::Top(n),
                (None, None, None) => Window::Top(config.view.window_size),
            };
            let folder = folder.unwrap_or_else(|| config.toc.default_folder.clone());
            cmd_list(&paths, FolderId::new(folder), window, json, &config).await
        }
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mailconv::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailconv.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Expand directories into the `.eml` files they contain, sorted by name.
fn collect_message_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("eml")))
                .collect();
            found.sort();
            files.extend(found);
        } else if path.exists() {
            files.push(path.clone());
        } else {
            anyhow::bail!("File not found: {}", path.display());
        }
    }
    Ok(files)
}

/// Parse and thread every message, in order, into `store`.
async fn ingest_files(
    store: &MemoryStore,
    paths: &[PathBuf],
    folder: &FolderId,
) -> anyhow::Result<Vec<(PathBuf, IngestOutcome)>> {
    let files = collect_message_files(paths)?;
    let mut outcomes = Vec::with_capacity(files.len());
    for path in files {
        let parsed = parse_eml(&path)?;
        let umid = path.display().to_string();
        let outcome = ingest_message(store, &parsed.into_incoming(umid, folder.clone())).await?;
        outcomes.push((path, outcome));
    }
    tracing::info!(count = outcomes.len(), folder = %folder, "Ingested messages");
    Ok(outcomes)
}

async fn cmd_resolve(paths: &[PathBuf], json: bool, config: &Config) -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let folder = FolderId::new(config.toc.default_folder.clone());
    let outcomes = ingest_files(&store, paths, &folder).await?;

    if json {
        let rows: Vec<serde_json::Value> = outcomes
            .iter()
            .map(|(path, outcome)| {
                let res = &outcome.resolution;
                serde_json::json!({
                    "file": path.to_string_lossy(),
                    "conversation": res.conversation_id.as_str(),
                    "message": res.full_message_id.to_string(),
                    "existing": res.existing_conversation,
                    "merge": res.deferred_merge.as_ref().map(|m| {
                        m.absorbed.iter().map(|c| c.as_str().to_string()).collect::<Vec<_>>()
                    }),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for (path, outcome) in &outcomes {
        let res = &outcome.resolution;
        let status = if res.existing_conversation { "joined" } else { "new" };
        println!(
            "  {:<40} {} ({})",
            display_name(path),
            res.conversation_id,
            status
        );
        if let Some(merge) = &res.deferred_merge {
            for absorbed in &merge.absorbed {
                println!("  {:<40} also matches {}", "", absorbed);
            }
        }
    }
    Ok(())
}

async fn cmd_list(
    paths: &[PathBuf],
    folder: FolderId,
    window: Window,
    json: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    ingest_files(&store, paths, &folder).await?;

    let toc = Arc::new(FolderConversationsToc::with_cache_size(
        store.clone(),
        folder,
        config.toc.conversation_cache_size,
    ));
    let handle = ViewHandle(1);
    let mut proxy = WindowedListProxy::open(toc, handle).await?;
    let (transport, mut requests) = ChannelTransport::new();
    let mut view = ConversationListView::new(handle, Box::new(transport));

    match window {
        Window::Top(n) => view.seek_top(n)?,
        Window::Bottom(n) => view.seek_bottom(n)?,
        Window::Index {
            index,
            above,
            below,
        } => view.seek_focus_index(index, above, below)?,
    }
    while let Ok(request) = requests.try_recv() {
        let batches = proxy.handle_request(request).await?;
        apply_batches(&mut view, batches);
    }

    if json {
        let rows: Vec<Option<&ConversationSummary>> = view
            .items()
            .map(|slot| match slot {
                Slot::Loaded(item) => Some(item.item().summary()),
                Slot::Pending(_) => None,
            })
            .collect();
        let out = serde_json::json!({
            "offset": view.offset(),
            "total_count": view.total_count(),
            "conversations": rows,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_window(&view);
    }

    view.release()?;
    while let Ok(request) = requests.try_recv() {
        proxy.handle_request(request).await?;
    }
    Ok(())
}

/// Apply provider batches to the view, returning how many took effect.
fn apply_batches(view: &mut ConversationListView, batches: Vec<ConversationBatch>) -> usize {
    let mut applied = 0;
    for batch in batches {
        match view.process_update(batch) {
            Some(info) => {
                applied += 1;
                tracing::debug!(
                    handle = %view.handle(),
                    offset = info.offset,
                    total_count = info.total_count,
                    item_set = info.item_set,
                    item_contents = info.item_contents,
                    "Window updated"
                );
            }
            None => tracing::debug!(handle = %view.handle(), "Batch dropped by released view"),
        }
    }
    applied
}

fn print_window(view: &ConversationListView) {
    println!(
        "  {}-{} of {}",
        view.offset() + usize::from(!view.is_empty()),
        view.offset() + view.len(),
        view.total_count()
    );
    for slot in view.items() {
        match slot {
            Slot::Loaded(item) => {
                let conv = item.item();
                let author = conv
                    .authors()
                    .first()
                    .map(|p| p.display())
                    .unwrap_or_default();
                println!(
                    "  {}  {:<24} {:<40} [{}]",
                    conv.most_recent_message_date().format("%Y-%m-%d %H:%M"),
                    truncate(&author, 24),
                    truncate(conv.first_subject(), 40),
                    conv.header_count()
                );
            }
            Slot::Pending(id) => println!("  {:<16}  (loading {})", "", id),
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailconv::model::ConversationId;
    use std::collections::HashMap;

    fn batch(ids: &[&str]) -> ConversationBatch {
        ConversationBatch {
            offset: 0,
            total_count: ids.len(),
            ids: ids.iter().map(|id| ConversationId::from(*id)).collect(),
            values: HashMap::new(),
        }
    }

    #[test]
    fn test_apply_batches_counts_applied() {
        let (transport, _requests) = ChannelTransport::new();
        let mut view = ConversationListView::new(ViewHandle(1), Box::new(transport));
        assert_eq!(apply_batches(&mut view, vec![batch(&["a", "b"]), batch(&["a"])]), 2);
        assert_eq!(view.total_count(), 1);

        view.release().unwrap();
        assert_eq!(apply_batches(&mut view, vec![batch(&["c"])]), 0);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5).chars().count(), 5);
    }
}
