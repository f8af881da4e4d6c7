//! Message threading: conversation resolution and ingestion.

pub mod ingest;
pub mod resolver;

pub use ingest::{ingest_message, IncomingMessage, IngestOutcome};
pub use resolver::{resolve_conversation, ConversationResolution, DeferredMerge};
