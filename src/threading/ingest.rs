//! Single-writer ingestion of newly synchronized messages.

use tracing::debug;

use crate::error::Result;
use crate::model::{ConversationSummary, HeaderId, MessageInfo};
use crate::store::{ReadRequest, Store, WriteBatch};

use super::resolver::{resolve_conversation, ConversationResolution};

/// A message ready to be threaded: its header ids plus summary facts.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub header_id: HeaderId,
    /// `References` followed by `In-Reply-To`, without duplicates.
    pub references: Vec<HeaderId>,
    pub info: MessageInfo,
}

/// What ingesting one message produced.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub resolution: ConversationResolution,
    pub conversation: ConversationSummary,
}

/// Thread `message` into its conversation and persist the result.
///
/// The header-index writes and the updated conversation summary go out in
/// one atomic write, so a failure leaves the store untouched.
pub async fn ingest_message(store: &dyn Store, message: &IncomingMessage) -> Result<IngestOutcome> {
    let resolution = resolve_conversation(
        store,
        &message.references,
        &message.header_id,
        &message.info.umid,
    )
    .await?;

    let existing = if resolution.existing_conversation {
        store
            .read(ReadRequest {
                header_ids: Vec::new(),
                conversations: vec![resolution.conversation_id.clone()],
            })
            .await?
            .conversations
            .remove(&resolution.conversation_id)
    } else {
        None
    };

    let mut conversation = existing
        .unwrap_or_else(|| ConversationSummary::new(resolution.conversation_id.clone()));
    conversation.apply_message(&message.info);

    let mut batch = WriteBatch {
        header_ids: resolution.index_writes.clone(),
        ..WriteBatch::default()
    };
    batch
        .conversations
        .insert(conversation.id.clone(), Some(conversation.clone()));
    store.write(batch).await?;

    debug!(
        umid = %message.info.umid,
        conversation = %conversation.id,
        messages = conversation.message_count,
        "Ingested message"
    );

    Ok(IngestOutcome {
        resolution,
        conversation,
    })
}
