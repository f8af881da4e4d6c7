//! Conversation resolution for incoming messages.
//!
//! Given the header ids a message references and its own `Message-ID`, look
//! them all up in the store and decide which conversation the message joins.
//! The result includes the header-index writes the caller must persist
//! together with the message, so that later messages referencing this one
//! (or sharing its references) resolve to the same conversation.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error::Result;
use crate::model::{ConversationId, FullMessageId, HeaderId, HeaderLookup};
use crate::store::{ReadRequest, Store};

/// Two or more conversations found to be one thread.
///
/// Executing the merge is the job of a follow-up unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredMerge {
    /// The conversation the message was assigned to.
    pub survivor: ConversationId,
    /// Conversations to be folded into `survivor`.
    pub absorbed: Vec<ConversationId>,
}

/// Outcome of resolving one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationResolution {
    pub conversation_id: ConversationId,
    /// `false` when `conversation_id` was freshly minted for this message.
    pub existing_conversation: bool,
    pub full_message_id: FullMessageId,
    /// Header-index entries to persist alongside the message.
    pub index_writes: BTreeMap<HeaderId, HeaderLookup>,
    pub deferred_merge: Option<DeferredMerge>,
}

/// Resolve the conversation of the message `umid`.
///
/// `references` should list the `References` chain (and `In-Reply-To`) in
/// header order. The store is read exactly once; a read failure aborts the
/// resolution. Nothing is written.
pub async fn resolve_conversation(
    store: &dyn Store,
    references: &[HeaderId],
    own_header_id: &HeaderId,
    umid: &str,
) -> Result<ConversationResolution> {
    // Step 1: candidate set in first-seen order, own header last.
    let mut candidates: Vec<HeaderId> = Vec::with_capacity(references.len() + 1);
    for id in references.iter().chain(std::iter::once(own_header_id)) {
        if !id.is_empty() && !candidates.contains(id) {
            candidates.push(id.clone());
        }
    }

    let mut found = store
        .read(ReadRequest {
            header_ids: candidates.clone(),
            conversations: Vec::new(),
        })
        .await?
        .header_ids;

    // Step 2: distinct conversation ids, in read order.
    let mut conversation_ids: Vec<ConversationId> = Vec::new();
    let mut lookups: Vec<(HeaderId, HeaderLookup)> = Vec::with_capacity(candidates.len());
    for id in candidates {
        let lookup = found.remove(&id).unwrap_or_default();
        for conv in lookup.conversation_ids() {
            if !conversation_ids.contains(conv) {
                conversation_ids.push(conv.clone());
            }
        }
        lookups.push((id, lookup));
    }

    // Step 3: pick the conversation.
    let mut survivors = conversation_ids.into_iter();
    let (conversation_id, existing_conversation) = match survivors.next() {
        None => (ConversationId::from_umid(umid), false),
        Some(first) => (first, true),
    };
    let absorbed: Vec<ConversationId> = survivors.collect();
    let deferred_merge = if absorbed.is_empty() {
        None
    } else {
        info!(
            survivor = %conversation_id,
            absorbed = absorbed.len(),
            "Message joins several conversations; merge deferred"
        );
        Some(DeferredMerge {
            survivor: conversation_id.clone(),
            absorbed,
        })
    };

    // Step 4
    let full_message_id = FullMessageId::new(&conversation_id, umid);

    // Step 5: index writes.
    let mut index_writes = BTreeMap::new();
    for (id, lookup) in lookups {
        if &id == own_header_id {
            let mut messages = match lookup {
                HeaderLookup::Ambiguous(messages) => messages,
                HeaderLookup::Unknown | HeaderLookup::Resolved(_) => Vec::new(),
            };
            messages.push(full_message_id.clone());
            index_writes.insert(id, HeaderLookup::Ambiguous(messages));
        } else if lookup.is_unknown() {
            index_writes.insert(id, HeaderLookup::Resolved(conversation_id.clone()));
        }
    }

    debug!(
        umid,
        conversation = %conversation_id,
        existing = existing_conversation,
        writes = index_writes.len(),
        "Resolved conversation"
    );

    Ok(ConversationResolution {
        conversation_id,
        existing_conversation,
        full_message_id,
        index_writes,
        deferred_merge,
    })
}
