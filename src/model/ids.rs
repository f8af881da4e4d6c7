//! Identifier types: header ids, conversation ids and full message ids.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Separator between the conversation and local parts of a [`FullMessageId`].
pub const MESSAGE_ID_SEPARATOR: char = '.';

/// Number of hex digits kept from the umid digest.
const ID_COMPONENT_LEN: usize = 16;

/// A `Message-ID`-style header value used as a threading key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HeaderId(String);

impl HeaderId {
    /// Build a header id, stripping angle brackets and whitespace.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(normalize_id(raw.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for HeaderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for HeaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint the id of a conversation originated by the message `umid`.
    pub fn from_umid(umid: &str) -> Self {
        Self(id_component_from_umid(umid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message id qualified by the conversation that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FullMessageId {
    conversation: ConversationId,
    local: String,
}

impl FullMessageId {
    /// Compose the full id for message `umid` inside `conversation`.
    pub fn new(conversation: &ConversationId, umid: &str) -> Self {
        Self {
            conversation: conversation.clone(),
            local: id_component_from_umid(umid),
        }
    }

    /// Parse `"<conversation>.<local>"`, splitting on the last separator.
    pub fn parse(s: &str) -> Option<Self> {
        let (conversation, local) = s.rsplit_once(MESSAGE_ID_SEPARATOR)?;
        if conversation.is_empty() || local.is_empty() {
            return None;
        }
        Some(Self {
            conversation: ConversationId::new(conversation),
            local: local.to_string(),
        })
    }

    /// The conversation this message belongs to.
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation
    }

    pub fn local_component(&self) -> &str {
        &self.local
    }
}

impl fmt::Display for FullMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.conversation, MESSAGE_ID_SEPARATOR, self.local)
    }
}

/// Identifier of a folder (or label) within an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FolderId(String);

impl FolderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FolderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive a separator-free, fixed-width id component from a umid.
fn id_component_from_umid(umid: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(umid.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..ID_COMPONENT_LEN].to_string()
}

/// Normalize a Message-ID by stripping angle brackets and whitespace.
fn normalize_id(id: &str) -> String {
    id.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}
