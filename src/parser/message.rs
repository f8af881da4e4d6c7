//! Extraction of threading and summary headers from RFC 5322 messages.

use std::path::Path;

use chrono::{DateTime, Utc};
use mail_parser::{HeaderValue, MessageParser};
use tracing::debug;

use crate::error::{MailError, Result};
use crate::model::{FolderId, HeaderId, MessageInfo, Peep};
use crate::threading::IncomingMessage;

/// Maximum snippet length in characters.
pub const SNIPPET_LEN: usize = 100;

/// The parts of a message the threading pipeline cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Empty when the message carries no `Message-ID`.
    pub message_id: HeaderId,
    /// `References` then `In-Reply-To`, de-duplicated.
    pub references: Vec<HeaderId>,
    pub subject: String,
    pub author: Peep,
    pub date: DateTime<Utc>,
    pub snippet: Option<String>,
    pub has_attachments: bool,
}

impl ParsedMessage {
    /// Package the message for ingestion under the sync id `umid`.
    pub fn into_incoming(self, umid: impl Into<String>, folder: FolderId) -> IncomingMessage {
        IncomingMessage {
            header_id: self.message_id,
            references: self.references,
            info: MessageInfo {
                umid: umid.into(),
                date: self.date,
                author: self.author,
                subject: self.subject,
                snippet: self.snippet,
                folder_ids: [folder].into_iter().collect(),
                is_read: false,
                is_starred: false,
                is_draft: false,
                has_attachments: self.has_attachments,
            },
        }
    }
}

/// Parse a raw message.
pub fn parse_message(raw: &[u8]) -> Result<ParsedMessage> {
    let msg = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailError::InvalidMessage("no RFC 5322 headers found".into()))?;

    let message_id = HeaderId::new(msg.message_id().unwrap_or_default());

    let mut references: Vec<HeaderId> = Vec::new();
    for value in [msg.references(), msg.in_reply_to()] {
        for id in header_ids(value) {
            if !id.is_empty() && !references.contains(&id) {
                references.push(id);
            }
        }
    }

    let author = msg
        .from()
        .and_then(|from| from.first())
        .map(|addr| Peep::new(addr.name().unwrap_or_default(), addr.address().unwrap_or_default()))
        .unwrap_or_else(|| Peep::new("", ""));

    let date = msg
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or(DateTime::UNIX_EPOCH);

    let snippet = msg.body_text(0).and_then(|body| snippet_of(&body));

    let parsed = ParsedMessage {
        message_id,
        references,
        subject: msg.subject().unwrap_or_default().to_string(),
        author,
        date,
        snippet,
        has_attachments: msg.attachment_count() > 0,
    };
    debug!(
        message_id = %parsed.message_id,
        references = parsed.references.len(),
        "Parsed message headers"
    );
    Ok(parsed)
}

/// Read and parse a single `.eml` file.
pub fn parse_eml(path: impl AsRef<Path>) -> Result<ParsedMessage> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MailError::FileNotFound(path.to_path_buf())
        } else {
            MailError::io(path, e)
        }
    })?;
    parse_message(&data)
}

fn header_ids(value: &HeaderValue<'_>) -> Vec<HeaderId> {
    match value {
        HeaderValue::Text(text) => vec![HeaderId::new(text.as_ref())],
        HeaderValue::TextList(list) => list.iter().map(|t| HeaderId::new(t.as_ref())).collect(),
        _ => Vec::new(),
    }
}

/// First non-empty line of the body, truncated to [`SNIPPET_LEN`] characters.
fn snippet_of(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('>'))
        .map(|line| line.chars().take(SNIPPET_LEN).collect())
}
