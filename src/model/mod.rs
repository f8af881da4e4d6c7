//! Core data model types: ids, ordering keys, header lookups and conversation summaries.

pub mod conversation;
pub mod ids;
pub mod lookup;
pub mod ordering;
pub mod peep;

pub use conversation::{ConversationSummary, MessageInfo, Tidbit};
pub use ids::{ConversationId, FolderId, FullMessageId, HeaderId};
pub use lookup::HeaderLookup;
pub use ordering::{OrderingKey, TocEntry};
pub use peep::Peep;
