//! Windowed list views over folder conversation lists.
//!
//! The client side ([`WindowedListView`]) and the provider side
//! ([`WindowedListProxy`]) only share the request and batch types in
//! [`transport`], so they can live on either side of a channel.

pub mod conversation;
pub mod proxy;
pub mod transport;
pub mod windowed;

pub use conversation::MailConversation;
pub use proxy::{ConversationBatch, WindowedListProxy};
pub use transport::{
    ChannelTransport, SeekMode, SeekRequest, UpdateBatch, ViewHandle, ViewRequest, ViewTransport,
};
pub use windowed::{ListItem, SeekChangeInfo, Slot, WindowedItem, WindowedListView};

/// A windowed view of conversations.
pub type ConversationListView = WindowedListView<MailConversation>;
