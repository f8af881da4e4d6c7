//! Email parsing: header extraction for threading and conversation summaries.

pub mod message;

pub use message::{parse_eml, parse_message, ParsedMessage};
