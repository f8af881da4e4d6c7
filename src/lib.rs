//! `mailconv`: conversation threading and windowed folder listings for a
//! mail client back end.
//!
//! Incoming messages are threaded into conversations by the
//! [`threading`] resolver, folder tables of contents ([`toc`]) keep each
//! folder's conversation order resident, and [`view`] presents bounded,
//! observable windows over those lists.

pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod store;
pub mod threading;
pub mod toc;
pub mod view;
