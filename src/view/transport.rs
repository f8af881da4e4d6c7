//! Wire types exchanged between a windowed view and its provider, and the
//! channel that carries view requests.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{MailError, Result};
use crate::model::OrderingKey;

/// Identifies one view on both sides of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewHandle(pub u64);

impl std::fmt::Display for ViewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// How a seek anchors its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeekMode {
    Top,
    Bottom,
    /// Anchored on an ordering key.
    Focus,
    /// Anchored on an absolute position.
    FocusIndex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekRequest {
    pub mode: SeekMode,
    pub above: usize,
    pub below: usize,
    pub index: Option<usize>,
    pub focus_key: Option<OrderingKey>,
}

impl SeekRequest {
    /// The first `count` entries.
    pub fn top(count: usize) -> Self {
        Self {
            mode: SeekMode::Top,
            above: 0,
            below: count,
            index: None,
            focus_key: None,
        }
    }

    /// The last `count` entries.
    pub fn bottom(count: usize) -> Self {
        Self {
            mode: SeekMode::Bottom,
            above: count,
            below: 0,
            index: None,
            focus_key: None,
        }
    }

    pub fn focus(key: OrderingKey, above: usize, below: usize) -> Self {
        Self {
            mode: SeekMode::Focus,
            above,
            below,
            index: None,
            focus_key: Some(key),
        }
    }

    pub fn focus_index(index: usize, above: usize, below: usize) -> Self {
        Self {
            mode: SeekMode::FocusIndex,
            above,
            below,
            index: Some(index),
            focus_key: None,
        }
    }
}

/// A request from a view to its provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ViewRequest {
    Seek {
        handle: ViewHandle,
        request: SeekRequest,
    },
    /// The view was released; the provider should drop its state.
    Cleanup { handle: ViewHandle },
}

impl ViewRequest {
    pub fn handle(&self) -> ViewHandle {
        match self {
            ViewRequest::Seek { handle, .. } | ViewRequest::Cleanup { handle } => *handle,
        }
    }
}

/// The authoritative window contents sent from a provider to a view.
///
/// `values` holds new state only for ids whose state the view does not have
/// yet (or whose state changed); the other ids keep their current state or
/// remain placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateBatch<I: Eq + Hash, S> {
    pub offset: usize,
    pub total_count: usize,
    pub ids: Vec<I>,
    pub values: HashMap<I, S>,
}

/// Outbound half of a view/provider link.
pub trait ViewTransport: Send {
    fn send(&self, request: ViewRequest) -> Result<()>;
}

/// [`ViewTransport`] over an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<ViewRequest>,
}

impl ChannelTransport {
    /// Create a transport and the receiver the provider side drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ViewRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ViewTransport for ChannelTransport {
    fn send(&self, request: ViewRequest) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|e| MailError::Transport(format!("provider gone for {}", e.0.handle())))
    }
}
