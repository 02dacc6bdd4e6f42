//! Boundary between the monitor and the node's RPC client.
//!
//! A [`Feed`] is what the monitor sees of one server-side subscription: an
//! event channel, an error channel and the subscription id used to cancel
//! it. [`NodeClient`] is implemented by [`ws::WsNode`] for a live node and
//! by in-memory fakes in tests.

pub mod ws;

use crate::monitor::types::{BlockHeaderEvent, PendingTxEvent};
use alloy::primitives::B256;
use alloy::transports::TransportError;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub use ws::WsNode;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("rpc transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("subscription stream closed")]
    FeedClosed,
}

/// Receiving half of one subscription.
///
/// Events are unbounded: a slow consumer grows the queue rather than
/// stalling the node connection.
#[derive(Debug)]
pub struct Feed<T> {
    pub id: B256,
    pub events: mpsc::UnboundedReceiver<T>,
    pub errors: mpsc::UnboundedReceiver<NodeError>,
}

/// Producing half of a [`Feed`], held by whatever pumps the subscription.
#[derive(Debug)]
pub struct FeedSender<T> {
    events: mpsc::UnboundedSender<T>,
    errors: mpsc::UnboundedSender<NodeError>,
}

impl<T> Feed<T> {
    pub fn channel(id: B256) -> (FeedSender<T>, Feed<T>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        (
            FeedSender {
                events: events_tx,
                errors: errors_tx,
            },
            Feed {
                id,
                events: events_rx,
                errors: errors_rx,
            },
        )
    }
}

impl<T> FeedSender<T> {
    /// Returns false once the receiving side is gone.
    pub fn send(&self, event: T) -> bool {
        self.events.send(event).is_ok()
    }

    /// Report a terminal error and close the feed.
    pub fn fail(self, err: NodeError) {
        let _ = self.errors.send(err);
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// The operations the monitor needs from an RPC client connected to a node.
#[allow(async_fn_in_trait)]
pub trait NodeClient {
    /// `eth_subscribe("newHeads")`
    async fn subscribe_heads(&mut self) -> Result<Feed<BlockHeaderEvent>, NodeError>;

    /// `eth_subscribe("newPendingTransactions")`, hashes only.
    async fn subscribe_pending_transactions(&mut self) -> Result<Feed<PendingTxEvent>, NodeError>;

    fn unsubscribe(&mut self, id: B256) -> Result<(), NodeError>;

    /// Release the connection. Any feed still open reports closure.
    fn close(self)
    where
        Self: Sized;
}
