//! Node event monitor.
//!
//! Connects to a node's WebSocket RPC, subscribes to new block headers and
//! pending transaction hashes, and hands every event to an [`EventHandler`]
//! until the shutdown future resolves or a subscription fails.
//!
//! Lifecycle: `Connecting -> Subscribing -> Running -> ShuttingDown -> Terminated`.
//! - The block-header feed is mandatory; failing to establish it, or an
//!   error on it later, ends the run with an error.
//! - The pending-transaction feed is best-effort at startup. If the node
//!   rejects it the monitor runs on blocks alone. Once established, an error
//!   on it is fatal like any other.
//! - There is no reconnection. Every exit path unsubscribes whatever is
//!   still active and closes the connection.

pub mod handler;
pub mod types;

use crate::config::Config;
use crate::node::{Feed, NodeClient, NodeError, WsNode};

use alloy::primitives::B256;
use handler::EventHandler;
use std::future::Future;
use std::pin::pin;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use types::{BlockHeaderEvent, FeedKind, MonitorState, MonitorStats, PendingTxEvent};

const CONNECT_HINT: &str = "\n  likely causes:\n  \
    1. the node is not running\n  \
    2. WebSocket RPC is not enabled (start geth with --ws)\n  \
    3. wrong port (geth serves WebSocket on 8546 by default)\n  \
    example: geth --ws --ws.addr 0.0.0.0 --ws.port 8546";

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("cannot connect to node at {url}: {source}{}", CONNECT_HINT)]
    Connect { url: String, source: NodeError },
    #[error("failed to subscribe to {feed}: {source}")]
    Subscribe { feed: FeedKind, source: NodeError },
    #[error("{feed} subscription failed: {source}")]
    FeedFailed { feed: FeedKind, source: NodeError },
}

impl MonitorError {
    /// The subscription involved, if any.
    pub fn feed(&self) -> Option<FeedKind> {
        match self {
            MonitorError::Connect { .. } => None,
            MonitorError::Subscribe { feed, .. } | MonitorError::FeedFailed { feed, .. } => {
                Some(*feed)
            }
        }
    }
}

/// Why the dispatch loop stopped.
enum Exit {
    Interrupted,
    Failed(FeedKind, NodeError),
}

/// Connect to the node described by `config` and run until `shutdown`
/// resolves or a subscription fails.
pub async fn connect_and_run<H, F>(
    config: &Config,
    handler: H,
    shutdown: F,
) -> Result<MonitorStats, MonitorError>
where
    H: EventHandler,
    F: Future<Output = ()>,
{
    let url = config.node.ws_url.as_str();
    info!(
        url = %url,
        timeout_secs = config.node.connect_timeout_secs,
        "connecting to node WebSocket"
    );

    let node = WsNode::connect(url, config.connect_timeout())
        .await
        .map_err(|source| MonitorError::Connect {
            url: url.to_string(),
            source,
        })?;
    println!("connected to node RPC over WebSocket");

    Monitor::new(node, handler).run(shutdown).await
}

/// One monitor run over an already-connected node.
pub struct Monitor<N: NodeClient, H: EventHandler> {
    node: N,
    handler: H,
    state: MonitorState,
    stats: MonitorStats,
}

impl<N: NodeClient, H: EventHandler> Monitor<N, H> {
    pub fn new(node: N, handler: H) -> Self {
        Self {
            node,
            handler,
            state: MonitorState::Connecting,
            stats: MonitorStats::default(),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Subscribe, dispatch events until `shutdown` resolves, then tear down.
    pub async fn run<F>(mut self, shutdown: F) -> Result<MonitorStats, MonitorError>
    where
        F: Future<Output = ()>,
    {
        self.transition(MonitorState::Subscribing);

        let mut heads = match self.node.subscribe_heads().await {
            Ok(feed) => feed,
            Err(source) => {
                error!(error = %source, "failed to subscribe to new block headers");
                self.teardown(&[]);
                return Err(MonitorError::Subscribe {
                    feed: FeedKind::NewHeads,
                    source,
                });
            }
        };
        info!(id = %heads.id, "subscribed to new block headers");
        println!("listening for new blocks (newHeads)...");

        let mut pending = match self.node.subscribe_pending_transactions().await {
            Ok(feed) => {
                info!(id = %feed.id, "subscribed to pending transactions");
                println!("listening for pending transactions (newPendingTransactions)...");
                Some(feed)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "pending transaction subscription rejected, continuing with blocks only \
                     (node may be too old or not configured to expose txpool events)"
                );
                None
            }
        };
        self.stats.pending_feed_active = pending.is_some();

        self.transition(MonitorState::Running);
        println!("\nmonitor started, press Ctrl+C to exit...\n");

        let exit = self.dispatch(&mut heads, pending.as_mut(), shutdown).await;

        let mut active = vec![(FeedKind::NewHeads, heads.id)];
        if let Some(feed) = &pending {
            active.push((FeedKind::PendingTransactions, feed.id));
        }

        match exit {
            Exit::Interrupted => {
                self.transition(MonitorState::ShuttingDown);
                println!("\nstopping monitor, disconnecting...");
                Ok(self.teardown(&active))
            }
            Exit::Failed(feed, source) => {
                error!(feed = %feed, error = %source, "subscription failed");
                // The failed feed is dead server-side too; only release the others.
                active.retain(|(kind, _)| *kind != feed);
                self.teardown(&active);
                Err(MonitorError::FeedFailed { feed, source })
            }
        }
    }

    async fn dispatch<F>(
        &mut self,
        heads: &mut Feed<BlockHeaderEvent>,
        pending: Option<&mut Feed<PendingTxEvent>>,
        shutdown: F,
    ) -> Exit
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = pin!(shutdown);
        let Feed {
            events: head_events,
            errors: head_errors,
            ..
        } = heads;
        let (mut pending_events, mut pending_errors) = match pending {
            Some(feed) => (Some(&mut feed.events), Some(&mut feed.errors)),
            None => (None, None),
        };

        loop {
            tokio::select! {
                block = head_events.recv() => match block {
                    Some(block) => self.on_block(block),
                    None => {
                        let cause = closed_cause(Some(&mut *head_errors));
                        return Exit::Failed(FeedKind::NewHeads, cause);
                    }
                },
                tx = recv_if_active(pending_events.as_deref_mut()) => match tx {
                    Some(tx) => self.on_pending_tx(tx),
                    None => {
                        let cause = closed_cause(pending_errors.as_deref_mut());
                        return Exit::Failed(FeedKind::PendingTransactions, cause);
                    }
                },
                err = head_errors.recv() => {
                    return Exit::Failed(FeedKind::NewHeads, err.unwrap_or(NodeError::FeedClosed));
                }
                err = recv_if_active(pending_errors.as_deref_mut()) => {
                    let cause = err.unwrap_or(NodeError::FeedClosed);
                    return Exit::Failed(FeedKind::PendingTransactions, cause);
                }
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    return Exit::Interrupted;
                }
            }
        }
    }

    fn on_block(&mut self, block: BlockHeaderEvent) {
        self.stats.blocks += 1;
        self.stats.last_block = Some(block.number);
        debug!(number = block.number, hash = %block.hash, "new block");
        self.handler.on_block(&block);
    }

    fn on_pending_tx(&mut self, tx: PendingTxEvent) {
        self.stats.pending_txs += 1;
        self.handler.on_pending_tx(&tx);
    }

    /// Best-effort release of `active` subscriptions, then the connection.
    fn teardown(mut self, active: &[(FeedKind, B256)]) -> MonitorStats {
        for (kind, id) in active {
            match self.node.unsubscribe(*id) {
                Ok(()) => debug!(feed = %kind, id = %id, "unsubscribed"),
                Err(e) => warn!(feed = %kind, id = %id, error = %e, "failed to unsubscribe"),
            }
        }

        self.transition(MonitorState::Terminated);
        let Monitor { node, stats, .. } = self;
        node.close();

        info!(
            blocks = stats.blocks,
            pending_txs = stats.pending_txs,
            last_block = ?stats.last_block,
            "monitor stopped"
        );
        stats
    }

    fn transition(&mut self, next: MonitorState) {
        debug!(from = ?self.state, to = ?next, "monitor state");
        self.state = next;
    }
}

/// Receive from a feed channel that may not exist. A missing feed never
/// becomes ready.
async fn recv_if_active<T>(rx: Option<&mut mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// The error reported alongside a closed event channel, if one was sent.
fn closed_cause(errors: Option<&mut mpsc::UnboundedReceiver<NodeError>>) -> NodeError {
    errors
        .and_then(|rx| rx.try_recv().ok())
        .unwrap_or(NodeError::FeedClosed)
}

#[cfg(test)]
mod tests;
