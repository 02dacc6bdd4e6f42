//! [`NodeClient`] over an alloy WebSocket provider.
//!
//! Each subscription gets a small forwarding task that drains the alloy
//! subscription stream into the feed channels, so the monitor loop only
//! ever waits on tokio channels.
//!
//! alloy's pubsub backend normally reconnects and replays `eth_subscribe`
//! when the socket drops. `NoReconnect` turns that off: a lost connection
//! shuts the backend down, the subscription streams end and every open feed
//! reports [`NodeError::FeedClosed`].

use crate::monitor::types::{BlockHeaderEvent, FeedKind, PendingTxEvent};
use crate::node::{Feed, FeedSender, NodeClient, NodeError};

use alloy::primitives::B256;
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::pubsub::{ConnectionHandle, PubSubConnect};
use alloy::transports::{TransportErrorKind, TransportResult};
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// [`WsConnect`] with reconnection refused.
struct NoReconnect(WsConnect);

impl PubSubConnect for NoReconnect {
    fn is_local(&self) -> bool {
        self.0.is_local()
    }

    fn connect(&self) -> impl Future<Output = TransportResult<ConnectionHandle>> + Send {
        self.0.connect()
    }

    fn try_reconnect(&self) -> impl Future<Output = TransportResult<ConnectionHandle>> + Send {
        futures::future::ready(Err(TransportErrorKind::custom_str(
            "connection to node lost, reconnect disabled",
        )))
    }
}

/// A live WebSocket connection to a node.
pub struct WsNode {
    provider: DynProvider,
    forwarders: HashMap<B256, JoinHandle<()>>,
}

impl WsNode {
    /// Open the connection, giving up after `timeout`.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, NodeError> {
        let ws = NoReconnect(WsConnect::new(url));
        let connect = ProviderBuilder::new().connect_pubsub_with(ws);
        let provider = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| NodeError::Timeout(timeout))??;

        info!(url = %url, "node WebSocket connected");

        Ok(Self {
            provider: provider.erased(),
            forwarders: HashMap::new(),
        })
    }

    fn spawn_forwarder<S, T>(&mut self, id: B256, kind: FeedKind, stream: S) -> Feed<T>
    where
        S: Stream<Item = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, feed) = Feed::channel(id);
        let handle = tokio::spawn(forward(stream, tx, kind));
        self.forwarders.insert(id, handle);
        feed
    }
}

async fn forward<S, T>(stream: S, tx: FeedSender<T>, kind: FeedKind)
where
    S: Stream<Item = T>,
{
    let mut stream = pin!(stream);

    while let Some(item) = stream.next().await {
        if !tx.send(item) {
            debug!(feed = %kind, "feed receiver dropped, stopping forwarder");
            return;
        }
    }

    warn!(feed = %kind, "subscription stream ended");
    tx.fail(NodeError::FeedClosed);
}

impl NodeClient for WsNode {
    async fn subscribe_heads(&mut self) -> Result<Feed<BlockHeaderEvent>, NodeError> {
        let sub = self.provider.subscribe_blocks().await?;
        let id = *sub.local_id();
        let stream = sub.into_stream().map(|header| BlockHeaderEvent::from(&header));

        debug!(id = %id, "newHeads subscription established");
        Ok(self.spawn_forwarder(id, FeedKind::NewHeads, stream))
    }

    async fn subscribe_pending_transactions(&mut self) -> Result<Feed<PendingTxEvent>, NodeError> {
        let sub = self.provider.subscribe_pending_transactions().await?;
        let id = *sub.local_id();
        let stream = sub.into_stream().map(PendingTxEvent::from);

        debug!(id = %id, "newPendingTransactions subscription established");
        Ok(self.spawn_forwarder(id, FeedKind::PendingTransactions, stream))
    }

    fn unsubscribe(&mut self, id: B256) -> Result<(), NodeError> {
        if let Some(handle) = self.forwarders.remove(&id) {
            handle.abort();
        }
        self.provider.root().unsubscribe(id)?;
        Ok(())
    }

    fn close(mut self) {
        for (_, handle) in self.forwarders.drain() {
            handle.abort();
        }
        // Dropping the last provider handle shuts down the pubsub backend.
        drop(self.provider);
        info!("node WebSocket closed");
    }
}
