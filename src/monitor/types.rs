//! Event types flowing from the node subscriptions into the dispatch loop.

use alloy::primitives::B256;
use alloy::rpc::types::Header;
use std::fmt;

/// A new chain head announced on the `newHeads` subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeaderEvent {
    pub number: u64,
    pub hash: B256,
    pub timestamp: u64,
}

impl From<&Header> for BlockHeaderEvent {
    fn from(header: &Header) -> Self {
        Self {
            number: header.number,
            hash: header.hash,
            timestamp: header.timestamp,
        }
    }
}

/// A transaction hash that entered the node's pending pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTxEvent {
    pub hash: B256,
}

impl From<B256> for PendingTxEvent {
    fn from(hash: B256) -> Self {
        Self { hash }
    }
}

/// Which of the two subscriptions an error or feed belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    /// Mandatory: the monitor cannot run without it.
    NewHeads,
    /// Best-effort: the monitor degrades to heads-only when unavailable.
    PendingTransactions,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKind::NewHeads => write!(f, "newHeads"),
            FeedKind::PendingTransactions => write!(f, "newPendingTransactions"),
        }
    }
}

/// Lifecycle of a monitor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Connecting,
    Subscribing,
    Running,
    ShuttingDown,
    Terminated,
}

/// Counters reported when a run ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub blocks: u64,
    pub pending_txs: u64,
    pub last_block: Option<u64>,
    /// False when the pending-transaction subscription was rejected at startup.
    pub pending_feed_active: bool,
}
