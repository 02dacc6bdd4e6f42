//! Console monitor for a local Ethereum node.
//!
//! Subscribes to new block headers and pending transactions over the node's
//! WebSocket RPC and prints each event until interrupted.

pub mod config;
pub mod monitor;
pub mod node;
