use super::*;
use crate::monitor::handler::ConsolePrinter;
use crate::node::FeedSender;
use alloy::transports::TransportErrorKind;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    SubscribeHeads,
    SubscribePending,
    Unsubscribe(B256),
    Close,
}

/// In-memory node handing out pre-built feeds (or rejections).
struct MockNode {
    heads: Option<Result<Feed<BlockHeaderEvent>, NodeError>>,
    pending: Option<Result<Feed<PendingTxEvent>, NodeError>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl MockNode {
    fn new(
        heads: Result<Feed<BlockHeaderEvent>, NodeError>,
        pending: Result<Feed<PendingTxEvent>, NodeError>,
    ) -> (Self, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let node = Self {
            heads: Some(heads),
            pending: Some(pending),
            calls: calls.clone(),
        };
        (node, calls)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl NodeClient for MockNode {
    async fn subscribe_heads(&mut self) -> Result<Feed<BlockHeaderEvent>, NodeError> {
        self.record(Call::SubscribeHeads);
        self.heads.take().unwrap_or(Err(NodeError::FeedClosed))
    }

    async fn subscribe_pending_transactions(&mut self) -> Result<Feed<PendingTxEvent>, NodeError> {
        self.record(Call::SubscribePending);
        self.pending.take().unwrap_or(Err(NodeError::FeedClosed))
    }

    fn unsubscribe(&mut self, id: B256) -> Result<(), NodeError> {
        self.record(Call::Unsubscribe(id));
        Ok(())
    }

    fn close(self) {
        self.record(Call::Close);
    }
}

/// Records events and fires `stop` once `stop_after` events were seen.
#[derive(Default)]
struct Recorder {
    blocks: Vec<BlockHeaderEvent>,
    txs: Vec<B256>,
    stop_after: usize,
    stop: Option<oneshot::Sender<()>>,
}

impl Recorder {
    fn stopping_after(n: usize) -> (Self, impl Future<Output = ()>) {
        let (tx, rx) = oneshot::channel();
        let recorder = Self {
            stop_after: n,
            stop: Some(tx),
            ..Default::default()
        };
        (recorder, async move {
            let _ = rx.await;
        })
    }

    fn maybe_stop(&mut self) {
        if self.blocks.len() + self.txs.len() >= self.stop_after {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
        }
    }
}

impl EventHandler for Recorder {
    fn on_block(&mut self, block: &BlockHeaderEvent) {
        self.blocks.push(*block);
        self.maybe_stop();
    }

    fn on_pending_tx(&mut self, tx: &PendingTxEvent) {
        self.txs.push(tx.hash);
        self.maybe_stop();
    }
}

fn heads_id() -> B256 {
    B256::with_last_byte(1)
}

fn pending_id() -> B256 {
    B256::with_last_byte(2)
}

fn block(number: u64) -> BlockHeaderEvent {
    BlockHeaderEvent {
        number,
        hash: B256::repeat_byte(number as u8),
        timestamp: 1_700_000_000 + number,
    }
}

fn feeds() -> (
    FeedSender<BlockHeaderEvent>,
    Feed<BlockHeaderEvent>,
    FeedSender<PendingTxEvent>,
    Feed<PendingTxEvent>,
) {
    let (heads_tx, heads) = Feed::channel(heads_id());
    let (pending_tx, pending) = Feed::channel(pending_id());
    (heads_tx, heads, pending_tx, pending)
}

fn rejected(msg: &str) -> NodeError {
    NodeError::Transport(TransportErrorKind::custom_str(msg))
}

#[tokio::test]
async fn test_block_printed_then_interrupt_unsubscribes_both() {
    let (heads_tx, heads, _pending_tx, pending) = feeds();
    let (node, calls) = MockNode::new(Ok(heads), Ok(pending));
    let (mut recorder, shutdown) = Recorder::stopping_after(1);
    let mut printer = ConsolePrinter::new(Vec::new());

    let head = BlockHeaderEvent {
        number: 100,
        hash: B256::repeat_byte(0xaa),
        timestamp: 1234,
    };
    assert!(heads_tx.send(head));

    let stats = Monitor::new(node, (&mut printer, &mut recorder))
        .run(shutdown)
        .await
        .unwrap();

    assert_eq!(recorder.blocks, vec![head]);
    assert_eq!(stats.blocks, 1);
    assert_eq!(stats.last_block, Some(100));
    assert!(stats.pending_feed_active);

    let out = String::from_utf8(printer.into_inner()).unwrap();
    assert!(out.contains("Height: 100"));
    assert!(out.contains(&format!("0x{}", "aa".repeat(32))));
    assert!(out.contains("Time: 1234"));

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            Call::SubscribeHeads,
            Call::SubscribePending,
            Call::Unsubscribe(heads_id()),
            Call::Unsubscribe(pending_id()),
            Call::Close,
        ]
    );
}

#[tokio::test]
async fn test_blocks_handled_once_in_order() {
    let (heads_tx, heads, _pending_tx, pending) = feeds();
    let (node, _calls) = MockNode::new(Ok(heads), Ok(pending));
    let (mut recorder, shutdown) = Recorder::stopping_after(5);

    for n in 1..=5 {
        assert!(heads_tx.send(block(n)));
    }

    let stats = Monitor::new(node, &mut recorder).run(shutdown).await.unwrap();

    let numbers: Vec<u64> = recorder.blocks.iter().map(|b| b.number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    assert_eq!(stats.blocks, 5);
    assert_eq!(stats.pending_txs, 0);
}

#[tokio::test]
async fn test_interleaved_feeds_keep_per_feed_order() {
    let (heads_tx, heads, pending_tx, pending) = feeds();
    let (node, _calls) = MockNode::new(Ok(heads), Ok(pending));
    let (mut recorder, shutdown) = Recorder::stopping_after(8);

    let hashes: Vec<B256> = (10..14).map(B256::with_last_byte).collect();
    for n in 1..=4 {
        assert!(heads_tx.send(block(n)));
    }
    for hash in &hashes {
        assert!(pending_tx.send(PendingTxEvent::from(*hash)));
    }

    let stats = Monitor::new(node, &mut recorder).run(shutdown).await.unwrap();

    let numbers: Vec<u64> = recorder.blocks.iter().map(|b| b.number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(recorder.txs, hashes);
    assert_eq!(stats.blocks, 4);
    assert_eq!(stats.pending_txs, 4);
}

#[tokio::test]
async fn test_pending_rejected_runs_on_blocks_only() {
    let (heads_tx, heads) = Feed::channel(heads_id());
    let (node, calls) = MockNode::new(
        Ok(heads),
        Err(rejected("the method eth_subscribe does not exist/is not available")),
    );
    let (mut recorder, shutdown) = Recorder::stopping_after(2);

    assert!(heads_tx.send(block(1)));
    assert!(heads_tx.send(block(2)));

    let stats = Monitor::new(node, &mut recorder).run(shutdown).await.unwrap();

    assert!(!stats.pending_feed_active);
    assert_eq!(stats.blocks, 2);
    assert!(recorder.txs.is_empty());
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            Call::SubscribeHeads,
            Call::SubscribePending,
            Call::Unsubscribe(heads_id()),
            Call::Close,
        ]
    );
}

#[tokio::test]
async fn test_interrupt_with_backlog_still_unsubscribes() {
    let (heads_tx, heads, pending_tx, pending) = feeds();
    let (node, calls) = MockNode::new(Ok(heads), Ok(pending));

    for n in 1..=50 {
        assert!(heads_tx.send(block(n)));
        assert!(pending_tx.send(PendingTxEvent::from(B256::with_last_byte(n as u8))));
    }

    let mut recorder = Recorder::default();
    let stats = Monitor::new(node, &mut recorder)
        .run(std::future::ready(()))
        .await
        .unwrap();

    assert!(stats.blocks <= 50);
    assert!(stats.pending_txs <= 50);
    let calls = calls.lock().unwrap();
    assert!(calls.contains(&Call::Unsubscribe(heads_id())));
    assert!(calls.contains(&Call::Unsubscribe(pending_id())));
    assert_eq!(calls.last(), Some(&Call::Close));
}

#[tokio::test]
async fn test_heads_error_is_fatal_while_pending_healthy() {
    let (heads_tx, heads, pending_tx, pending) = feeds();
    let (node, calls) = MockNode::new(Ok(heads), Ok(pending));

    assert!(pending_tx.send(PendingTxEvent::from(B256::with_last_byte(9))));
    heads_tx.fail(rejected("connection reset by peer"));

    let mut recorder = Recorder::default();
    let err = Monitor::new(node, &mut recorder)
        .run(std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MonitorError::FeedFailed {
            feed: FeedKind::NewHeads,
            source: NodeError::Transport(_),
        }
    ));
    assert_eq!(err.feed(), Some(FeedKind::NewHeads));
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            Call::SubscribeHeads,
            Call::SubscribePending,
            Call::Unsubscribe(pending_id()),
            Call::Close,
        ]
    );
}

#[tokio::test]
async fn test_heads_stream_dropped_is_fatal() {
    let (heads_tx, heads, _pending_tx, pending) = feeds();
    let (node, _calls) = MockNode::new(Ok(heads), Ok(pending));
    drop(heads_tx);

    let err = Monitor::new(node, Recorder::default())
        .run(std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MonitorError::FeedFailed {
            feed: FeedKind::NewHeads,
            source: NodeError::FeedClosed,
        }
    ));
}

#[tokio::test]
async fn test_pending_error_is_fatal_once_active() {
    let (_heads_tx, heads, pending_tx, pending) = feeds();
    let (node, calls) = MockNode::new(Ok(heads), Ok(pending));
    pending_tx.fail(NodeError::FeedClosed);

    let err = Monitor::new(node, Recorder::default())
        .run(std::future::pending())
        .await
        .unwrap_err();

    assert_eq!(err.feed(), Some(FeedKind::PendingTransactions));
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            Call::SubscribeHeads,
            Call::SubscribePending,
            Call::Unsubscribe(heads_id()),
            Call::Close,
        ]
    );
}

#[tokio::test]
async fn test_pending_stream_dropped_is_fatal() {
    let (_heads_tx, heads, pending_tx, pending) = feeds();
    let (node, calls) = MockNode::new(Ok(heads), Ok(pending));
    drop(pending_tx);

    let err = Monitor::new(node, Recorder::default())
        .run(std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MonitorError::FeedFailed {
            feed: FeedKind::PendingTransactions,
            source: NodeError::FeedClosed,
        }
    ));
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            Call::SubscribeHeads,
            Call::SubscribePending,
            Call::Unsubscribe(heads_id()),
            Call::Close,
        ]
    );
}

#[test]
fn test_new_monitor_starts_connecting() {
    let (_heads_tx, heads, _pending_tx, pending) = feeds();
    let (node, calls) = MockNode::new(Ok(heads), Ok(pending));

    let monitor = Monitor::new(node, Recorder::default());
    assert_eq!(monitor.state(), MonitorState::Connecting);
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_heads_subscribe_failure_skips_pending() {
    let (_pending_tx, pending) = Feed::channel(pending_id());
    let (node, calls) = MockNode::new(Err(rejected("notifications not supported")), Ok(pending));

    let err = Monitor::new(node, Recorder::default())
        .run(std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MonitorError::Subscribe {
            feed: FeedKind::NewHeads,
            ..
        }
    ));
    assert_eq!(*calls.lock().unwrap(), vec![Call::SubscribeHeads, Call::Close]);
}

#[tokio::test]
async fn test_unreachable_node_fails_before_subscribing() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = Config::default();
    config.node.ws_url = format!("ws://127.0.0.1:{port}");
    config.node.connect_timeout_secs = 5;

    let mut recorder = Recorder::default();
    let err = connect_and_run(&config, &mut recorder, std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, MonitorError::Connect { .. }));
    assert_eq!(err.feed(), None);
    assert!(err.to_string().contains("--ws"));
    assert!(recorder.blocks.is_empty());
}
