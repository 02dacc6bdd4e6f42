//! Pluggable reactions to monitor events.
//!
//! The dispatch loop only knows about [`EventHandler`]. The binary wires a
//! [`ConsolePrinter`]; strategy code (price checks on each block, deeper
//! inspection of pending transactions) plugs in by implementing the trait
//! and pairing it with the printer as a tuple.

use crate::monitor::types::{BlockHeaderEvent, PendingTxEvent};
use std::io::{self, Write};
use tracing::warn;

/// Callbacks invoked by the dispatch loop, one event at a time.
///
/// Handlers run inline on the loop, so anything slow should be spawned
/// onto its own task rather than awaited here.
pub trait EventHandler {
    fn on_block(&mut self, _block: &BlockHeaderEvent) {}

    fn on_pending_tx(&mut self, _tx: &PendingTxEvent) {}
}

impl<A: EventHandler, B: EventHandler> EventHandler for (A, B) {
    fn on_block(&mut self, block: &BlockHeaderEvent) {
        self.0.on_block(block);
        self.1.on_block(block);
    }

    fn on_pending_tx(&mut self, tx: &PendingTxEvent) {
        self.0.on_pending_tx(tx);
        self.1.on_pending_tx(tx);
    }
}

impl<H: EventHandler + ?Sized> EventHandler for &mut H {
    fn on_block(&mut self, block: &BlockHeaderEvent) {
        (**self).on_block(block);
    }

    fn on_pending_tx(&mut self, tx: &PendingTxEvent) {
        (**self).on_pending_tx(tx);
    }
}

/// Writes one human-readable line per event.
pub struct ConsolePrinter<W: Write> {
    out: W,
}

impl ConsolePrinter<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsolePrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: std::fmt::Arguments<'_>) {
        // Output is best-effort; a closed stdout must not kill the monitor.
        if let Err(e) = self.out.write_fmt(line).and_then(|_| self.out.flush()) {
            warn!(error = %e, "failed to write event to console");
        }
    }
}

impl<W: Write> EventHandler for ConsolePrinter<W> {
    fn on_block(&mut self, block: &BlockHeaderEvent) {
        self.emit(format_args!(
            "\n[New Block] Height: {} | Hash: {} | Time: {}\n",
            block.number, block.hash, block.timestamp
        ));
    }

    fn on_pending_tx(&mut self, tx: &PendingTxEvent) {
        self.emit(format_args!("[Pending Tx] {}\n", tx.hash));
    }
}
