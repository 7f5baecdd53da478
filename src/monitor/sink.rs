use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::types::Block;

/// Downstream consumer of fetched blocks.
pub trait BlockSink: Send + Sync {
    fn report(&self, block: &Block);
}

/// Reports each block as a structured `info` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl BlockSink for LogSink {
    fn report(&self, block: &Block) {
        info!(
            hash = %block.hash,
            block_number = block.number,
            transactions = block.transaction_count,
            "block received"
        );
    }
}

impl BlockSink for mpsc::UnboundedSender<Block> {
    fn report(&self, block: &Block) {
        if self.send(*block).is_err() {
            warn!(block_number = block.number, "Block receiver dropped, block not delivered");
        }
    }
}
