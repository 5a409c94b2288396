use shared::model::BlockRef;
use tokio::sync::broadcast;
use tracing::*;

const DEFAULT_CAPACITY: usize = 64;

/// `NewBlockInserted` notifications from the chain.
///
/// Every subscriber sees blocks in publish order. Dropping the receiver
/// unsubscribes.
#[derive(Debug)]
pub struct ChainEventBus {
    new_block_inserted: broadcast::Sender<BlockRef>,
}

impl Default for ChainEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChainEventBus {
    pub fn new(capacity: usize) -> Self {
        let (new_block_inserted, _) = broadcast::channel(capacity);
        Self { new_block_inserted }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlockRef> {
        self.new_block_inserted.subscribe()
    }

    pub fn publish(&self, block: BlockRef) {
        let number = block.number();
        if self.new_block_inserted.send(block).is_err() {
            trace!(height = number, "new block inserted, no subscriber");
        }
    }
}
