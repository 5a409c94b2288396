use std::sync::Arc;

use colored::Colorize;
use mine_master::{BlockBroadcaster, BlockBuilder, ChainEventBus};
use num_bigint::BigUint;
use parking_lot::Mutex;
use rand::Rng;
use shared::{
    model::{AbstractBlock, Block, BlockRef, Header, Transaction},
    types::{Address, Difficulty, Hash},
};
use tracing::*;

const BLOCK_REWARD: u64 = 2_000;
const MAX_PENDING_TXS: usize = 8;

struct Head {
    number: u64,
    hash: Hash,
}

/// Single node toy chain. Mined blocks extending the head are inserted and
/// published on the event bus, everything else is dropped.
pub struct DevChain {
    difficulty: Difficulty,
    head: Mutex<Head>,
    events: Arc<ChainEventBus>,
}

impl DevChain {
    pub fn new(difficulty: Difficulty, events: Arc<ChainEventBus>) -> Self {
        Self { difficulty, head: Mutex::new(Head { number: 0, hash: Hash::default() }), events }
    }

    pub fn height(&self) -> u64 {
        self.head.lock().number
    }

    fn pending_txs() -> Vec<Transaction> {
        let mut rng = rand::thread_rng();
        (0..rng.gen_range(0..=MAX_PENDING_TXS))
            .map(|nonce| Transaction {
                nonce: nonce as u64,
                from: Address(rng.gen()),
                to: Address(rng.gen()),
                value: BigUint::from(rng.gen_range(1..1_000u32)),
                fee: BigUint::from(rng.gen_range(1..50u32)),
            })
            .collect()
    }
}

impl BlockBuilder for DevChain {
    fn build_wait_pack_block(&self, coinbase: Address, gas_floor: u64, gas_ceil: u64) -> Option<BlockRef> {
        let (number, pre_hash) = {
            let head = self.head.lock();
            (head.number + 1, head.hash)
        };
        let mut header = Header::new(number, pre_hash, self.difficulty, coinbase);
        if gas_ceil > 0 {
            header.gas_limit = gas_ceil.max(gas_floor);
        }
        let block = Block::new(header, Self::pending_txs(), BigUint::from(BLOCK_REWARD));
        debug!(height = number, txs = block.tx_count(), "build wait pack block");
        Some(Arc::new(block))
    }
}

impl BlockBroadcaster for DevChain {
    fn broadcast_mined_block(&self, block: BlockRef) {
        let hash = block.hash();
        {
            let mut head = self.head.lock();
            if block.number() != head.number + 1 || block.header().pre_hash != head.hash {
                debug!(height = block.number(), head = head.number, "drop block not extending head");
                return;
            }
            if !hash.valid_for_difficulty(block.difficulty()) {
                warn!(height = block.number(), %hash, "drop block with invalid seal");
                return;
            }
            head.number = block.number();
            head.hash = hash;
        }
        info!(
            "{} #{} {} txs: {}",
            "INSERT".bold().green(),
            block.number(),
            hash.to_string().dimmed(),
            block.tx_count()
        );
        self.events.publish(block);
    }
}
