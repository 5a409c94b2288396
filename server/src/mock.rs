//! Recording collaborators for unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use num_bigint::BigUint;
use parking_lot::{Mutex, RwLock};
use shared::{
    model::{Block, BlockRef, Header, Transaction},
    msg::MsgCode,
    types::{Address, Difficulty, Hash, WorkerId},
    work::Work,
};

use crate::{
    config::MineConfig,
    events::ChainEventBus,
    interface::{BlockBroadcaster, BlockBuilder, WorkerForMaster, WorkerRef, Workers},
};

pub fn block_with_reward(number: u64, coinbase: Address, reward: u32, fee: u32) -> BlockRef {
    let header = Header::new(number, Hash::default(), Difficulty::EASIEST, coinbase);
    let txs = vec![Transaction { fee: BigUint::from(fee), ..Default::default() }];
    Arc::new(Block::new(header, txs, BigUint::from(reward)))
}

pub struct RecordingBuilder {
    next: AtomicU64,
    built: AtomicUsize,
    empty: AtomicBool,
    difficulty: Difficulty,
}

impl RecordingBuilder {
    pub fn new(first: u64) -> Self {
        Self { next: AtomicU64::new(first), built: AtomicUsize::new(0), empty: AtomicBool::new(false), difficulty: Difficulty::EASIEST }
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    pub fn set_empty(&self, empty: bool) {
        self.empty.store(empty, Ordering::SeqCst);
    }

    pub fn block_at(&self, number: u64) -> BlockRef {
        let header = Header::new(number, Hash::default(), self.difficulty, Address::default());
        Arc::new(Block::new(header, vec![], BigUint::from(10u32)))
    }
}

impl BlockBuilder for RecordingBuilder {
    fn build_wait_pack_block(&self, coinbase: Address, _gas_floor: u64, _gas_ceil: u64) -> Option<BlockRef> {
        if self.empty.load(Ordering::SeqCst) {
            return None;
        }
        self.built.fetch_add(1, Ordering::SeqCst);
        let number = self.next.fetch_add(1, Ordering::SeqCst);
        let header = Header::new(number, Hash::default(), self.difficulty, coinbase);
        Some(Arc::new(Block::new(header, vec![], BigUint::from(10u32))))
    }
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    blocks: Mutex<Vec<BlockRef>>,
}

impl RecordingBroadcaster {
    pub fn blocks(&self) -> Vec<BlockRef> {
        self.blocks.lock().clone()
    }

    pub fn heights(&self) -> Vec<u64> {
        self.blocks.lock().iter().map(|b| b.number()).collect()
    }
}

impl BlockBroadcaster for RecordingBroadcaster {
    fn broadcast_mined_block(&self, block: BlockRef) {
        self.blocks.lock().push(block);
    }
}

#[derive(Debug)]
pub struct RecordingWorker {
    id: WorkerId,
    coinbase: RwLock<Address>,
    works: Mutex<Vec<(MsgCode, Work)>>,
    started: AtomicUsize,
    stopped: AtomicUsize,
}

impl RecordingWorker {
    pub fn new(id: &str) -> Self {
        Self {
            id: WorkerId::from(id),
            coinbase: RwLock::new(Address::default()),
            works: Mutex::new(vec![]),
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
        }
    }

    pub fn works(&self) -> Vec<(MsgCode, Work)> {
        self.works.lock().clone()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl WorkerForMaster for RecordingWorker {
    fn start(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }

    fn id(&self) -> WorkerId {
        self.id.clone()
    }

    fn send_new_work(&self, code: MsgCode, work: Work) {
        self.works.lock().push((code, work));
    }

    fn set_coinbase(&self, coinbase: Address) {
        *self.coinbase.write() = coinbase;
    }

    fn current_coinbase_address(&self) -> Address {
        *self.coinbase.read()
    }
}

pub fn workers(list: &[Arc<RecordingWorker>]) -> Workers {
    list.iter().map(|w| (w.id(), w.clone() as WorkerRef)).collect::<HashMap<_, _>>()
}

pub fn config(builder: Arc<RecordingBuilder>) -> Arc<MineConfig> {
    config_with(builder).0
}

pub fn config_with(builder: Arc<RecordingBuilder>) -> (Arc<MineConfig>, Arc<RecordingBroadcaster>) {
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let config = MineConfig::new(
        Address::from_hex("0xc0ffee").unwrap(),
        builder,
        broadcaster.clone(),
        Arc::new(ChainEventBus::default()),
    );
    (Arc::new(config), broadcaster)
}
