#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use mine_master::{
    make_mine_master, BlockBroadcaster, BlockBuilder, ChainEventBus, Master, MasterOptions, MineConfig, RewardSender,
    Server,
};
use num_bigint::BigUint;
use parking_lot::Mutex;
use shared::{
    model::{Block, BlockRef, Header, Transaction},
    msg::{Msg, MsgCode, Register},
    peer::{pipe, PipePeer},
    protocol::PeerMsgHandler,
    types::{Address, Difficulty, Hash},
    work::Work,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub fn addr(s: &str) -> Address {
    Address::from_hex(s).unwrap()
}

pub fn master_coinbase() -> Address {
    addr("0xc0ffee")
}

pub fn block(number: u64, coinbase: Address, reward: u32, fee: u32) -> BlockRef {
    let header = Header::new(number, Hash::default(), Difficulty::EASIEST, coinbase);
    let txs = vec![Transaction { fee: BigUint::from(fee), ..Default::default() }];
    Arc::new(Block::new(header, txs, BigUint::from(reward)))
}

/// Builds numbered candidates and records mined blocks. With a bus attached
/// every mined block is confirmed right away.
pub struct TestChain {
    next: AtomicU64,
    built: AtomicUsize,
    difficulty: Difficulty,
    mined: Mutex<Vec<BlockRef>>,
    bus: Option<Arc<ChainEventBus>>,
}

impl TestChain {
    pub fn new(difficulty: Difficulty) -> Arc<Self> {
        Arc::new(Self::with(difficulty, None))
    }

    pub fn confirming(difficulty: Difficulty, bus: Arc<ChainEventBus>) -> Arc<Self> {
        Arc::new(Self::with(difficulty, Some(bus)))
    }

    fn with(difficulty: Difficulty, bus: Option<Arc<ChainEventBus>>) -> Self {
        Self { next: AtomicU64::new(1), built: AtomicUsize::new(0), difficulty, mined: Mutex::new(vec![]), bus }
    }

    pub fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    pub fn mined(&self) -> Vec<BlockRef> {
        self.mined.lock().clone()
    }
}

impl BlockBuilder for TestChain {
    fn build_wait_pack_block(&self, coinbase: Address, _gas_floor: u64, _gas_ceil: u64) -> Option<BlockRef> {
        self.built.fetch_add(1, Ordering::SeqCst);
        let number = self.next.fetch_add(1, Ordering::SeqCst);
        let header = Header::new(number, Hash::default(), self.difficulty, coinbase);
        Some(Arc::new(Block::new(header, vec![], BigUint::from(10u32))))
    }
}

impl BlockBroadcaster for TestChain {
    fn broadcast_mined_block(&self, block: BlockRef) {
        self.mined.lock().push(block.clone());
        if let Some(bus) = &self.bus {
            bus.publish(block);
        }
    }
}

#[derive(Default)]
pub struct Payouts(pub Mutex<Vec<(Address, BigUint)>>);

impl RewardSender for Payouts {
    fn send_reward(&self, address: Address, reward: BigUint) {
        self.0.lock().push((address, reward));
    }
}

pub fn master_with(chain: Arc<TestChain>, bus: Arc<ChainEventBus>, options: MasterOptions) -> (Master, Arc<Server>) {
    let config = MineConfig::new(master_coinbase(), chain.clone(), chain, bus);
    make_mine_master(Arc::new(config), options)
}

pub fn master(chain: Arc<TestChain>, options: MasterOptions) -> (Master, Arc<Server>) {
    master_with(chain, Arc::new(ChainEventBus::default()), options)
}

pub fn fast_options() -> MasterOptions {
    MasterOptions { worker_connect_delay_ms: 10, ..Default::default() }
}

/// Round trips through the master loop so earlier messages are applied.
pub async fn settle(master: &Master) {
    master.workers().await;
}

pub async fn eventually(what: &str, f: impl Fn() -> bool) {
    for _ in 0..1000 {
        if f() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// A remote worker driven by hand over an in-memory peer.
pub struct FakeRemote {
    pub to_master: Arc<PipePeer>,
    pub inbox: UnboundedReceiver<Msg>,
}

impl FakeRemote {
    pub fn attach(server: &Arc<Server>, id: &str, coinbase: Address) -> Self {
        let (master_side, worker_side) = pipe("master", id);
        let register = Msg::with_payload(MsgCode::Register, Register { coinbase }.encode().unwrap());
        server.on_new_msg(register, master_side.peer.clone()).unwrap();
        Self { to_master: master_side.peer, inbox: worker_side.inbox }
    }

    pub fn works(&mut self) -> Vec<Work> {
        let mut works = vec![];
        while let Ok(msg) = self.inbox.try_recv() {
            if msg.msg_code().unwrap() == MsgCode::NewDefaultWork {
                works.push(Work::decode(MsgCode::NewDefaultWork, &msg.payload).unwrap());
            }
        }
        works
    }

    pub fn next_work(&mut self) -> Work {
        self.works().pop().expect("no work received")
    }

    /// Submits `work` as solved at its current nonce.
    pub fn submit(&self, server: &Arc<Server>, work: Work, coinbase: Address) -> anyhow::Result<()> {
        let Work::Default(mut work) = work;
        work.worker_coinbase_address = coinbase;
        work.result_nonce = work.block_header.nonce;
        let msg = Msg::with_payload(MsgCode::SubmitDefaultWork, Work::Default(work).encode().unwrap());
        server.on_new_msg(msg, self.to_master.clone())
    }
}
