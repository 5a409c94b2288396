use std::{collections::HashMap, fmt::Debug, sync::Arc};

use num_bigint::BigUint;
use shared::{
    model::BlockRef,
    msg::MsgCode,
    protocol::PeerMsgHandler,
    types::{Address, WorkerId},
    work::Work,
};

/// A worker as seen by the master. Local and remote workers look the same.
pub trait WorkerForMaster: Debug + Send + Sync {
    /// Starts the worker's mining threads.
    fn start(&self);
    fn stop(&self);
    fn id(&self) -> WorkerId;
    /// Must not block the caller.
    fn send_new_work(&self, code: MsgCode, work: Work);
    fn set_coinbase(&self, coinbase: Address);
    fn current_coinbase_address(&self) -> Address;
}

pub type WorkerRef = Arc<dyn WorkerForMaster>;
pub type Workers = HashMap<WorkerId, WorkerRef>;

/// Entry points used by connectors and the mine protocol.
pub trait MasterServer: PeerMsgHandler {
    fn register_worker(&self, worker: WorkerRef);
    fn unregister_worker(&self, id: &WorkerId);
    /// Single entry for worker submissions; codes other than
    /// `SubmitDefaultWork` are dropped.
    fn receive_msg(&self, id: &WorkerId, code: MsgCode, work: Work);
}

pub trait BlockBuilder: Send + Sync {
    /// A fresh unmined candidate, or `None` if nothing can be built yet.
    fn build_wait_pack_block(&self, coinbase: Address, gas_floor: u64, gas_ceil: u64) -> Option<BlockRef>;
}

pub trait BlockBroadcaster: Send + Sync {
    fn broadcast_mined_block(&self, block: BlockRef);
}

/// Pays out a worker's reward before the ledgers are cleared.
pub trait RewardSender: Send + Sync {
    fn send_reward(&self, address: Address, reward: BigUint);
}
