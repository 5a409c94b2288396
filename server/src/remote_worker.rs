use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use shared::{
    msg::MsgCode,
    peer::MinePeer,
    types::{Address, WorkerId},
    work::Work,
};
use tracing::*;

use crate::{
    error::{MasterError, Result},
    interface::WorkerForMaster,
};

/// A worker on the other end of a mine peer.
#[derive(Debug)]
pub struct RemoteWorker {
    id: WorkerId,
    peer: Arc<dyn MinePeer>,
    coinbase: RwLock<Address>,
}

impl RemoteWorker {
    pub fn new(peer: Arc<dyn MinePeer>, coinbase: Address, id: WorkerId) -> Result<Self> {
        if coinbase.is_zero() || id.as_str().is_empty() {
            return Err(MasterError::InvalidWorker);
        }
        Ok(Self { id, peer, coinbase: RwLock::new(coinbase) })
    }

    fn send(&self, code: MsgCode, payload: Bytes) {
        if let Err(err) = self.peer.send_msg(code, payload) {
            warn!(worker_id = %self.id, ?code, "send msg to remote worker failed: {err}");
        }
    }
}

impl WorkerForMaster for RemoteWorker {
    fn start(&self) {
        self.send(MsgCode::StartMine, Bytes::new());
    }

    fn stop(&self) {
        self.send(MsgCode::StopMine, Bytes::new());
    }

    fn id(&self) -> WorkerId {
        self.id.clone()
    }

    fn send_new_work(&self, code: MsgCode, work: Work) {
        match work.encode() {
            Ok(payload) => self.send(code, payload),
            Err(err) => error!(worker_id = %self.id, "encode work failed: {err}"),
        }
    }

    fn set_coinbase(&self, coinbase: Address) {
        *self.coinbase.write() = coinbase;
    }

    fn current_coinbase_address(&self) -> Address {
        *self.coinbase.read()
    }
}
