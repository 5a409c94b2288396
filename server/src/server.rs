use std::sync::Arc;

use shared::{
    msg::{Msg, MsgCode, Register, SetCurrentCoinbase},
    peer::MinePeer,
    protocol::PeerMsgHandler,
    types::WorkerId,
    work::Work,
};
use tracing::*;

use crate::{
    dispatcher::CurrentBlock,
    error::{MasterError, Result},
    interface::{MasterServer, WorkerRef},
    master::MasterHandle,
    remote_worker::RemoteWorker,
    work_manager::WorkManager,
};

/// Receives worker traffic, local or remote, and feeds the master.
pub struct Server {
    master: MasterHandle,
    cur_block: CurrentBlock,
    work_manager: Arc<WorkManager>,
}

impl Server {
    pub(crate) fn new(master: MasterHandle, cur_block: CurrentBlock, work_manager: Arc<WorkManager>) -> Self {
        Self { master, cur_block, work_manager }
    }

    /// Seals a copy of the current candidate with the submitted nonce and
    /// hands it to the work manager if the hash meets the difficulty.
    fn on_submit_block(&self, id: &WorkerId, work: Work) {
        let Some(cur) = self.cur_block.get() else {
            warn!(worker_id = %id, "receive submit, but no work block");
            return;
        };
        debug!(worker_id = %id, height = cur.number(), txs = cur.tx_count(), "on submit block");

        let mut block = cur.clone_block();
        if let Err(err) = work.fill_seal_result(block.as_mut()) {
            warn!(worker_id = %id, "fill seal result failed: {err}");
            return;
        }

        let hash = block.refresh_hash_cache();
        if !hash.valid_for_difficulty(block.difficulty()) {
            // races between dispatches make this legitimate; the worker stays
            warn!(worker_id = %id, %hash, "master receive invalid mined block");
            return;
        }

        info!(worker_id = %id, height = block.number(), %hash, "mine master accept mined block");
        self.work_manager.submit_block(work.worker_coinbase_address(), Arc::from(block));
    }

    fn dispatch_msg(&self, msg: Msg, peer: Arc<dyn MinePeer>) -> Result<()> {
        let id = WorkerId::from(peer.id());
        let code = MsgCode::try_from(msg.code).map_err(|_| MasterError::UnknownMsg(msg.code))?;
        match code {
            MsgCode::Register => {
                let register = Register::decode(&msg.payload)?;
                let worker = RemoteWorker::new(peer, register.coinbase, id)?;
                self.register_worker(Arc::new(worker));
            }
            MsgCode::UnRegister => {
                info!(worker_id = %id, "receive un register msg");
                self.unregister_worker(&id);
            }
            MsgCode::SetCurrentCoinbase => {
                let req = SetCurrentCoinbase::decode(&msg.payload)?;
                self.master.set_worker_coinbase(id, req.coinbase);
            }
            MsgCode::SubmitDefaultWork => {
                let work = Work::decode(code, &msg.payload)?;
                self.receive_msg(&id, code, work);
            }
            other => {
                warn!(worker_id = %id, ?other, "receive unknown msg");
                return Err(MasterError::UnknownMsg(msg.code));
            }
        }
        Ok(())
    }
}

impl MasterServer for Server {
    fn register_worker(&self, worker: WorkerRef) {
        self.master.register_worker(worker);
    }

    fn unregister_worker(&self, id: &WorkerId) {
        self.master.unregister_worker(id.clone());
    }

    fn receive_msg(&self, id: &WorkerId, code: MsgCode, work: Work) {
        match code {
            MsgCode::SubmitDefaultWork => {
                // wait for the block to come back through the chain
                self.master.start_wait_timer();
                self.on_submit_block(id, work);
            }
            other => debug!(worker_id = %id, ?other, "receive wrong msg"),
        }
    }
}

impl PeerMsgHandler for Server {
    fn on_new_msg(&self, msg: Msg, peer: Arc<dyn MinePeer>) -> anyhow::Result<()> {
        Ok(self.dispatch_msg(msg, peer)?)
    }

    fn set_mine_master_peer(&self, _peer: Arc<dyn MinePeer>) {}
}
