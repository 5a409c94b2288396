use std::{
    fmt,
    sync::{Arc, OnceLock, Weak},
};

use mine_master::{MasterServer, Server, WorkerForMaster};
use shared::{
    msg::MsgCode,
    types::{Address, WorkerId},
    work::Work,
};
use tracing::*;

use crate::{
    error::Result,
    work_manager::WorkManager,
    worker::{CoinbaseCell, Connector, MinerPool},
};

/// In-process link between a worker and a master server. Calls in both
/// directions run on their own threads so neither side blocks the other.
pub struct LocalConnector {
    id: WorkerId,
    myself: Weak<LocalConnector>,
    server: Arc<Server>,
    pool: Arc<MinerPool>,
    coinbase: CoinbaseCell,
    work_manager: OnceLock<Weak<WorkManager>>,
}

impl LocalConnector {
    pub fn new(id: WorkerId, server: Arc<Server>, pool: Arc<MinerPool>, coinbase: CoinbaseCell) -> Arc<Self> {
        Arc::new_cyclic(|myself| Self {
            id,
            myself: myself.clone(),
            server,
            pool,
            coinbase,
            work_manager: OnceLock::new(),
        })
    }

    pub(crate) fn bind(&self, work_manager: &Arc<WorkManager>) {
        let _ = self.work_manager.set(Arc::downgrade(work_manager));
    }
}

impl fmt::Debug for LocalConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalConnector").field("id", &self.id).finish()
    }
}

impl Connector for LocalConnector {
    fn register(&self) -> Result<()> {
        if let Some(me) = self.myself.upgrade() {
            info!(worker_id = %self.id, "register local worker");
            self.server.register_worker(me);
        }
        Ok(())
    }

    fn unregister(&self) -> Result<()> {
        self.server.unregister_worker(&self.id);
        Ok(())
    }

    // the master reads the shared cell directly
    fn set_coinbase(&self, _coinbase: Address) -> Result<()> {
        Ok(())
    }

    fn send_msg(&self, code: MsgCode, work: Work) -> Result<()> {
        let server = self.server.clone();
        let id = self.id.clone();
        std::thread::spawn(move || server.receive_msg(&id, code, work));
        Ok(())
    }
}

impl WorkerForMaster for LocalConnector {
    fn start(&self) {
        self.pool.start();
    }

    fn stop(&self) {
        self.pool.stop();
    }

    fn id(&self) -> WorkerId {
        self.id.clone()
    }

    fn send_new_work(&self, code: MsgCode, work: Work) {
        let Some(work_manager) = self.work_manager.get().and_then(Weak::upgrade) else {
            warn!(worker_id = %self.id, "local worker dropped, skip new work");
            return;
        };
        let id = self.id.clone();
        std::thread::spawn(move || {
            if let Err(err) = work_manager.on_new_work(code, work) {
                warn!(worker_id = %id, "local worker reject work: {err}");
            }
        });
    }

    fn set_coinbase(&self, coinbase: Address) {
        self.coinbase.set(coinbase);
    }

    fn current_coinbase_address(&self) -> Address {
        self.coinbase.get()
    }
}
