use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use shared::{
    msg::{Msg, MsgCode, Register, SetCurrentCoinbase},
    peer::MinePeer,
    protocol::PeerMsgHandler,
    types::Address,
    work::Work,
};
use tracing::*;

use crate::{
    error::{Result, WorkerError},
    work_manager::WorkManager,
    worker::{CoinbaseCell, Connector, MinerPool},
};

/// Worker half of the mine protocol.
pub struct RemoteConnector {
    peer: RwLock<Option<Arc<dyn MinePeer>>>,
    pool: Arc<MinerPool>,
    coinbase: CoinbaseCell,
    work_manager: OnceLock<Weak<WorkManager>>,
}

impl RemoteConnector {
    pub fn new(pool: Arc<MinerPool>, coinbase: CoinbaseCell) -> Self {
        Self { peer: RwLock::new(None), pool, coinbase, work_manager: OnceLock::new() }
    }

    pub(crate) fn bind(&self, work_manager: &Arc<WorkManager>) {
        let _ = self.work_manager.set(Arc::downgrade(work_manager));
    }

    fn peer(&self) -> Result<Arc<dyn MinePeer>> {
        self.peer.read().clone().ok_or(WorkerError::NoMasterPeer)
    }

    fn on_new_work(&self, code: MsgCode, work: Work) {
        let Some(work_manager) = self.work_manager.get().and_then(Weak::upgrade) else {
            warn!("remote worker dropped, skip new work");
            return;
        };
        std::thread::spawn(move || {
            if let Err(err) = work_manager.on_new_work(code, work) {
                warn!("remote worker reject work: {err}");
            }
        });
    }
}

impl Connector for RemoteConnector {
    fn register(&self) -> Result<()> {
        let payload = Register { coinbase: self.coinbase.get() }.encode()?;
        self.peer()?.send_msg(MsgCode::Register, payload)?;
        Ok(())
    }

    fn unregister(&self) -> Result<()> {
        self.peer()?.send_msg(MsgCode::UnRegister, Default::default())?;
        Ok(())
    }

    fn set_coinbase(&self, coinbase: Address) -> Result<()> {
        let payload = SetCurrentCoinbase { coinbase }.encode()?;
        self.peer()?.send_msg(MsgCode::SetCurrentCoinbase, payload)?;
        Ok(())
    }

    fn send_msg(&self, code: MsgCode, work: Work) -> Result<()> {
        let payload = work.encode()?;
        self.peer()?.send_msg(code, payload)?;
        Ok(())
    }
}

impl PeerMsgHandler for RemoteConnector {
    fn on_new_msg(&self, msg: Msg, _peer: Arc<dyn MinePeer>) -> anyhow::Result<()> {
        let code = msg.msg_code()?;
        debug!(?code, size = msg.size(), "receive msg from master");
        match code {
            MsgCode::StartMine => self.pool.start(),
            MsgCode::StopMine => self.pool.stop(),
            MsgCode::WaitForCommit => {
                let pool = self.pool.clone();
                std::thread::spawn(move || pool.wait_for_commit());
            }
            MsgCode::NewDefaultWork => {
                let work = Work::decode(code, &msg.payload)?;
                self.on_new_work(code, work);
            }
            other => return Err(WorkerError::UnexpectedWork(other.into()).into()),
        }
        Ok(())
    }

    fn set_mine_master_peer(&self, peer: Arc<dyn MinePeer>) {
        info!(peer = peer.id(), "set mine master peer");
        *self.peer.write() = Some(peer);
        if let Err(err) = self.register() {
            warn!("register to mine master failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use shared::{
        model::Header,
        peer::{pipe, PipeEnd},
        types::{Difficulty, Hash},
        work::DefaultWork,
    };

    use super::*;
    use crate::worker::WorkerOptions;

    fn connector() -> (Arc<RemoteConnector>, Address) {
        let pool = Arc::new(MinerPool::new(&WorkerOptions::with_threads(1)));
        let coinbase = Address::from_hex("0xabcd").unwrap();
        (Arc::new(RemoteConnector::new(pool, CoinbaseCell::new(coinbase))), coinbase)
    }

    fn attach(connector: &RemoteConnector) -> PipeEnd {
        let (worker_end, master_end) = pipe("worker", "master");
        connector.set_mine_master_peer(worker_end.peer);
        master_end
    }

    #[test]
    fn no_peer_no_send() {
        let (connector, _) = connector();
        assert!(matches!(connector.register(), Err(WorkerError::NoMasterPeer)));
        assert!(matches!(connector.unregister(), Err(WorkerError::NoMasterPeer)));
    }

    #[test]
    fn registers_once_peer_is_set() {
        let (connector, coinbase) = connector();
        let mut master = attach(&connector);

        let msg = master.inbox.try_recv().unwrap();
        assert_eq!(msg.msg_code().unwrap(), MsgCode::Register);
        assert_eq!(Register::decode(&msg.payload).unwrap().coinbase, coinbase);

        let next = Address::from_hex("0x01").unwrap();
        connector.set_coinbase(next).unwrap();
        let msg = master.inbox.try_recv().unwrap();
        assert_eq!(SetCurrentCoinbase::decode(&msg.payload).unwrap().coinbase, next);

        let work = Work::Default(DefaultWork::new(Header::new(2, Hash::default(), Difficulty::EASIEST, coinbase)));
        connector.send_msg(MsgCode::SubmitDefaultWork, work.clone()).unwrap();
        let msg = master.inbox.try_recv().unwrap();
        assert_eq!(Work::decode(MsgCode::SubmitDefaultWork, &msg.payload).unwrap(), work);
    }

    #[test]
    fn control_msgs_drive_the_pool() {
        let (connector, _) = connector();
        let master = attach(&connector);
        let peer: Arc<dyn MinePeer> = master.peer;

        connector.on_new_msg(Msg::new(MsgCode::StartMine), peer.clone()).unwrap();
        assert!(connector.pool.miners()[0].is_running());
        connector.on_new_msg(Msg::new(MsgCode::StopMine), peer).unwrap();
        assert!(!connector.pool.miners()[0].is_running());
    }

    #[test]
    fn rejects_worker_bound_codes() {
        let (connector, _) = connector();
        let master = attach(&connector);
        let peer: Arc<dyn MinePeer> = master.peer;

        let err = connector.on_new_msg(Msg::new(MsgCode::Register), peer.clone()).unwrap_err();
        assert!(matches!(err.downcast_ref::<WorkerError>(), Some(WorkerError::UnexpectedWork(0x50))));

        let unknown = Msg { code: 0x99, payload: Default::default() };
        assert!(connector.on_new_msg(unknown, peer.clone()).is_err());

        let garbage = Msg::with_payload(MsgCode::NewDefaultWork, bytes::Bytes::from_static(&[9, 9]));
        assert!(connector.on_new_msg(garbage, peer).is_err());
    }
}
