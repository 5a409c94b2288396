use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::{
    errors::{PeerError, PeerResult},
    msg::{Msg, MsgCode},
};

/// The far side of a mine protocol connection.
pub trait MinePeer: Debug + Send + Sync {
    fn id(&self) -> &str;

    fn send_msg(&self, code: MsgCode, payload: Bytes) -> PeerResult<()>;

    fn disconnect(&self);
}

/// In-process transport: messages sent on one end arrive in the other end's
/// inbox.
#[derive(Debug)]
pub struct PipePeer {
    id: String,
    tx: UnboundedSender<Msg>,
    closed: AtomicBool,
}

impl MinePeer for PipePeer {
    fn id(&self) -> &str {
        &self.id
    }

    fn send_msg(&self, code: MsgCode, payload: Bytes) -> PeerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PeerError::Closed(self.id.clone()));
        }
        self.tx.send(Msg::with_payload(code, payload)).map_err(|_| PeerError::Closed(self.id.clone()))
    }

    fn disconnect(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

pub struct PipeEnd {
    /// Handle to the remote side.
    pub peer: Arc<PipePeer>,
    pub inbox: UnboundedReceiver<Msg>,
}

/// Returns `(local, remote)`. `local.peer` sends to the remote side and has
/// id `remote_id`, and the other way round.
pub fn pipe(local_id: &str, remote_id: &str) -> (PipeEnd, PipeEnd) {
    let (to_remote, remote_inbox) = mpsc::unbounded_channel();
    let (to_local, local_inbox) = mpsc::unbounded_channel();

    let local = PipeEnd {
        peer: Arc::new(PipePeer { id: remote_id.to_string(), tx: to_remote, closed: AtomicBool::new(false) }),
        inbox: local_inbox,
    };
    let remote = PipeEnd {
        peer: Arc::new(PipePeer { id: local_id.to_string(), tx: to_local, closed: AtomicBool::new(false) }),
        inbox: remote_inbox,
    };
    (local, remote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pipe_delivers_both_ways() {
        let (mut master, mut worker) = pipe("master", "worker-1");
        assert_eq!(master.peer.id(), "worker-1");
        assert_eq!(worker.peer.id(), "master");

        master.peer.send_msg(MsgCode::StartMine, Bytes::new()).unwrap();
        worker.peer.send_msg(MsgCode::UnRegister, Bytes::new()).unwrap();

        assert_eq!(worker.inbox.recv().await.unwrap().code, 0x01);
        assert_eq!(master.inbox.recv().await.unwrap().code, 0x51);
    }

    #[test]
    fn disconnected_peer_refuses_sends() {
        let (master, _worker) = pipe("master", "worker-1");
        master.peer.disconnect();
        assert!(matches!(master.peer.send_msg(MsgCode::StopMine, Bytes::new()), Err(PeerError::Closed(_))));
    }
}
