use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::*;

use crate::{
    errors::{CodecError, PeerError},
    msg::{Msg, PROTOCOL_MAX_MSG_SIZE},
    peer::MinePeer,
};

pub const DEFAULT_MAX_PEERS: usize = 100;

pub trait PeerMsgHandler: Send + Sync {
    fn on_new_msg(&self, msg: Msg, peer: Arc<dyn MinePeer>) -> anyhow::Result<()>;

    /// Workers remember the peer they talk to; the master ignores this.
    fn set_mine_master_peer(&self, peer: Arc<dyn MinePeer>);
}

/// Per-peer read loops feeding a [`PeerMsgHandler`].
pub struct MineProtocolManager {
    handler: Arc<dyn PeerMsgHandler>,
    peers: RwLock<HashMap<String, Arc<dyn MinePeer>>>,
    max_peers: usize,
    max_msg_size: usize,
}

impl MineProtocolManager {
    pub fn new(handler: Arc<dyn PeerMsgHandler>) -> Self {
        Self {
            handler,
            peers: RwLock::new(HashMap::new()),
            max_peers: DEFAULT_MAX_PEERS,
            max_msg_size: PROTOCOL_MAX_MSG_SIZE,
        }
    }

    pub fn with_max_msg_size(mut self, max_msg_size: usize) -> Self {
        self.max_msg_size = max_msg_size;
        self
    }

    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Reads `inbox` until it closes or a message fails; the peer is removed
    /// and disconnected either way.
    pub async fn handle(&self, peer: Arc<dyn MinePeer>, mut inbox: UnboundedReceiver<Msg>) -> anyhow::Result<()> {
        let id = peer.id().to_string();
        {
            let mut peers = self.peers.write();
            if peers.len() >= self.max_peers {
                return Err(PeerError::TooManyPeers.into());
            }
            if peers.contains_key(&id) {
                return Err(PeerError::AlreadyConnected(id).into());
            }
            peers.insert(id.clone(), peer.clone());
        }
        info!(peer = %id, "new mine peer in");
        self.handler.set_mine_master_peer(peer.clone());

        let result = self.read_loop(&peer, &mut inbox).await;
        if let Err(err) = &result {
            info!(peer = %id, "handle mine peer msg failed, remove this peer: {err:#}");
        }
        self.remove_peer(&id);
        result
    }

    async fn read_loop(&self, peer: &Arc<dyn MinePeer>, inbox: &mut UnboundedReceiver<Msg>) -> anyhow::Result<()> {
        while let Some(msg) = inbox.recv().await {
            if msg.size() > self.max_msg_size {
                return Err(PeerError::from(CodecError::TooLarge { size: msg.size(), max: self.max_msg_size }).into());
            }
            let code = msg.code;
            self.handler
                .on_new_msg(msg, peer.clone())
                .with_context(|| format!("peer {} msg {code:#x}", peer.id()))?;
        }
        Ok(())
    }

    fn remove_peer(&self, id: &str) {
        if let Some(peer) = self.peers.write().remove(id) {
            peer.disconnect();
        }
    }
}
