use std::sync::Arc;

use tokio::sync::mpsc;

mod config;
mod dispatcher;
mod error;
mod events;
mod interface;
mod master;
mod remote_worker;
mod server;
mod work_manager;

#[cfg(test)]
mod mock;

pub use config::{load_config_file, MasterOptions, MineConfig};
pub use dispatcher::{CurrentBlock, WorkDispatcher};
pub use error::{MasterError, Result};
pub use events::ChainEventBus;
pub use interface::{BlockBroadcaster, BlockBuilder, MasterServer, RewardSender, WorkerForMaster, WorkerRef, Workers};
pub use master::Master;
pub use remote_worker::RemoteWorker;
pub use server::Server;
pub use work_manager::WorkManager;

use crate::master::MasterHandle;

/// Wires a master with its dispatcher, work manager and server side decoder.
/// Register workers through the returned server.
pub fn make_mine_master(config: Arc<MineConfig>, options: MasterOptions) -> (Master, Arc<Server>) {
    let cur_block = CurrentBlock::default();
    let work_manager = Arc::new(WorkManager::new(config.block_broadcaster.clone()));
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = MasterHandle::new(tx);

    let server = Arc::new(Server::new(handle.clone(), cur_block.clone(), work_manager.clone()));
    let master = Master::new(config, options, cur_block, work_manager, handle, rx);
    (master, server)
}
