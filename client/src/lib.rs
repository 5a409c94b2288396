use std::sync::Arc;

use mine_master::Server;
use rand::Rng;
use shared::types::{Address, WorkerId};

mod error;
mod executor;
mod local_connector;
mod miner;
mod remote_connector;
mod work_manager;
mod worker;

pub use error::{Result, WorkerError};
pub use executor::{WorkExecutor, WorkSubmitter};
pub use local_connector::LocalConnector;
pub use miner::Miner;
pub use remote_connector::RemoteConnector;
pub use work_manager::WorkManager;
pub use worker::{CoinbaseCell, Connector, MinerPool, Worker, WorkerOptions, DEFAULT_RECEIVE_TIMEOUT};

/// A worker living in the master's process. `threads == 0` uses every core.
pub fn make_local_worker(coinbase: Address, threads: usize, server: &Arc<Server>) -> Worker {
    make_local_worker_with(coinbase, WorkerOptions::with_threads(threads), server)
}

pub fn make_local_worker_with(coinbase: Address, options: WorkerOptions, server: &Arc<Server>) -> Worker {
    let id = WorkerId::from(format!("local-{:08x}", rand::thread_rng().gen::<u32>()));
    let coinbase = CoinbaseCell::new(coinbase);
    let pool = Arc::new(MinerPool::new(&options));

    let connector = LocalConnector::new(id, server.clone(), pool.clone(), coinbase.clone());
    let work_manager = Arc::new(WorkManager::new(pool.clone(), coinbase.clone(), connector.clone()));
    connector.bind(&work_manager);
    Worker::new(coinbase, pool, connector, work_manager)
}

/// A worker that talks to its master over a mine peer. Feed the returned
/// connector to a `MineProtocolManager` to attach it; it registers itself
/// once the peer is known.
pub fn make_remote_worker(coinbase: Address, threads: usize) -> (Worker, Arc<RemoteConnector>) {
    let options = WorkerOptions::with_threads(threads);
    let coinbase = CoinbaseCell::new(coinbase);
    let pool = Arc::new(MinerPool::new(&options));

    let connector = Arc::new(RemoteConnector::new(pool.clone(), coinbase.clone()));
    let work_manager = Arc::new(WorkManager::new(pool.clone(), coinbase.clone(), connector.clone()));
    connector.bind(&work_manager);
    (Worker::new(coinbase, pool, connector.clone(), work_manager), connector)
}
