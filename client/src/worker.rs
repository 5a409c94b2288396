use std::{sync::Arc, time::Duration};

use parking_lot::{Mutex, RwLock};
use shared::{msg::MsgCode, types::Address, work::Work};
use tracing::*;

use crate::{error::Result, executor::WorkExecutor, miner::Miner, work_manager::WorkManager};

pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub threads: usize,
    /// Budget for handing a new work to one mining thread.
    pub receive_timeout: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self { threads: num_cpus::get(), receive_timeout: DEFAULT_RECEIVE_TIMEOUT }
    }
}

impl WorkerOptions {
    pub fn with_threads(threads: usize) -> Self {
        let mut options = Self::default();
        if threads > 0 {
            options.threads = threads;
        }
        options
    }
}

/// Coinbase shared by a worker and its connector.
#[derive(Debug, Clone, Default)]
pub struct CoinbaseCell(Arc<RwLock<Address>>);

impl CoinbaseCell {
    pub fn new(address: Address) -> Self {
        Self(Arc::new(RwLock::new(address)))
    }

    pub fn get(&self) -> Address {
        *self.0.read()
    }

    pub fn set(&self, address: Address) {
        *self.0.write() = address;
    }
}

/// The mining threads of one worker. Start and stop are serialized.
pub struct MinerPool {
    miners: Vec<Arc<Miner>>,
    lock: Mutex<()>,
}

impl MinerPool {
    pub fn new(options: &WorkerOptions) -> Self {
        let cores = core_affinity::get_core_ids().unwrap_or_default();
        let miners = (0..options.threads.max(1))
            .map(|index| {
                let core = if cores.is_empty() { None } else { Some(cores[index % cores.len()]) };
                Arc::new(Miner::new(index, core, options.receive_timeout))
            })
            .collect();
        Self { miners, lock: Mutex::new(()) }
    }

    pub fn len(&self) -> usize {
        self.miners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.miners.is_empty()
    }

    pub fn miners(&self) -> &[Arc<Miner>] {
        &self.miners
    }

    pub fn start(&self) {
        let _guard = self.lock.lock();
        for miner in &self.miners {
            miner.start();
        }
        info!(threads = self.miners.len(), "miners started");
    }

    pub fn stop(&self) {
        let _guard = self.lock.lock();
        for miner in &self.miners {
            miner.stop();
        }
        info!(threads = self.miners.len(), "miners stopped");
    }

    /// Parks every thread until the next work.
    pub fn wait_for_commit(&self) {
        std::thread::scope(|s| {
            for miner in &self.miners {
                s.spawn(move || miner.receive_work(None));
            }
        });
    }

    /// Routes executor `i` to thread `i`, all threads in parallel.
    pub fn dispatch(&self, executors: Vec<WorkExecutor>) {
        std::thread::scope(|s| {
            for (miner, executor) in self.miners.iter().zip(executors) {
                s.spawn(move || miner.receive_work(Some(executor)));
            }
        });
    }
}

/// The worker's link to its master.
pub trait Connector: Send + Sync {
    fn register(&self) -> Result<()>;
    fn unregister(&self) -> Result<()>;
    fn set_coinbase(&self, coinbase: Address) -> Result<()>;
    fn send_msg(&self, code: MsgCode, work: Work) -> Result<()>;
}

pub struct Worker {
    coinbase: CoinbaseCell,
    pool: Arc<MinerPool>,
    connector: Arc<dyn Connector>,
    work_manager: Arc<WorkManager>,
}

impl Worker {
    pub(crate) fn new(
        coinbase: CoinbaseCell,
        pool: Arc<MinerPool>,
        connector: Arc<dyn Connector>,
        work_manager: Arc<WorkManager>,
    ) -> Self {
        Self { coinbase, pool, connector, work_manager }
    }

    /// Registers with the master, then starts the mining threads.
    pub fn start(&self) -> Result<()> {
        self.connector.register()?;
        self.pool.start();
        Ok(())
    }

    /// Stops the threads. The worker stays registered.
    pub fn stop(&self) {
        self.pool.stop();
    }

    pub fn unregister(&self) -> Result<()> {
        self.connector.unregister()
    }

    pub fn set_coinbase_address(&self, address: Address) -> Result<()> {
        self.coinbase.set(address);
        self.connector.set_coinbase(address)
    }

    pub fn current_coinbase_address(&self) -> Address {
        self.coinbase.get()
    }

    pub fn miners(&self) -> &[Arc<Miner>] {
        self.pool.miners()
    }

    pub fn hashes(&self) -> u64 {
        self.pool.miners().iter().map(|m| m.hashes()).sum()
    }

    pub fn work_manager(&self) -> &Arc<WorkManager> {
        &self.work_manager
    }
}
