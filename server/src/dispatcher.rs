use std::sync::Arc;

use parking_lot::RwLock;
use shared::{model::BlockRef, work::build_works};
use tracing::*;

use crate::{
    config::MineConfig,
    error::{MasterError, Result},
    interface::Workers,
};

/// The candidate block currently being mined. Written by the dispatcher,
/// read by the submission path.
#[derive(Clone, Default)]
pub struct CurrentBlock(Arc<RwLock<Option<BlockRef>>>);

impl CurrentBlock {
    pub fn get(&self) -> Option<BlockRef> {
        self.0.read().clone()
    }

    fn set(&self, block: BlockRef) {
        *self.0.write() = Some(block);
    }
}

/// Builds candidate blocks and splits them across workers. Runs on the
/// caller's task; the worker set is passed in by the master loop that owns it.
pub struct WorkDispatcher {
    config: Arc<MineConfig>,
    cur_block: CurrentBlock,
}

impl WorkDispatcher {
    pub fn new(config: Arc<MineConfig>, cur_block: CurrentBlock) -> Self {
        Self { config, cur_block }
    }

    /// New block numbers equal to or above the current work block reset the
    /// work and dispatch again.
    pub fn on_new_block(&self, block: &BlockRef, workers: &Workers) -> Result<()> {
        if let Some(cur) = self.cur_work_block() {
            if block.number() < cur.number() {
                return Err(MasterError::StaleBlock { new: block.number(), current: cur.number() });
            }
        }
        self.dispatch_new_work(workers)
    }

    pub fn dispatch_new_work(&self, workers: &Workers) -> Result<()> {
        if workers.is_empty() {
            error!("no worker to dispatch work");
            return Err(MasterError::NoWorker);
        }

        let coinbase = self.config.coinbase();
        let block = self
            .config
            .block_builder
            .build_wait_pack_block(coinbase, self.config.gas_floor(), self.config.gas_ceil())
            .ok_or(MasterError::BuildWorksFailed)?;
        let (code, works) = build_works(block.as_ref(), workers.len());
        self.cur_block.set(block.clone());

        // stable partition order across dispatches
        let mut targets: Vec<_> = workers.values().collect();
        targets.sort_by(|a, b| a.id().cmp(&b.id()));
        for (worker, work) in targets.into_iter().zip(works) {
            worker.send_new_work(code, work);
        }
        info!(height = block.number(), txs = block.tx_count(), workers = workers.len(), "finish dispatch work");
        Ok(())
    }

    pub fn cur_work_block(&self) -> Option<BlockRef> {
        self.cur_block.get()
    }
}
