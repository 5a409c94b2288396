use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use num_bigint::BigUint;
use num_traits::Zero;
use parking_lot::RwLock;
use shared::{
    model::BlockRef,
    types::{Address, WorkerId},
};
use tokio::{
    sync::{broadcast::error::RecvError, mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::*;

pub(crate) use messages::MasterMessage;

use crate::{
    config::{MasterOptions, MineConfig},
    dispatcher::{CurrentBlock, WorkDispatcher},
    error::{MasterError, Result},
    interface::{RewardSender, WorkerRef, Workers},
    work_manager::WorkManager,
};

/// Cloneable sender side of the master loop, used by the server and the
/// public [`Master`] methods.
#[derive(Clone)]
pub(crate) struct MasterHandle {
    tx: mpsc::UnboundedSender<MasterMessage>,
    mining: Arc<AtomicBool>,
}

impl MasterHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<MasterMessage>) -> Self {
        Self { tx, mining: Arc::new(AtomicBool::new(false)) }
    }

    fn send(&self, msg: MasterMessage) {
        if self.tx.send(msg).is_err() {
            warn!("mine master loop closed, msg dropped");
        }
    }

    pub(crate) fn mining(&self) -> bool {
        self.mining.load(Ordering::Acquire)
    }

    /// Queued while stopped; applied when the loop runs or the workers are
    /// listed.
    pub(crate) fn register_worker(&self, worker: WorkerRef) {
        self.send(MasterMessage::Register(worker));
    }

    pub(crate) fn unregister_worker(&self, id: WorkerId) {
        self.send(MasterMessage::UnRegister(id));
    }

    pub(crate) fn set_worker_coinbase(&self, id: WorkerId, coinbase: Address) {
        self.send(MasterMessage::SetWorkerCoinbase { id, coinbase });
    }

    pub(crate) fn start_wait_timer(&self) {
        if self.mining() {
            self.send(MasterMessage::StartWaitTimer);
        }
    }

    pub(crate) fn on_new_block(&self, block: BlockRef) {
        if self.mining() {
            self.send(MasterMessage::OnNewBlock(block));
        }
    }
}

enum Run {
    Stopped(Box<MasterLoop>),
    Running { stop: CancellationToken, task: JoinHandle<MasterLoop> },
    /// The loop task panicked; its state is gone.
    Failed,
}

pub struct Master {
    config: Arc<MineConfig>,
    options: MasterOptions,
    handle: MasterHandle,
    cur_block: CurrentBlock,
    work_manager: Arc<WorkManager>,
    reward_sender: RwLock<Option<Arc<dyn RewardSender>>>,
    run: Mutex<Run>,
}

impl Master {
    pub(crate) fn new(
        config: Arc<MineConfig>,
        options: MasterOptions,
        cur_block: CurrentBlock,
        work_manager: Arc<WorkManager>,
        handle: MasterHandle,
        messages: mpsc::UnboundedReceiver<MasterMessage>,
    ) -> Self {
        let (timeout_tx, timeout_rx) = mpsc::unbounded_channel();
        let state = MasterLoop {
            config: config.clone(),
            options: options.clone(),
            dispatcher: WorkDispatcher::new(config.clone(), cur_block.clone()),
            work_manager: work_manager.clone(),
            workers: Workers::new(),
            cur_new_block_height: 0,
            messages,
            timeout_tx,
            timeout_rx,
            wait_timer: None,
            timer_epoch: 0,
        };
        Self {
            config,
            options,
            handle,
            cur_block,
            work_manager,
            reward_sender: RwLock::new(None),
            run: Mutex::new(Run::Stopped(Box::new(state))),
        }
    }

    /// Runs the loop, starts the workers and issues the first dispatch. If
    /// that dispatch fails the master is stopped again and the error returned.
    pub async fn start(&self) -> Result<()> {
        let mut run = self.run.lock().await;
        let state = match std::mem::replace(&mut *run, Run::Failed) {
            Run::Stopped(state) => state,
            Run::Running { stop, task } => {
                *run = Run::Running { stop, task };
                info!("call mine master start, but it already started");
                return Ok(());
            }
            Run::Failed => return Err(MasterError::LoopClosed),
        };

        info!(workers = state.workers.len(), "run mine master loop");
        let stop = CancellationToken::new();
        self.handle.mining.store(true, Ordering::Release);
        let task = tokio::spawn((*state).run(stop.clone()));
        *run = Run::Running { stop, task };

        // wait local worker connect
        tokio::time::sleep(self.options.worker_connect_delay()).await;

        let (tx, rx) = oneshot::channel();
        self.handle.send(MasterMessage::Dispatch(tx));
        let result = rx.await.unwrap_or(Err(MasterError::LoopClosed));
        if let Err(err) = result {
            error!("master dispatch work failed: {err}");
            self.stop_locked(&mut run).await;
            return Err(MasterError::Dispatch(Box::new(err)));
        }
        Ok(())
    }

    /// Stops every worker and the loop. Registered workers are kept.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        self.stop_locked(&mut run).await;
    }

    async fn stop_locked(&self, run: &mut Run) {
        match std::mem::replace(run, Run::Failed) {
            Run::Running { stop, task } => {
                self.handle.mining.store(false, Ordering::Release);
                stop.cancel();
                match task.await {
                    Ok(state) => *run = Run::Stopped(Box::new(state)),
                    Err(err) => error!("mine master loop failed: {err}"),
                }
                info!("mine master stopped");
            }
            other => {
                *run = other;
                info!("call mine master stop, but it already stopped");
            }
        }
    }

    pub fn mining(&self) -> bool {
        self.handle.mining()
    }

    pub fn current_coinbase_address(&self) -> Address {
        self.config.coinbase()
    }

    pub fn set_coinbase_address(&self, address: Address) {
        self.config.set_coinbase(address);
    }

    pub fn set_mine_gas_config(&self, gas_floor: u64, gas_ceil: u64) {
        self.config.set_gas_config(gas_floor, gas_ceil);
    }

    /// Explicit injection for hosts that don't publish chain events. Ignored
    /// while stopped.
    pub fn on_new_block(&self, block: BlockRef) {
        self.handle.on_new_block(block);
    }

    pub async fn workers(&self) -> Workers {
        let mut run = self.run.lock().await;
        match &mut *run {
            Run::Stopped(state) => {
                state.drain();
                state.workers.clone()
            }
            Run::Running { .. } => {
                let (tx, rx) = oneshot::channel();
                self.handle.send(MasterMessage::Workers(tx));
                rx.await.unwrap_or_default()
            }
            Run::Failed => Workers::new(),
        }
    }

    pub fn mine_tx_count(&self) -> usize {
        self.cur_block.get().map(|block| block.tx_count()).unwrap_or(0)
    }

    pub fn current_work_block(&self) -> Option<BlockRef> {
        self.cur_block.get()
    }

    pub fn get_reward(&self, address: &Address) -> BigUint {
        self.work_manager.get_reward(address)
    }

    pub fn get_performance(&self, address: &Address) -> u64 {
        self.work_manager.get_performance(address)
    }

    /// For pay-out pipelines that settle part of a reward.
    pub fn work_manager(&self) -> &Arc<WorkManager> {
        &self.work_manager
    }

    pub fn set_reward_sender(&self, sender: Arc<dyn RewardSender>) {
        *self.reward_sender.write() = Some(sender);
    }

    pub fn retrieve_reward(&self, address: &Address) {
        let reward = self.work_manager.get_reward(address);
        let sender = self.reward_sender.read().clone();
        match sender {
            Some(sender) if !reward.is_zero() => sender.send_reward(*address, reward),
            _ => debug!(%address, reward = %reward, "no reward sent"),
        }
        self.work_manager.clear_reward(address);
        self.work_manager.clear_performance(address);
    }
}

impl Drop for Master {
    // the loop stops its workers once cancelled
    fn drop(&mut self) {
        if let Run::Running { stop, .. } = self.run.get_mut() {
            self.handle.mining.store(false, Ordering::Release);
            stop.cancel();
        }
    }
}

/// Everything the loop owns. Handed back to [`Master`] when the loop stops.
struct MasterLoop {
    config: Arc<MineConfig>,
    options: MasterOptions,
    dispatcher: WorkDispatcher,
    work_manager: Arc<WorkManager>,
    workers: Workers,
    // only moves forward; guards against repeated resets for one height
    cur_new_block_height: u64,
    messages: mpsc::UnboundedReceiver<MasterMessage>,
    timeout_tx: mpsc::UnboundedSender<u64>,
    timeout_rx: mpsc::UnboundedReceiver<u64>,
    wait_timer: Option<JoinHandle<()>>,
    timer_epoch: u64,
}

impl MasterLoop {
    async fn run(mut self, stop: CancellationToken) -> Self {
        let mut chain = self.config.chain_events.subscribe();
        let mut chain_open = true;

        info!(workers = self.workers.len(), "start mine workers");
        for worker in self.workers.values() {
            worker.start();
        }

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                received = chain.recv(), if chain_open => match received {
                    Ok(block) => self.do_on_new_block(block),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "mine master lagged behind chain events"),
                    Err(RecvError::Closed) => {
                        warn!("chain event bus closed");
                        chain_open = false;
                    }
                },
                Some(msg) = self.messages.recv() => self.handle_message(msg, true),
                Some(epoch) = self.timeout_rx.recv() => self.on_timeout(epoch),
            }
        }

        self.stop_wait();
        for worker in self.workers.values() {
            worker.stop();
        }
        self
    }

    /// Applies messages queued while the loop is not running.
    fn drain(&mut self) {
        while let Ok(msg) = self.messages.try_recv() {
            self.handle_message(msg, false);
        }
    }

    fn handle_message(&mut self, msg: MasterMessage, running: bool) {
        match msg {
            MasterMessage::Register(worker) => {
                let id = worker.id();
                if let Some(old) = self.workers.remove(&id) {
                    warn!(worker_id = %id, "worker already registered, replace old");
                    if running {
                        old.stop();
                    }
                }
                info!(worker_id = %id, workers = self.workers.len() + 1, "register worker");
                if running {
                    worker.start();
                }
                self.workers.insert(id, worker);
            }
            MasterMessage::UnRegister(id) => {
                info!(worker_id = %id, "un register worker");
                if let Some(worker) = self.workers.remove(&id) {
                    worker.stop();
                }
            }
            MasterMessage::SetWorkerCoinbase { id, coinbase } => match self.workers.get(&id) {
                Some(worker) => worker.set_coinbase(coinbase),
                None => debug!(worker_id = %id, "set coinbase for unknown worker"),
            },
            MasterMessage::OnNewBlock(block) if running => self.do_on_new_block(block),
            MasterMessage::StartWaitTimer if running => self.start_wait_timer(),
            MasterMessage::OnNewBlock(_) | MasterMessage::StartWaitTimer => {
                debug!("mine master stopped, drop msg");
            }
            MasterMessage::Dispatch(reply) => {
                let result = if running {
                    self.dispatcher.dispatch_new_work(&self.workers)
                } else {
                    Err(MasterError::LoopClosed)
                };
                let _ = reply.send(result);
            }
            MasterMessage::Workers(reply) => {
                let _ = reply.send(self.workers.clone());
            }
        }
    }

    fn do_on_new_block(&mut self, block: BlockRef) {
        info!(height = block.number(), cur_height = self.cur_new_block_height, "on new block");
        if block.number() <= self.cur_new_block_height {
            return;
        }

        // mined by ourselves
        if block.coinbase_address() == self.config.coinbase() {
            self.work_manager.on_new_block(block.as_ref());
        }

        match self.dispatcher.on_new_block(&block, &self.workers) {
            Ok(()) => {
                self.cur_new_block_height = block.number();
                self.stop_wait();
            }
            Err(err) => warn!(workers = self.workers.len(), "dispatcher process new block failed: {err}"),
        }
    }

    fn start_wait_timer(&mut self) {
        info!("start mine wait timer");
        self.stop_wait();

        let epoch = self.timer_epoch;
        let timeout_tx = self.timeout_tx.clone();
        let wait = self.options.wait_timeout();
        self.wait_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let _ = timeout_tx.send(epoch);
        }));
    }

    /// Cancels the armed timer. A timeout already queued carries an old epoch
    /// and is ignored.
    fn stop_wait(&mut self) {
        if let Some(timer) = self.wait_timer.take() {
            trace!("stop timer");
            timer.abort();
        }
        self.timer_epoch = self.timer_epoch.wrapping_add(1);
    }

    fn on_timeout(&mut self, epoch: u64) {
        if epoch != self.timer_epoch {
            debug!(epoch, current = self.timer_epoch, "stale wait timeout ignored");
            return;
        }
        self.stop_wait();
        warn!("wait block verified timeout, dispatch a new work");
        if let Err(err) = self.dispatcher.dispatch_new_work(&self.workers) {
            error!(workers = self.workers.len(), "master dispatch work failed: {err}");
        }
    }
}

pub(crate) mod messages {
    use shared::{
        model::BlockRef,
        types::{Address, WorkerId},
    };
    use tokio::sync::oneshot;

    use crate::{
        error::Result,
        interface::{WorkerRef, Workers},
    };

    pub(crate) enum MasterMessage {
        Register(WorkerRef),
        UnRegister(WorkerId),
        SetWorkerCoinbase { id: WorkerId, coinbase: Address },
        OnNewBlock(BlockRef),
        StartWaitTimer,
        Dispatch(oneshot::Sender<Result<()>>),
        Workers(oneshot::Sender<Workers>),
    }
}
