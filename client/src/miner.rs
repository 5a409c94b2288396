use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use core_affinity::CoreId;
use crossbeam_channel::{bounded, select, Receiver, SendTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::*;

use crate::executor::WorkExecutor;

/// `None` parks the thread until the next work.
type Task = Option<WorkExecutor>;

struct Running {
    work_tx: Sender<Task>,
    // dropped to stop the thread
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// One mining thread.
pub struct Miner {
    index: usize,
    core: Option<CoreId>,
    receive_timeout: Duration,
    hashes: Arc<AtomicU64>,
    running: Mutex<Option<Running>>,
}

impl Miner {
    pub fn new(index: usize, core: Option<CoreId>, receive_timeout: Duration) -> Self {
        Self { index, core, receive_timeout, hashes: Arc::new(AtomicU64::new(0)), running: Mutex::new(None) }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Total hashes computed since creation.
    pub fn hashes(&self) -> u64 {
        self.hashes.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }

        let (work_tx, work_rx) = bounded(0);
        let (stop_tx, stop_rx) = bounded(0);
        let index = self.index;
        let core = self.core;
        let hashes = self.hashes.clone();

        let handle = std::thread::spawn(move || {
            if let Some(core) = core {
                let _ = core_affinity::set_for_current(core);
            }
            mine(index, work_rx, stop_rx, hashes);
        });

        debug!(miner = index, "miner started");
        *running = Some(Running { work_tx, stop_tx, handle });
    }

    pub fn stop(&self) {
        let Some(Running { work_tx, stop_tx, handle }) = self.running.lock().take() else {
            return;
        };
        drop(stop_tx);
        drop(work_tx);
        if handle.join().is_err() {
            error!(miner = self.index, "miner thread panicked");
        }
        debug!(miner = self.index, "miner stopped");
    }

    /// Hands a task to the thread, giving up after the receive timeout.
    pub fn receive_work(&self, task: Task) {
        let Some(work_tx) = self.running.lock().as_ref().map(|r| r.work_tx.clone()) else {
            debug!(miner = self.index, "miner not running, drop work");
            return;
        };
        match work_tx.send_timeout(task, self.receive_timeout) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(miner = self.index, "receive new work time out, miner maybe stopped")
            }
            Err(SendTimeoutError::Disconnected(_)) => debug!(miner = self.index, "miner exited, drop work"),
        }
    }
}

enum Event {
    Work(Task),
    Stop,
    Probe,
}

fn mine(index: usize, work_rx: Receiver<Task>, stop_rx: Receiver<()>, hashes: Arc<AtomicU64>) {
    let mut current: Option<WorkExecutor> = None;
    let mut started = Instant::now();

    loop {
        let event = if current.is_none() {
            select! {
                recv(work_rx) -> task => task.map_or(Event::Stop, Event::Work),
                recv(stop_rx) -> _ => Event::Stop,
            }
        } else {
            select! {
                recv(work_rx) -> task => task.map_or(Event::Stop, Event::Work),
                recv(stop_rx) -> _ => Event::Stop,
                default => Event::Probe,
            }
        };

        let executor = match event {
            Event::Stop => return,
            Event::Work(task) => {
                current = task;
                started = Instant::now();
                continue;
            }
            Event::Probe => match current.as_mut() {
                Some(executor) => executor,
                None => continue,
            },
        };

        hashes.fetch_add(1, Ordering::Relaxed);
        if executor.change_nonce() {
            if let Some(executor) = current.take() {
                let header = &executor.work().block_header;
                info!(
                    miner = index,
                    height = header.number,
                    nonce = %header.nonce,
                    "found nonce in {:.3}s",
                    started.elapsed().as_secs_f64()
                );
                executor.submit();
            }
        }
    }
}
