use std::{path::PathBuf, sync::Arc};

use cfg_if::cfg_if;
use clap::Parser;
use colored::Colorize;
use mine_master::{make_mine_master, ChainEventBus, Master, MineConfig, RewardSender, Server};
use mine_worker::{make_local_worker, make_remote_worker, Worker};
use num_bigint::BigUint;
use shared::{
    log::init_log,
    peer::pipe,
    protocol::MineProtocolManager,
    types::{Address, Difficulty},
};
use tokio::sync::broadcast::error::RecvError;
use tracing::*;

use crate::{chain::DevChain, config::NodeConfig};

mod chain;
mod config;

cfg_if! {
    if #[cfg(feature = "build-version")] {
        include!(concat!(env!("OUT_DIR"), "/version.rs"));
    } else {
        pub const VERSION: &str = "unknown";
    }
}

#[derive(Parser, Debug)]
#[command(about, version)]
struct Args {
    #[arg(long, value_name = "FILE", help = "JSON node config, flags below override it")]
    config: Option<PathBuf>,

    #[arg(long, help = "Number of in-process local workers")]
    local_workers: Option<usize>,

    #[arg(long, help = "Number of workers attached through the mine protocol")]
    remote_workers: Option<usize>,

    #[arg(long, help = "Mining threads per worker, 0 uses all cores")]
    threads: Option<usize>,

    #[arg(long, value_name = "ADDRESS", help = "Master coinbase")]
    coinbase: Option<String>,

    #[arg(long)]
    gas_floor: Option<u64>,

    #[arg(long)]
    gas_ceil: Option<u64>,

    #[arg(long, value_name = "COMPACT", help = "Compact difficulty, e.g. 0x1e0fffff")]
    difficulty: Option<String>,

    #[arg(long, help = "Stop after this many blocks, 0 runs until ctrl-c")]
    blocks: Option<u64>,

    #[arg(long)]
    wait_timeout_ms: Option<u64>,
}

impl Args {
    fn apply(self, config: &mut NodeConfig) {
        if let Some(v) = self.local_workers {
            config.local_workers = v;
        }
        if let Some(v) = self.remote_workers {
            config.remote_workers = v;
        }
        if let Some(v) = self.threads {
            config.threads = v;
        }
        if let Some(v) = self.coinbase {
            config.coinbase = v;
        }
        if let Some(v) = self.gas_floor {
            config.gas_floor = v;
        }
        if let Some(v) = self.gas_ceil {
            config.gas_ceil = v;
        }
        if let Some(v) = self.difficulty {
            config.difficulty = v;
        }
        if let Some(v) = self.blocks {
            config.blocks = v;
        }
        if let Some(v) = self.wait_timeout_ms {
            config.master.wait_timeout_ms = v;
        }
    }
}

struct PrintReward;

impl RewardSender for PrintReward {
    fn send_reward(&self, address: Address, reward: BigUint) {
        info!("{} {} -> {}", "PAYOUT".bold().cyan(), reward, address);
    }
}

fn random_address() -> Address {
    Address(rand::random())
}

/// Attaches a remote worker to the server through an in-memory peer pair.
fn spawn_remote_worker(server: &Arc<Server>, index: usize, threads: usize, max_msg_size: usize) -> Worker {
    let (worker, connector) = make_remote_worker(random_address(), threads);
    let (master_side, worker_side) = pipe("master", &format!("remote-{index}"));

    let master_protocol = MineProtocolManager::new(server.clone()).with_max_msg_size(max_msg_size);
    let worker_protocol = MineProtocolManager::new(connector).with_max_msg_size(max_msg_size);
    tokio::spawn(async move {
        if let Err(err) = master_protocol.handle(master_side.peer, master_side.inbox).await {
            warn!(index, "master side peer closed: {err:#}");
        }
    });
    tokio::spawn(async move {
        if let Err(err) = worker_protocol.handle(worker_side.peer, worker_side.inbox).await {
            warn!(index, "worker side peer closed: {err:#}");
        }
    });
    worker
}

async fn run_until(master: &Master, events: &ChainEventBus, blocks: u64) {
    let mut inserted = events.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received");
                return;
            }
            block = inserted.recv() => match block {
                Ok(block) => {
                    debug!(height = block.number(), txs = master.mine_tx_count(), "chain advanced");
                    if blocks > 0 && block.number() >= blocks {
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event listener lagged"),
                Err(RecvError::Closed) => return,
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_log();

    info!("VERSION:{}", VERSION);

    let args = Args::parse();
    let mut cfg = NodeConfig::load(args.config.as_deref())?;
    args.apply(&mut cfg);
    debug!("config: {cfg:?}");

    let coinbase = if cfg.coinbase.is_empty() { random_address() } else { Address::from_hex(&cfg.coinbase)? };
    let difficulty = Difficulty::from_hex(&cfg.difficulty)?;
    if difficulty.to_target().is_none() {
        anyhow::bail!("difficulty {difficulty} has no target");
    }

    let events = Arc::new(ChainEventBus::default());
    let chain = Arc::new(DevChain::new(difficulty, events.clone()));
    let config = Arc::new(MineConfig::new(coinbase, chain.clone(), chain.clone(), events.clone()));
    config.set_gas_config(cfg.gas_floor, cfg.gas_ceil);

    let (master, server) = make_mine_master(config, cfg.master.clone());
    master.set_reward_sender(Arc::new(PrintReward));

    let mut workers = vec![];
    for _ in 0..cfg.local_workers {
        let worker = make_local_worker(random_address(), cfg.threads, &server);
        worker.start()?;
        workers.push(worker);
    }
    for index in 0..cfg.remote_workers {
        workers.push(spawn_remote_worker(&server, index, cfg.threads, cfg.master.max_msg_size));
    }

    info!(%coinbase, %difficulty, local = cfg.local_workers, remote = cfg.remote_workers, "start mining");
    master.start().await?;

    run_until(&master, &events, cfg.blocks).await;
    master.stop().await;

    println!("{} height {}", "CHAIN".bold().green(), chain.height());
    println!("{} total reward {}", "MASTER".bold().green(), master.work_manager().total_reward());
    for worker in &workers {
        let address = worker.current_coinbase_address();
        println!(
            "  {} blocks: {} reward: {} hashes: {}",
            address,
            master.get_performance(&address).to_string().bold(),
            master.get_reward(&address).to_string().yellow(),
            worker.hashes()
        );
        master.retrieve_reward(&address);
    }
    Ok(())
}
