use std::path::Path;

use mine_master::{load_config_file, MasterOptions};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct NodeConfig {
    /// Master coinbase, hex. Random if empty.
    pub coinbase: String,
    pub local_workers: usize,
    pub remote_workers: usize,
    /// Mining threads per worker, 0 means all cores.
    pub threads: usize,
    pub gas_floor: u64,
    pub gas_ceil: u64,
    /// Compact difficulty, hex.
    pub difficulty: String,
    /// Stop after this many confirmed blocks, 0 runs until ctrl-c.
    pub blocks: u64,
    pub master: MasterOptions,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            coinbase: String::new(),
            local_workers: 1,
            remote_workers: 1,
            threads: 2,
            gas_floor: 0,
            gas_ceil: 0,
            difficulty: "0x1e0fffff".to_string(),
            blocks: 10,
            master: MasterOptions::default(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => load_config_file(path).map_err(|err| anyhow::anyhow!("load config {path:?} failed: {err}")),
            None => Ok(Self::default()),
        }
    }
}
