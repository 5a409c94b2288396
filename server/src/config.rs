use std::{
    fs::File,
    io,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::{msg::PROTOCOL_MAX_MSG_SIZE, types::Address};

use crate::{
    events::ChainEventBus,
    interface::{BlockBroadcaster, BlockBuilder},
};

/// Mining parameters shared with whoever drives the node. Reads never cross
/// the master loop.
pub struct MineConfig {
    gas_floor: AtomicU64,
    gas_ceil: AtomicU64,
    coinbase: RwLock<Address>,
    pub block_builder: Arc<dyn BlockBuilder>,
    pub block_broadcaster: Arc<dyn BlockBroadcaster>,
    pub chain_events: Arc<ChainEventBus>,
}

impl MineConfig {
    pub fn new(
        coinbase: Address,
        block_builder: Arc<dyn BlockBuilder>,
        block_broadcaster: Arc<dyn BlockBroadcaster>,
        chain_events: Arc<ChainEventBus>,
    ) -> Self {
        Self {
            gas_floor: AtomicU64::new(0),
            gas_ceil: AtomicU64::new(0),
            coinbase: RwLock::new(coinbase),
            block_builder,
            block_broadcaster,
            chain_events,
        }
    }

    pub fn gas_floor(&self) -> u64 {
        self.gas_floor.load(Ordering::Acquire)
    }

    pub fn gas_ceil(&self) -> u64 {
        self.gas_ceil.load(Ordering::Acquire)
    }

    pub fn set_gas_config(&self, gas_floor: u64, gas_ceil: u64) {
        self.gas_floor.store(gas_floor, Ordering::Release);
        self.gas_ceil.store(gas_ceil, Ordering::Release);
    }

    pub fn coinbase(&self) -> Address {
        *self.coinbase.read()
    }

    pub fn set_coinbase(&self, coinbase: Address) {
        *self.coinbase.write() = coinbase;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct MasterOptions {
    /// How long to wait for a submitted block to come back through the chain
    /// before dispatching again.
    pub wait_timeout_ms: u64,
    /// Pause between starting workers and the first dispatch.
    pub worker_connect_delay_ms: u64,
    pub max_msg_size: usize,
}

impl Default for MasterOptions {
    fn default() -> Self {
        Self { wait_timeout_ms: 20_000, worker_connect_delay_ms: 1_000, max_msg_size: PROTOCOL_MAX_MSG_SIZE }
    }
}

impl MasterOptions {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn worker_connect_delay(&self) -> Duration {
        Duration::from_millis(self.worker_connect_delay_ms)
    }
}

pub fn load_config_file<T: DeserializeOwned>(config_file: impl AsRef<Path>) -> Result<T, io::Error> {
    let file = File::open(config_file.as_ref()).map_err(|err| {
        io::Error::new(err.kind(), format!("{} config file not found: {err}", config_file.as_ref().display()))
    })?;
    let config = serde_json::from_reader(file).map_err(|err| io::Error::new(io::ErrorKind::Other, format!("{err:?}")))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults_fill_missing_fields() {
        let options: MasterOptions = serde_json::from_str(r#"{ "wait_timeout_ms": 500 }"#).unwrap();
        assert_eq!(options.wait_timeout(), Duration::from_millis(500));
        assert_eq!(options.worker_connect_delay(), Duration::from_secs(1));
        assert_eq!(options.max_msg_size, PROTOCOL_MAX_MSG_SIZE);
        assert_eq!(MasterOptions::default().wait_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn options_use_millisecond_field_names() {
        let value = serde_json::to_value(MasterOptions::default()).unwrap();
        assert_eq!(value["wait_timeout_ms"], 20_000);
        assert_eq!(value["worker_connect_delay_ms"], 1_000);
        assert!(value.get("wait_timeout").is_none());
    }

    #[test]
    fn missing_config_file() {
        let err = load_config_file::<MasterOptions>("./no-such-config.json").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
