use std::{collections::HashMap, sync::Arc};

use num_bigint::BigUint;
use num_traits::Zero;
use parking_lot::Mutex;
use shared::{
    model::{AbstractBlock, BlockRef},
    types::Address,
};
use tracing::*;

use crate::interface::BlockBroadcaster;

#[derive(Default)]
struct Ledger {
    /// Blocks mined per worker coinbase.
    performance: HashMap<Address, u64>,
    reward: HashMap<Address, BigUint>,
    /// Everything this master has earned. Never reset.
    total_reward: BigUint,
}

/// Accounts accepted submissions and splits confirmed rewards by performance.
pub struct WorkManager {
    broadcaster: Arc<dyn BlockBroadcaster>,
    ledger: Mutex<Ledger>,
}

impl WorkManager {
    pub fn new(broadcaster: Arc<dyn BlockBroadcaster>) -> Self {
        Self { broadcaster, ledger: Mutex::new(Ledger::default()) }
    }

    /// Credits `worker` and broadcasts. The lock is held across the broadcast
    /// so concurrent winners go out in accept order.
    pub fn submit_block(&self, worker: Address, block: BlockRef) {
        let mut ledger = self.ledger.lock();
        *ledger.performance.entry(worker).or_insert(0) += 1;
        debug!(worker = %worker, height = block.number(), txs = block.tx_count(), "submit block");
        self.broadcaster.broadcast_mined_block(block);
    }

    /// Called for confirmed blocks mined with our coinbase.
    pub fn on_new_block(&self, block: &dyn AbstractBlock) {
        let reward = block.coinbase() + block.transaction_fees();
        self.divide_reward(reward);
    }

    /// Adds `amount` to the total and recomputes every share as
    /// `performance * total / sum(performance)`, truncating.
    pub fn divide_reward(&self, amount: BigUint) -> HashMap<Address, BigUint> {
        let mut ledger = self.ledger.lock();
        ledger.total_reward += amount;

        let total_performance: u64 = ledger.performance.values().sum();
        if total_performance == 0 {
            ledger.reward.clear();
            return HashMap::new();
        }

        let total_performance = BigUint::from(total_performance);
        let reward: HashMap<_, _> = ledger
            .performance
            .iter()
            .map(|(address, performance)| {
                (*address, BigUint::from(*performance) * &ledger.total_reward / &total_performance)
            })
            .collect();
        ledger.reward = reward.clone();
        reward
    }

    pub fn get_reward(&self, address: &Address) -> BigUint {
        self.ledger.lock().reward.get(address).cloned().unwrap_or_else(BigUint::zero)
    }

    pub fn get_performance(&self, address: &Address) -> u64 {
        self.ledger.lock().performance.get(address).copied().unwrap_or(0)
    }

    pub fn total_reward(&self) -> BigUint {
        self.ledger.lock().total_reward.clone()
    }

    pub fn clear_reward(&self, address: &Address) {
        self.ledger.lock().reward.remove(address);
    }

    pub fn clear_performance(&self, address: &Address) {
        self.ledger.lock().performance.remove(address);
    }

    pub fn subtract_reward(&self, address: &Address, value: &BigUint) {
        let mut ledger = self.ledger.lock();
        match ledger.reward.get_mut(address) {
            Some(current) if &*current > value => *current -= value,
            Some(current) => debug!(%address, current = %current, value = %value, "reward is less than current reward"),
            None => debug!(%address, "address is invalid"),
        }
    }

    pub fn subtract_performance(&self, address: &Address, value: u64) {
        let mut ledger = self.ledger.lock();
        match ledger.performance.get_mut(address) {
            Some(current) if *current > value => *current -= value,
            Some(current) => debug!(%address, current = *current, value, "performance is less than current performance"),
            None => debug!(%address, "address is invalid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{block_with_reward, RecordingBroadcaster};

    fn addr(s: &str) -> Address {
        Address::from_hex(s).unwrap()
    }

    fn manager() -> (WorkManager, Arc<RecordingBroadcaster>) {
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        (WorkManager::new(broadcaster.clone()), broadcaster)
    }

    #[test]
    fn submit_counts_and_broadcasts() {
        let (manager, broadcaster) = manager();
        let a = addr("0xaa");

        manager.submit_block(a, block_with_reward(1, a, 0, 0));
        manager.submit_block(a, block_with_reward(2, a, 0, 0));

        assert_eq!(manager.get_performance(&a), 2);
        assert_eq!(manager.get_performance(&addr("0xbb")), 0);
        assert_eq!(broadcaster.heights(), vec![1, 2]);
    }

    #[test]
    fn reward_division_accumulates() {
        let (manager, _) = manager();
        let (a, b, c) = (addr("0xa"), addr("0xb"), addr("0xc"));
        for (who, n) in [(a, 1), (b, 2), (c, 1)] {
            for _ in 0..n {
                manager.submit_block(who, block_with_reward(1, who, 0, 0));
            }
        }

        manager.on_new_block(block_with_reward(1, a, 90, 10).as_ref());
        assert_eq!(manager.get_reward(&a), BigUint::from(25u32));
        assert_eq!(manager.get_reward(&b), BigUint::from(50u32));
        assert_eq!(manager.get_reward(&c), BigUint::from(25u32));

        manager.on_new_block(block_with_reward(2, a, 100, 0).as_ref());
        assert_eq!(manager.get_reward(&a), BigUint::from(50u32));
        assert_eq!(manager.get_reward(&b), BigUint::from(100u32));
        assert_eq!(manager.get_reward(&c), BigUint::from(50u32));
        assert_eq!(manager.total_reward(), BigUint::from(200u32));
    }

    #[test]
    fn division_truncates() {
        let (manager, _) = manager();
        let (a, b, c) = (addr("0xa"), addr("0xb"), addr("0xc"));
        for who in [a, b, c] {
            manager.submit_block(who, block_with_reward(1, who, 0, 0));
        }

        let reward = manager.divide_reward(BigUint::from(10u32));
        let sum: BigUint = reward.values().sum();
        assert_eq!(sum, BigUint::from(9u32));
        assert!(reward.values().all(|r| r == &BigUint::from(3u32)));
    }

    #[test]
    fn subtract_only_below_current() {
        let (manager, _) = manager();
        let a = addr("0xa");
        for _ in 0..3 {
            manager.submit_block(a, block_with_reward(1, a, 0, 0));
        }
        manager.divide_reward(BigUint::from(30u32));

        manager.subtract_performance(&a, 3);
        assert_eq!(manager.get_performance(&a), 3);
        manager.subtract_performance(&a, 2);
        assert_eq!(manager.get_performance(&a), 1);

        manager.subtract_reward(&a, &BigUint::from(30u32));
        assert_eq!(manager.get_reward(&a), BigUint::from(30u32));
        manager.subtract_reward(&a, &BigUint::from(12u32));
        assert_eq!(manager.get_reward(&a), BigUint::from(18u32));

        manager.clear_reward(&a);
        manager.clear_performance(&a);
        assert!(manager.get_reward(&a).is_zero());
        assert_eq!(manager.get_performance(&a), 0);
    }
}
