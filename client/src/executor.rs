use std::sync::Arc;

use shared::{
    types::{Hash, NONCE_SUFFIX_LENGTH},
    work::DefaultWork,
};
use tracing::*;

/// Sink for solved works.
pub trait WorkSubmitter: Send + Sync {
    fn submit_work(&self, work: DefaultWork);
}

/// Walks the free nonce suffix of one pre-calculated sub work.
pub struct WorkExecutor {
    work: DefaultWork,
    suffix: [u8; NONCE_SUFFIX_LENGTH],
    submitter: Arc<dyn WorkSubmitter>,
}

impl WorkExecutor {
    pub fn new(mut work: DefaultWork, submitter: Arc<dyn WorkSubmitter>) -> Self {
        if !work.is_pre_calculated() {
            work.pre_calculate();
        }
        let suffix = work.block_header.nonce.suffix();
        Self { work, suffix, submitter }
    }

    pub fn work(&self) -> &DefaultWork {
        &self.work
    }

    /// Advances the suffix by one and probes it. Returns true and records the
    /// result nonce if the hash meets the header difficulty.
    pub fn change_nonce(&mut self) -> bool {
        for byte in self.suffix.iter_mut().rev() {
            let (next, carry) = byte.overflowing_add(1);
            *byte = next;
            if !carry {
                break;
            }
        }
        self.work.block_header.nonce.set_suffix(&self.suffix);

        match self.work.cal_hash() {
            Ok(hash) if self.valid(&hash) => {
                self.work.result_nonce = self.work.block_header.nonce;
                true
            }
            Ok(_) => false,
            Err(err) => {
                error!("cal hash failed: {err}");
                false
            }
        }
    }

    fn valid(&self, hash: &Hash) -> bool {
        hash.valid_for_difficulty(self.work.block_header.difficulty)
    }

    pub fn submit(self) {
        self.submitter.submit_work(self.work);
    }
}
