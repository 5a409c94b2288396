use std::sync::Arc;

use shared::{
    msg::MsgCode,
    work::{DefaultWork, Work},
};
use tracing::*;

use crate::{
    error::{Result, WorkerError},
    executor::{WorkExecutor, WorkSubmitter},
    worker::{CoinbaseCell, Connector, MinerPool},
};

/// Splits incoming work across the local threads and sends solutions back.
pub struct WorkManager {
    pool: Arc<MinerPool>,
    coinbase: CoinbaseCell,
    connector: Arc<dyn Connector>,
}

impl WorkManager {
    pub fn new(pool: Arc<MinerPool>, coinbase: CoinbaseCell, connector: Arc<dyn Connector>) -> Self {
        Self { pool, coinbase, connector }
    }

    pub fn on_new_work(self: &Arc<Self>, code: MsgCode, work: Work) -> Result<()> {
        if code != MsgCode::NewDefaultWork {
            return Err(WorkerError::UnexpectedWork(code.into()));
        }
        let Work::Default(mut work) = work;
        work.pre_calculate();
        debug!(height = work.block_header.number, partition = work.block_header.nonce.partition(), "on new work");

        let submitter: Arc<dyn WorkSubmitter> = self.clone();
        let executors = work
            .split(self.pool.len())
            .into_iter()
            .map(|sub| WorkExecutor::new(sub, submitter.clone()))
            .collect();
        self.pool.dispatch(executors);
        Ok(())
    }
}

impl WorkSubmitter for WorkManager {
    fn submit_work(&self, mut work: DefaultWork) {
        work.worker_coinbase_address = self.coinbase.get();
        let height = work.block_header.number;
        if let Err(err) = self.connector.send_msg(MsgCode::SubmitDefaultWork, Work::Default(work)) {
            warn!(height, "submit work failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;
    use shared::{
        model::Header,
        types::{Address, Difficulty, Hash},
    };

    use super::*;
    use crate::worker::WorkerOptions;

    #[derive(Default)]
    struct Sent(Mutex<Vec<(MsgCode, Work)>>);

    impl Connector for Sent {
        fn register(&self) -> Result<()> {
            Ok(())
        }

        fn unregister(&self) -> Result<()> {
            Ok(())
        }

        fn set_coinbase(&self, _coinbase: Address) -> Result<()> {
            Ok(())
        }

        fn send_msg(&self, code: MsgCode, work: Work) -> Result<()> {
            self.0.lock().push((code, work));
            Ok(())
        }
    }

    fn manager(threads: usize) -> (Arc<WorkManager>, Arc<MinerPool>, Arc<Sent>, Address) {
        let pool = Arc::new(MinerPool::new(&WorkerOptions::with_threads(threads)));
        let sent = Arc::new(Sent::default());
        let coinbase = Address::from_hex("0xaa").unwrap();
        let manager = Arc::new(WorkManager::new(pool.clone(), CoinbaseCell::new(coinbase), sent.clone()));
        (manager, pool, sent, coinbase)
    }

    fn work(difficulty: Difficulty) -> Work {
        let mut header = Header::new(4, Hash::default(), difficulty, Address::default());
        header.nonce.set_partition(1);
        Work::Default(DefaultWork::new(header))
    }

    #[test]
    fn rejects_unexpected_code() {
        let (manager, _, _, _) = manager(1);
        let err = manager.on_new_work(MsgCode::SubmitDefaultWork, work(Difficulty::EASIEST)).unwrap_err();
        assert!(matches!(err, WorkerError::UnexpectedWork(0x11)));
    }

    #[test]
    fn solves_and_submits_with_coinbase() {
        let (manager, pool, sent, coinbase) = manager(2);
        pool.start();
        manager.on_new_work(MsgCode::NewDefaultWork, work(Difficulty::EASIEST)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while sent.0.lock().is_empty() {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }
        pool.stop();

        let sent = sent.0.lock();
        let (code, work) = &sent[0];
        assert_eq!(*code, MsgCode::SubmitDefaultWork);
        assert_eq!(work.worker_coinbase_address(), coinbase);
        let nonce = work.result_nonce();
        assert_eq!(nonce.partition(), 1);
        assert!(nonce.thread() < 2);
        assert!(work.header().hash().valid_for_difficulty(Difficulty::EASIEST));
    }
}
