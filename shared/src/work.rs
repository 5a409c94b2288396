use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{CodecError, CodecResult, WorkError},
    impl_payload,
    model::{AbstractBlock, Header},
    msg::MsgCode,
    types::{Address, BlockNonce, Hash},
};

/// One partitioned search task over a candidate header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultWork {
    pub worker_coinbase_address: Address,
    pub block_header: Header,
    pub result_nonce: BlockNonce,
    /// Header encoding without the nonce, filled by the receiving side.
    #[serde(skip)]
    rlp_pre_cal: Option<Vec<u8>>,
}

impl_payload!(DefaultWork);

impl DefaultWork {
    pub fn new(block_header: Header) -> Self {
        Self { block_header, ..Default::default() }
    }

    pub fn pre_calculate(&mut self) {
        self.rlp_pre_cal = Some(self.block_header.encode_without_nonce());
    }

    pub fn is_pre_calculated(&self) -> bool {
        self.rlp_pre_cal.is_some()
    }

    /// `keccak256(rlp_pre_cal ‖ header.nonce)`
    pub fn cal_hash(&self) -> Result<Hash, WorkError> {
        let pre_cal = self.rlp_pre_cal.as_ref().ok_or(WorkError::PreCalMissing)?;
        let mut raw = Vec::with_capacity(pre_cal.len() + self.block_header.nonce.0.len());
        raw.extend_from_slice(pre_cal);
        raw.extend_from_slice(&self.block_header.nonce.0);
        Ok(Hash::keccak256(&raw))
    }

    pub fn fill_seal_result(&self, block: &mut dyn AbstractBlock) -> Result<(), WorkError> {
        if self.block_header.number != block.number() {
            return Err(WorkError::StaleBlock { work: self.block_header.number, block: block.number() });
        }
        block.set_nonce(self.result_nonce);
        Ok(())
    }

    /// Splits into `threads` sub works, writing the thread index into nonce
    /// bytes 4..8. The pre-calculated encoding is shared since it excludes the
    /// nonce.
    pub fn split(&self, threads: usize) -> Vec<DefaultWork> {
        (0..threads)
            .map(|index| {
                let mut sub = self.clone();
                sub.block_header.nonce.set_thread(index as u32);
                sub
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Work {
    Default(DefaultWork),
}

impl Work {
    pub fn header(&self) -> &Header {
        match self {
            Work::Default(w) => &w.block_header,
        }
    }

    pub fn worker_coinbase_address(&self) -> Address {
        match self {
            Work::Default(w) => w.worker_coinbase_address,
        }
    }

    pub fn set_worker_coinbase_address(&mut self, address: Address) {
        match self {
            Work::Default(w) => w.worker_coinbase_address = address,
        }
    }

    pub fn result_nonce(&self) -> BlockNonce {
        match self {
            Work::Default(w) => w.result_nonce,
        }
    }

    pub fn fill_seal_result(&self, block: &mut dyn AbstractBlock) -> Result<(), WorkError> {
        match self {
            Work::Default(w) => w.fill_seal_result(block),
        }
    }

    pub fn cal_hash(&self) -> Result<Hash, WorkError> {
        match self {
            Work::Default(w) => w.cal_hash(),
        }
    }

    pub fn encode(&self) -> CodecResult<Bytes> {
        match self {
            Work::Default(w) => w.encode(),
        }
    }

    /// Payload shape is implied by the message code.
    pub fn decode(code: MsgCode, payload: &[u8]) -> CodecResult<Self> {
        match code {
            MsgCode::NewDefaultWork | MsgCode::SubmitDefaultWork => Ok(Work::Default(DefaultWork::decode(payload)?)),
            other => Err(CodecError::UnknownCode(other.into())),
        }
    }
}

/// Copies the candidate header once per worker, writing the worker index into
/// nonce bytes 0..4.
pub fn build_works(block: &dyn AbstractBlock, workers: usize) -> (MsgCode, Vec<Work>) {
    let works = (0..workers)
        .map(|index| {
            let mut header = block.header().clone();
            header.nonce = BlockNonce::default();
            header.nonce.set_partition(index as u32);
            Work::Default(DefaultWork::new(header))
        })
        .collect();
    (MsgCode::NewDefaultWork, works)
}
