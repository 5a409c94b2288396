//! Minimal chain model the mining subsystem works against.
//!
//! Block assembly and validation belong to the host; mining only needs the
//! accessors on [`AbstractBlock`] and the concrete [`Header`] carried by work
//! messages, whose encoding defines the proof-of-work hash.

use std::{fmt::Debug, sync::Arc};

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::types::{Address, BlockNonce, Difficulty, Hash};

pub const DEFAULT_GAS_LIMIT: u64 = 6_666_666_666;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub version: u64,
    pub number: u64,
    pub pre_hash: Hash,
    pub difficulty: Difficulty,
    pub timestamp: i64,
    pub coinbase: Address,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub transaction_root: Hash,
    pub nonce: BlockNonce,
}

impl Header {
    pub fn new(number: u64, pre_hash: Hash, difficulty: Difficulty, coinbase: Address) -> Self {
        Self {
            version: 0,
            number,
            pre_hash,
            difficulty,
            timestamp: crate::timestamp(),
            coinbase,
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_used: 0,
            transaction_root: Hash::default(),
            nonce: BlockNonce::default(),
        }
    }

    /// Canonical encoding of every field except the nonce. Mining caches this
    /// once per task so a probe is one append and one hash.
    pub fn encode_without_nonce(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(160);
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(&self.number.to_be_bytes());
        buf.extend_from_slice(&self.pre_hash.0);
        buf.extend_from_slice(&self.difficulty.0);
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.coinbase.0);
        buf.extend_from_slice(&self.gas_limit.to_be_bytes());
        buf.extend_from_slice(&self.gas_used.to_be_bytes());
        buf.extend_from_slice(&self.transaction_root.0);
        buf
    }

    pub fn hash(&self) -> Hash {
        let mut raw = self.encode_without_nonce();
        raw.extend_from_slice(&self.nonce.0);
        Hash::keccak256(&raw)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub nonce: u64,
    pub from: Address,
    pub to: Address,
    pub value: BigUint,
    pub fee: BigUint,
}

impl Transaction {
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(96);
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(&self.from.0);
        buf.extend_from_slice(&self.to.0);
        buf.extend_from_slice(&self.value.to_bytes_be());
        buf.extend_from_slice(&self.fee.to_bytes_be());
        Hash::keccak256(&buf)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub transactions: Vec<Transaction>,
}

impl Body {
    pub fn transaction_root(&self) -> Hash {
        let mut buf = Vec::with_capacity(self.transactions.len() * 32);
        for tx in &self.transactions {
            buf.extend_from_slice(&tx.hash().0);
        }
        Hash::keccak256(&buf)
    }
}

/// What the mining subsystem needs from a block.
pub trait AbstractBlock: Debug + Send + Sync {
    fn number(&self) -> u64;
    fn header(&self) -> &Header;
    fn body(&self) -> &Body;
    /// Block reward component, fees excluded.
    fn coinbase(&self) -> BigUint;
    fn transaction_fees(&self) -> BigUint;
    fn set_nonce(&mut self, nonce: BlockNonce);
    /// Recomputes the header hash after a nonce change and caches it.
    fn refresh_hash_cache(&mut self) -> Hash;
    fn hash(&self) -> Hash;
    fn clone_block(&self) -> Box<dyn AbstractBlock>;

    fn difficulty(&self) -> Difficulty {
        self.header().difficulty
    }

    fn coinbase_address(&self) -> Address {
        self.header().coinbase
    }

    fn tx_count(&self) -> usize {
        self.body().transactions.len()
    }
}

pub type BlockRef = Arc<dyn AbstractBlock>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    header: Header,
    body: Body,
    reward: BigUint,
    #[serde(skip)]
    hash_cache: Option<Hash>,
}

impl Block {
    pub fn new(mut header: Header, transactions: Vec<Transaction>, reward: BigUint) -> Self {
        let body = Body { transactions };
        header.transaction_root = body.transaction_root();
        header.gas_used = body.transactions.len() as u64 * 21_000;
        Self { header, body, reward, hash_cache: None }
    }
}

impl AbstractBlock for Block {
    fn number(&self) -> u64 {
        self.header.number
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn body(&self) -> &Body {
        &self.body
    }

    fn coinbase(&self) -> BigUint {
        self.reward.clone()
    }

    fn transaction_fees(&self) -> BigUint {
        self.body.transactions.iter().map(|tx| &tx.fee).sum()
    }

    fn set_nonce(&mut self, nonce: BlockNonce) {
        self.header.nonce = nonce;
        self.hash_cache = None;
    }

    fn refresh_hash_cache(&mut self) -> Hash {
        let hash = self.header.hash();
        self.hash_cache = Some(hash);
        hash
    }

    fn hash(&self) -> Hash {
        self.hash_cache.unwrap_or_else(|| self.header.hash())
    }

    fn clone_block(&self) -> Box<dyn AbstractBlock> {
        Box::new(self.clone())
    }
}
