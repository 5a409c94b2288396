use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

pub const ADDRESS_LENGTH: usize = 20;
pub const HASH_LENGTH: usize = 32;
pub const DIFFICULTY_LENGTH: usize = 4;

/// 12 bytes: partition (0..4) | thread (4..8) | free search suffix (8..12)
pub const NONCE_LENGTH: usize = 12;
pub const NONCE_PARTITION_END: usize = 4;
pub const NONCE_THREAD_END: usize = 8;
pub const NONCE_SUFFIX_LENGTH: usize = NONCE_LENGTH - NONCE_THREAD_END;

/// Left pads (or keeps the trailing bytes of) a hex string into a fixed array,
/// the way account addresses are usually written in short form (`0x1234`).
fn hex_to_fixed<const N: usize>(s: &str) -> Result<[u8; N], hex::FromHexError> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    let bytes = if s.len() % 2 == 1 { hex::decode(format!("0{s}"))? } else { hex::decode(s)? };

    let mut out = [0u8; N];
    if bytes.len() >= N {
        out.copy_from_slice(&bytes[bytes.len() - N..]);
    } else {
        out[N - bytes.len()..].copy_from_slice(&bytes);
    }
    Ok(out)
}

#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        hex_to_fixed(s).map(Self)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash(pub [u8; HASH_LENGTH]);

impl Hash {
    pub fn keccak256(data: &[u8]) -> Self {
        Self(Keccak256::digest(data).into())
    }

    /// Big-endian numeric comparison against the target of `difficulty`.
    pub fn valid_for_difficulty(&self, difficulty: Difficulty) -> bool {
        match difficulty.to_target() {
            Some(target) => *self <= target,
            None => false,
        }
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Debug for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

/// Compact difficulty `[exponent, m0, m1, m2]`.
///
/// The target is a 32 byte big-endian number whose bytes
/// `32 - exponent .. 32 - exponent + 3` hold the mantissa. Exponents outside
/// `3..=32` have no target, and no hash is valid for them.
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Difficulty(pub [u8; DIFFICULTY_LENGTH]);

impl Difficulty {
    /// Nearly every hash satisfies this one.
    pub const EASIEST: Difficulty = Difficulty([0x20, 0xff, 0xff, 0xff]);

    pub const fn from_compact(bits: u32) -> Self {
        Self(bits.to_be_bytes())
    }

    pub fn compact(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        hex_to_fixed(s).map(Self)
    }

    pub fn to_target(&self) -> Option<Hash> {
        let exponent = self.0[0] as usize;
        if !(3..=HASH_LENGTH).contains(&exponent) {
            return None;
        }
        let start = HASH_LENGTH - exponent;

        let mut target = [0u8; HASH_LENGTH];
        target[start..start + 3].copy_from_slice(&self.0[1..]);
        Some(Hash(target))
    }
}

impl Display for Difficulty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Debug for Difficulty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockNonce(pub [u8; NONCE_LENGTH]);

impl BlockNonce {
    /// Index of the worker partition assigned by the dispatcher.
    pub fn partition(&self) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.0[..NONCE_PARTITION_END]);
        u32::from_be_bytes(buf)
    }

    pub fn set_partition(&mut self, index: u32) {
        self.0[..NONCE_PARTITION_END].copy_from_slice(&index.to_be_bytes());
    }

    /// Index of the mining thread assigned by the worker.
    pub fn thread(&self) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.0[NONCE_PARTITION_END..NONCE_THREAD_END]);
        u32::from_be_bytes(buf)
    }

    pub fn set_thread(&mut self, index: u32) {
        self.0[NONCE_PARTITION_END..NONCE_THREAD_END].copy_from_slice(&index.to_be_bytes());
    }

    pub fn suffix(&self) -> [u8; NONCE_SUFFIX_LENGTH] {
        let mut buf = [0u8; NONCE_SUFFIX_LENGTH];
        buf.copy_from_slice(&self.0[NONCE_THREAD_END..]);
        buf
    }

    pub fn set_suffix(&mut self, suffix: &[u8; NONCE_SUFFIX_LENGTH]) {
        self.0[NONCE_THREAD_END..].copy_from_slice(suffix);
    }
}

impl Display for BlockNonce {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Debug for BlockNonce {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WorkerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for WorkerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
