use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{CodecError, CodecResult},
    types::Address,
};

pub const PROTOCOL_MAX_MSG_SIZE: usize = 10 * 1024 * 1024;

/// Adds bincode `encode`/`decode` for a message payload type.
#[macro_export]
macro_rules! impl_payload {
    ($t:ty) => {
        impl $t {
            pub fn encode(&self) -> $crate::errors::CodecResult<::bytes::Bytes> {
                ::bincode::serialize(self)
                    .map(::bytes::Bytes::from)
                    .map_err($crate::errors::CodecError::Encode)
            }

            pub fn decode(payload: &[u8]) -> $crate::errors::CodecResult<Self> {
                ::bincode::deserialize::<Self>(payload).map_err($crate::errors::CodecError::Decode)
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum MsgCode {
    /// master -> worker
    StartMine = 0x01,
    StopMine = 0x02,
    WaitForCommit = 0x03,
    NewDefaultWork = 0x10,
    /// worker -> master
    SubmitDefaultWork = 0x11,
    Register = 0x50,
    UnRegister = 0x51,
    SetCurrentCoinbase = 0x52,
}

impl TryFrom<u64> for MsgCode {
    type Error = CodecError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => Self::StartMine,
            0x02 => Self::StopMine,
            0x03 => Self::WaitForCommit,
            0x10 => Self::NewDefaultWork,
            0x11 => Self::SubmitDefaultWork,
            0x50 => Self::Register,
            0x51 => Self::UnRegister,
            0x52 => Self::SetCurrentCoinbase,
            other => return Err(CodecError::UnknownCode(other)),
        })
    }
}

impl From<MsgCode> for u64 {
    fn from(value: MsgCode) -> Self {
        value as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    pub coinbase: Address,
}

impl_payload!(Register);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCurrentCoinbase {
    pub coinbase: Address,
}

impl_payload!(SetCurrentCoinbase);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Msg {
    pub code: u64,
    pub payload: Bytes,
}

impl Msg {
    pub fn new(code: MsgCode) -> Self {
        Self { code: code.into(), payload: Bytes::new() }
    }

    pub fn with_payload(code: MsgCode, payload: Bytes) -> Self {
        Self { code: code.into(), payload }
    }

    pub fn msg_code(&self) -> CodecResult<MsgCode> {
        MsgCode::try_from(self.code)
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
