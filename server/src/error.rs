use shared::{CodecError, PeerError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MasterError {
    #[error("no worker to dispatch work")]
    NoWorker,
    #[error("can't dispatch work, block builder returned no block")]
    BuildWorksFailed,
    #[error("new block {new} is smaller than cur work block {current}, nothing to do")]
    StaleBlock { new: u64, current: u64 },
    #[error("master dispatch work failed: {0}")]
    Dispatch(#[source] Box<MasterError>),
    #[error("invalid worker")]
    InvalidWorker,
    #[error("unknown msg: {0:#x}")]
    UnknownMsg(u64),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Peer(#[from] PeerError),
    #[error("mine master loop closed")]
    LoopClosed,
}

pub type Result<T> = std::result::Result<T, MasterError>;
