use shared::{CodecError, PeerError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Peer(#[from] PeerError),
    #[error("mine master peer not set")]
    NoMasterPeer,
    #[error("unexpected work msg code: {0:#x}")]
    UnexpectedWork(u64),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
