use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkError {
    #[error("work header number {work} does not match block number {block}")]
    StaleBlock { work: u64, block: u64 },
    #[error("default work rlp not pre-calculated yet")]
    PreCalMissing,
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unknown msg code: {0:#x}")]
    UnknownCode(u64),
    #[error("msg too large: {size} > {max}")]
    TooLarge { size: usize, max: usize },
    #[error("payload encode failed: {0}")]
    Encode(bincode::Error),
    #[error("payload decode failed: {0}")]
    Decode(bincode::Error),
}

#[derive(Error, Debug)]
pub enum PeerError {
    #[error("peer {0} closed")]
    Closed(String),
    #[error("too many peers")]
    TooManyPeers,
    #[error("peer {0} already connected")]
    AlreadyConnected(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type CodecResult<T> = Result<T, CodecError>;
pub type PeerResult<T> = Result<T, PeerError>;
