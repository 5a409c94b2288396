pub mod errors;
pub mod log;
pub mod model;
pub mod msg;
pub mod peer;
pub mod protocol;
pub mod types;
pub mod work;

pub use errors::{CodecError, CodecResult, PeerError, PeerResult, WorkError};

pub fn timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
