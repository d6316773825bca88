// routerdash-api: Async Rust client for the RouterOS API wire protocol

pub mod codec;
pub mod error;
pub mod reply;
pub mod session;

pub use codec::{ApiCodec, Sentence};
pub use error::Error;
pub use reply::{Params, Reply, ReplyKind, Row};
pub use session::ApiSession;
