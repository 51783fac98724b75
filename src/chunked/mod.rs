//! Chunked streaming transfer of a single part's bytes over a node's
//! upload/download stream, decoupling the network side from the
//! reader/writer side through a bounded handoff channel plus a
//! dedicated error channel — the same shape as the chunked uploader in
//! the original service this crate's protocol is modelled on.

pub mod receiver;
pub mod sender;

pub use receiver::ChunkedStreamReceiver;
pub use sender::{ChunkedStreamSender, DEFAULT_CHUNK_SIZE};
