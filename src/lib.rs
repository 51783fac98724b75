//! filefan - distributed file-storage fan-out engine
//!
//! Splits an uploaded byte stream into ordered parts, fans them out
//! concurrently to independent storage nodes over a chunked streaming
//! protocol, and reassembles the stream on download by reading the parts
//! back in order.

pub mod chunked;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod plan;
pub mod protocol;
pub mod registry;
pub mod repository;
pub mod store;
pub mod types;
