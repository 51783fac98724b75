//! `PartPlan`: the admitted layout of a transfer before any bytes move.
//!
//! Produced by `FanOutCoordinator`, consumed by `TransferEngine`. Once
//! built, a plan's slot order and node assignments are fixed; only the
//! per-slot size/hash/remote-id fields are filled in as the transfer
//! proceeds.

use crate::protocol::StorageNodeClient;
use std::sync::Arc;

/// One node assignment within a plan, in transfer order.
#[derive(Clone)]
pub struct PartSlot {
    pub seq: usize,
    pub storage_id: String,
    pub client: Arc<dyn StorageNodeClient>,
    /// Id the node assigned at `CheckReadiness` (upload) or the id
    /// already on record (download).
    pub remote_id: String,
}

impl PartSlot {
    pub fn new(seq: usize, storage_id: String, client: Arc<dyn StorageNodeClient>, remote_id: String) -> Self {
        Self {
            seq,
            storage_id,
            client,
            remote_id,
        }
    }
}

/// An admitted, ordered set of slots covering a file of `total_size`
/// bytes. Invariant: `slots` is sorted by `seq`, and `seq` values are
/// exactly `0..slots.len()`.
pub struct PartPlan {
    pub total_size: u64,
    pub slots: Vec<PartSlot>,
}

impl PartPlan {
    pub fn new(total_size: u64, slots: Vec<PartSlot>) -> Self {
        Self { total_size, slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Splits `total_size` into `k` contiguous, non-negative part sizes
/// summing back to `total_size`: every part but the last gets
/// `total_size / k`, and the last absorbs the remainder.
pub fn partition_sizes(total_size: u64, k: usize) -> Vec<u64> {
    if k == 0 {
        return Vec::new();
    }
    let base = total_size / k as u64;
    let mut sizes = vec![base; k];
    if let Some(last) = sizes.last_mut() {
        *last = total_size - base * (k as u64 - 1);
    }
    sizes
}
