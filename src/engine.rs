//! Moves bytes for an already-admitted `PartPlan`, one slot at a time,
//! in `seq` order, over a single shared reader or writer.

use crate::chunked::{ChunkedStreamReceiver, ChunkedStreamSender, DEFAULT_CHUNK_SIZE};
use crate::errors::FileStoreError;
use crate::metrics::Metrics;
use crate::plan::{partition_sizes, PartPlan};
use crate::types::FilePart;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

pub struct TransferEngine {
    sender: ChunkedStreamSender,
    receiver: ChunkedStreamReceiver,
    metrics: Option<Arc<Metrics>>,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl TransferEngine {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            sender: ChunkedStreamSender::new(chunk_size),
            receiver: ChunkedStreamReceiver,
            metrics: None,
        }
    }

    /// Attaches a metrics sink; transfer counters, duration, and byte
    /// totals are recorded against it if set.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Uploads `plan.total_size` bytes read from `reader`, one slot at
    /// a time in `seq` order, onto the plan's already-admitted nodes.
    /// Fails with `SizeTooSmall` if the declared size can't cover one
    /// byte per slot.
    pub async fn upload<R>(
        &self,
        mut reader: R,
        plan: &PartPlan,
        file_id: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<FilePart>, FileStoreError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let k = plan.len();
        if plan.total_size < k as u64 {
            if let Some(m) = &self.metrics {
                m.transfer_total.with_label_values(&["upload", "size_too_small"]).inc();
            }
            return Err(FileStoreError::SizeTooSmall { parts: k });
        }
        let sizes = partition_sizes(plan.total_size, k);
        let started = Instant::now();

        let mut parts = Vec::with_capacity(k);
        for (slot, size) in plan.slots.iter().zip(sizes.into_iter()) {
            let stream = match slot.client.upload_file(&slot.remote_id).await {
                Ok(s) => s,
                Err(e) => {
                    self.record_transfer_failure("upload");
                    return Err(e);
                }
            };
            let outcome = match self.sender.send(&mut reader, size, stream, cancel.clone()).await {
                Ok(o) => o,
                Err(e) => {
                    self.record_transfer_failure("upload");
                    return Err(e);
                }
            };
            parts.push(FilePart::new(
                file_id.to_string(),
                outcome.id,
                slot.seq,
                outcome.size,
                slot.storage_id.clone(),
                outcome.hash,
            ));
        }
        if let Some(m) = &self.metrics {
            m.transfer_total.with_label_values(&["upload", "ok"]).inc();
            m.transfer_duration_seconds.with_label_values(&["upload"]).observe(started.elapsed().as_secs_f64());
            m.transfer_bytes_total.with_label_values(&["upload"]).inc_by(plan.total_size);
        }
        Ok(parts)
    }

    fn record_transfer_failure(&self, direction: &str) {
        if let Some(m) = &self.metrics {
            m.transfer_total.with_label_values(&[direction, "error"]).inc();
        }
    }

    /// Downloads a file's parts, one slot at a time in `seq` order,
    /// writing them contiguously into `writer`. Fails with
    /// `SizeMismatch` if the total bytes received don't match the sum
    /// of the plan's recorded part sizes.
    pub async fn download<W>(
        &self,
        mut writer: W,
        plan: &PartPlan,
        part_sizes: &[u64],
        cancel: CancellationToken,
    ) -> Result<u64, FileStoreError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let started = Instant::now();
        let mut total_written = 0u64;
        for (slot, &size) in plan.slots.iter().zip(part_sizes.iter()) {
            let stream = match slot.client.get_file(&slot.remote_id, DEFAULT_CHUNK_SIZE as u64).await {
                Ok(s) => s,
                Err(e) => {
                    self.record_transfer_failure("download");
                    return Err(e);
                }
            };
            let written = match self.receiver.recv(slot.seq, stream, size, &mut writer, cancel.clone()).await {
                Ok(w) => w,
                Err(e) => {
                    self.record_transfer_failure("download");
                    return Err(e);
                }
            };
            total_written += written;
        }
        if total_written != plan.total_size {
            self.record_transfer_failure("download");
            return Err(FileStoreError::SizeMismatch {
                expected: plan.total_size,
                actual: total_written,
            });
        }
        if let Some(m) = &self.metrics {
            m.transfer_total.with_label_values(&["download", "ok"]).inc();
            m.transfer_duration_seconds.with_label_values(&["download"]).observe(started.elapsed().as_secs_f64());
            m.transfer_bytes_total.with_label_values(&["download"]).inc_by(total_written);
        }
        Ok(total_written)
    }
}
