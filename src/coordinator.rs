//! Admission control: decides, under a hard response-time budget, which
//! nodes a transfer will actually use before any bytes move.

use crate::errors::FileStoreError;
use crate::metrics::Metrics;
use crate::plan::{PartPlan, PartSlot};
use crate::protocol::ClientFactory;
use crate::types::{FilePart, StorageNode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A node that hasn't answered `CheckReadiness` within this window is
/// treated as absent for this transfer, not retried.
pub const ADMISSION_DEADLINE: Duration = Duration::from_millis(200);

pub struct FanOutCoordinator {
    client_factory: Arc<dyn ClientFactory>,
    min_storages: usize,
    metrics: Option<Arc<Metrics>>,
}

impl FanOutCoordinator {
    pub fn new(client_factory: Arc<dyn ClientFactory>, min_storages: usize) -> Self {
        Self {
            client_factory,
            min_storages,
            metrics: None,
        }
    }

    /// Attaches a metrics sink; admission counters and the probe-window
    /// histogram are recorded against it if set.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Admits an upload of `total_size` bytes against the registered
    /// `nodes`. Every node is probed concurrently with its candidate
    /// part size; only those answering `ready` inside
    /// [`ADMISSION_DEADLINE`] are kept. Fewer than `min_storages`
    /// registered nodes, or fewer than `min_storages` ready responses,
    /// both fail the admission outright. A cancelled `cancel` aborts
    /// the wait and fails the whole admission, per the caller-context
    /// propagation contract.
    pub async fn admit_upload(
        &self,
        total_size: u64,
        nodes: &[StorageNode],
        cancel: CancellationToken,
    ) -> Result<PartPlan, FileStoreError> {
        if nodes.len() < self.min_storages {
            if let Some(m) = &self.metrics {
                m.admission_total.with_label_values(&["upload", "not_enough_storages"]).inc();
            }
            return Err(FileStoreError::NotEnoughStorages);
        }
        let started = Instant::now();
        // Advertised per-part capacity for the readiness probe, not the
        // actual per-part size a final plan of K slots will carry; these
        // two quantities diverge on purpose when K exceeds min_storages.
        let max_part_size = total_size / self.min_storages as u64;

        let slots: Arc<Mutex<Vec<PartSlot>>> = Arc::new(Mutex::new(Vec::new()));
        let mut probes = Vec::with_capacity(nodes.len());
        for (seq, node) in nodes.iter().cloned().enumerate() {
            let client_factory = self.client_factory.clone();
            let slots = slots.clone();
            probes.push(tokio::spawn(async move {
                let client = match client_factory.new_storage_client(&node.host).await {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(storage_id = %node.id, error = %e, "dial failed during admission");
                        return;
                    }
                };
                let check = match client.check_readiness(max_part_size).await {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(storage_id = %node.id, error = %e, "readiness check failed");
                        return;
                    }
                };
                if !check.ready {
                    return;
                }
                slots
                    .lock()
                    .push(PartSlot::new(seq, node.id.clone(), client, check.id));
            }));
        }

        let join_all = async {
            for probe in &mut probes {
                let _ = probe.await;
            }
        };
        tokio::select! {
            _ = join_all => {}
            _ = tokio::time::sleep(ADMISSION_DEADLINE) => {}
            _ = cancel.cancelled() => {
                for probe in &probes {
                    probe.abort();
                }
                if let Some(m) = &self.metrics {
                    m.admission_total.with_label_values(&["upload", "cancelled"]).inc();
                }
                return Err(FileStoreError::Cancelled);
            }
        }
        // Whichever branch won, make sure no probe is left running past
        // this point — a no-op for ones that already finished, but tears
        // down the dialed connection of any that were still in flight when
        // the deadline fired.
        for probe in &probes {
            probe.abort();
        }

        let mut admitted = slots.lock().clone();
        // `seq` so far is registration order, used only to keep probe
        // results deterministic; renumber to the dense 0..K-1 range the
        // data model requires.
        admitted.sort_by_key(|s| s.seq);
        for (i, slot) in admitted.iter_mut().enumerate() {
            slot.seq = i;
        }

        if let Some(m) = &self.metrics {
            m.admission_duration_seconds.observe(started.elapsed().as_secs_f64());
        }

        if admitted.len() < self.min_storages {
            if let Some(m) = &self.metrics {
                m.admission_total.with_label_values(&["upload", "not_enough_file_parts"]).inc();
            }
            return Err(FileStoreError::NotEnoughFileParts);
        }

        if let Some(m) = &self.metrics {
            m.admission_total.with_label_values(&["upload", "admitted"]).inc();
            m.admitted_parts.with_label_values(&["upload"]).observe(admitted.len() as f64);
        }

        Ok(PartPlan::new(total_size, admitted))
    }

    /// Admits a download of a file's recorded parts. Unlike upload
    /// admission this has no quorum: every part's hosting node must
    /// vouch for its existence, or the whole download fails — a
    /// missing part is unrecoverable data loss, not a retry case. A
    /// cancelled `cancel` aborts outstanding probes and fails admission.
    pub async fn admit_download(
        &self,
        parts: &[FilePart],
        nodes: &[StorageNode],
        cancel: CancellationToken,
    ) -> Result<PartPlan, FileStoreError> {
        let by_id: HashMap<&str, &StorageNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let total_size = parts.iter().map(|p| p.size).sum();

        let mut probes = Vec::with_capacity(parts.len());
        for part in parts {
            let node = by_id.get(part.storage_id.as_str()).ok_or(FileStoreError::NotFound)?;
            let client_factory = self.client_factory.clone();
            let host = node.host.clone();
            let storage_id = part.storage_id.clone();
            let remote_id = part.remote_id.clone();
            let seq = part.seq;
            probes.push(tokio::spawn(async move {
                let probe = async {
                    let client = client_factory
                        .new_storage_client(&host)
                        .await
                        .map_err(|_| FileStoreError::NotFound)?;
                    let exists = client
                        .check_file_part_existence(&remote_id)
                        .await
                        .map_err(|_| FileStoreError::NotFound)?;
                    if !exists {
                        return Err(FileStoreError::NotFound);
                    }
                    Ok(PartSlot::new(seq, storage_id, client, remote_id))
                };
                match tokio::time::timeout(ADMISSION_DEADLINE, probe).await {
                    Ok(result) => result,
                    Err(_) => Err(FileStoreError::NotFound),
                }
            }));
        }

        let mut slots = Vec::with_capacity(parts.len());
        for probe in probes {
            tokio::select! {
                result = probe => {
                    match result {
                        Ok(Ok(slot)) => slots.push(slot),
                        Ok(Err(e)) => {
                            if let Some(m) = &self.metrics {
                                m.admission_total.with_label_values(&["download", "missing_part"]).inc();
                            }
                            return Err(e);
                        }
                        Err(_) => return Err(FileStoreError::Cancelled),
                    }
                }
                _ = cancel.cancelled() => {
                    if let Some(m) = &self.metrics {
                        m.admission_total.with_label_values(&["download", "cancelled"]).inc();
                    }
                    return Err(FileStoreError::Cancelled);
                }
            }
        }

        slots.sort_by_key(|s| s.seq);
        if let Some(m) = &self.metrics {
            m.admission_total.with_label_values(&["download", "admitted"]).inc();
            m.admitted_parts.with_label_values(&["download"]).observe(slots.len() as f64);
        }
        Ok(PartPlan::new(total_size, slots))
    }
}
