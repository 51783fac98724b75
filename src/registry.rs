//! Process-wide guard against concurrent `Store` calls for the same
//! file identity.

use crate::metrics::Metrics;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// In-flight key set, guarding at-most-one concurrent `Store` per
/// identity ({file id, name} pair).
///
/// Does not survive restarts and does not coordinate across replicas —
/// correctness across replicas would require external coordination,
/// which is out of scope here.
pub struct InFlightRegistry {
    held: Mutex<HashSet<String>>,
    metrics: Option<Arc<Metrics>>,
}

impl Default for InFlightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            metrics: None,
        }
    }

    /// Attaches a metrics sink; `lock_contended_total` is incremented
    /// against it on every rejected `lock` call.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Atomically check that none of `keys` is held, then insert all of
    /// them. All-or-nothing: either every key is admitted, or none is.
    pub fn lock(&self, keys: &[String]) -> bool {
        let mut held = self.held.lock();
        if keys.iter().any(|k| held.contains(k)) {
            if let Some(m) = &self.metrics {
                m.lock_contended_total.inc();
            }
            return false;
        }
        for key in keys {
            held.insert(key.clone());
        }
        true
    }

    /// Remove every key in `keys`; keys that aren't held are ignored.
    pub fn unlock(&self, keys: &[String]) {
        let mut held = self.held.lock();
        for key in keys {
            held.remove(key);
        }
    }
}
