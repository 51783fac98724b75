//! Prometheus metrics for the fan-out engine.
//!
//! All metric types use atomics internally (no locks on the hot path).
//! `Metrics` is `Clone`-cheap (Arc-based registry + Arc-based collectors).

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

/// All Prometheus metrics exposed by this crate.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // -- Admission --
    pub admission_total: IntCounterVec,
    pub admission_duration_seconds: Histogram,
    pub admitted_parts: HistogramVec,

    // -- Transfer --
    pub transfer_total: IntCounterVec,
    pub transfer_duration_seconds: HistogramVec,
    pub transfer_bytes_total: IntCounterVec,

    // -- In-flight registry --
    pub lock_contended_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let admission_total = IntCounterVec::new(
            Opts::new(
                "filefan_admission_total",
                "Admission attempts by direction and outcome",
            ),
            &["direction", "outcome"],
        )
        .unwrap();
        registry.register(Box::new(admission_total.clone())).unwrap();

        let admission_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "filefan_admission_duration_seconds",
            "Time spent probing nodes during admission",
        ))
        .unwrap();
        registry
            .register(Box::new(admission_duration_seconds.clone()))
            .unwrap();

        let admitted_parts = HistogramVec::new(
            HistogramOpts::new(
                "filefan_admitted_parts",
                "Number of parts admitted per transfer",
            )
            .buckets(vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0]),
            &["direction"],
        )
        .unwrap();
        registry.register(Box::new(admitted_parts.clone())).unwrap();

        let transfer_total = IntCounterVec::new(
            Opts::new(
                "filefan_transfer_total",
                "Completed transfers by direction and outcome",
            ),
            &["direction", "outcome"],
        )
        .unwrap();
        registry.register(Box::new(transfer_total.clone())).unwrap();

        let duration_buckets = vec![
            0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ];
        let transfer_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "filefan_transfer_duration_seconds",
                "Transfer duration in seconds",
            )
            .buckets(duration_buckets),
            &["direction"],
        )
        .unwrap();
        registry
            .register(Box::new(transfer_duration_seconds.clone()))
            .unwrap();

        let transfer_bytes_total = IntCounterVec::new(
            Opts::new("filefan_transfer_bytes_total", "Bytes moved by direction"),
            &["direction"],
        )
        .unwrap();
        registry
            .register(Box::new(transfer_bytes_total.clone()))
            .unwrap();

        let lock_contended_total = IntCounter::new(
            "filefan_lock_contended_total",
            "Store calls rejected because an identity key was already held",
        )
        .unwrap();
        registry
            .register(Box::new(lock_contended_total.clone()))
            .unwrap();

        Metrics {
            registry,
            admission_total,
            admission_duration_seconds,
            admitted_parts,
            transfer_total,
            transfer_duration_seconds,
            transfer_bytes_total,
            lock_contended_total,
        }
    }

    /// Renders the registry in Prometheus text exposition format, for
    /// a `/metrics` endpoint wired up by whatever front-end embeds
    /// this crate.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}
