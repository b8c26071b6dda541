//! Server-wide counters and gauges (§6.7). Exposition format is out of
//! scope; this module only records values for an external reporter to read.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use dashmap::DashMap;

#[derive(Default)]
pub struct Histogram {
    count: AtomicU64,
    sum_micros: AtomicU64,
    max_micros: AtomicU64,
}

impl Histogram {
    pub fn observe(&self, duration: std::time::Duration) {
        let micros = duration.as_micros() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn mean_micros(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.sum_micros.load(Ordering::Relaxed) as f64 / count as f64
    }

    pub fn max_micros(&self) -> u64 {
        self.max_micros.load(Ordering::Relaxed)
    }
}

/// Process-wide metrics registry. Cheap to clone (wrap in `Arc`), grouped
/// by the same shape as §6.7.
#[derive(Default)]
pub struct Metrics {
    pub operations_total: DashMap<u32, AtomicU64>,
    pub rate_limit_rejections: AtomicU64,
    pub errors_by_kind: DashMap<&'static str, AtomicU64>,
    pub auth_failures: AtomicU64,
    pub connections_accepted: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub connection_timeouts: AtomicU64,
    pub active_connections: AtomicI64,
    pub read_latency: Histogram,
    pub write_latency: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_operation(&self, procedure: u32) {
        self.operations_total.entry(procedure).or_default().fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, kind: &'static str) {
        self.errors_by_kind.entry(kind).or_default().fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_counter_increments_per_procedure() {
        let metrics = Metrics::new();
        metrics.record_operation(1);
        metrics.record_operation(1);
        metrics.record_operation(2);
        assert_eq!(metrics.operations_total.get(&1).unwrap().load(Ordering::Relaxed), 2);
        assert_eq!(metrics.operations_total.get(&2).unwrap().load(Ordering::Relaxed), 1);
    }

    #[test]
    fn histogram_tracks_mean_and_max() {
        let hist = Histogram::default();
        hist.observe(std::time::Duration::from_micros(10));
        hist.observe(std::time::Duration::from_micros(30));
        assert_eq!(hist.mean_micros(), 20.0);
        assert_eq!(hist.max_micros(), 30);
    }
}
