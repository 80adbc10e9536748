//! Lightweight in-memory metrics for the index core.
//!
//! Mirrors the teacher's atomic-counter + percentile-timing registry, retargeted
//! from LSP request counts to the counters this spec actually needs: shard cache
//! hit rate, resolver pass summaries, and scheduler throughput. Embedders decide
//! how (or whether) to export these; this module only accumulates them.
//!
//! Lock-free atomic counters for high-frequency operations, `DashMap` for the
//! low-contention per-operation timing histograms.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

static METRICS: once_cell::sync::Lazy<Arc<Metrics>> = once_cell::sync::Lazy::new(|| {
    Arc::new(Metrics::new())
});

/// Returns the process-global metrics instance.
pub fn metrics() -> &'static Arc<Metrics> {
    &METRICS
}

/// Performance and activity counters for the index core.
#[derive(Debug)]
pub struct Metrics {
    shard_cache_hits: AtomicU64,
    shard_cache_misses: AtomicU64,

    find_definitions_count: AtomicU64,
    find_references_count: AtomicU64,
    search_symbols_count: AtomicU64,

    operation_timings: DashMap<String, Vec<u64>>,

    bulk_index_runs: AtomicUsize,
    total_files_indexed: AtomicUsize,

    resolver_runs: AtomicU64,
    resolver_resolved_total: AtomicU64,
    resolver_fallback_resolved_total: AtomicU64,

    parse_failures: AtomicU64,
    shard_corrupt_reads: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            shard_cache_hits: AtomicU64::new(0),
            shard_cache_misses: AtomicU64::new(0),
            find_definitions_count: AtomicU64::new(0),
            find_references_count: AtomicU64::new(0),
            search_symbols_count: AtomicU64::new(0),
            operation_timings: DashMap::new(),
            bulk_index_runs: AtomicUsize::new(0),
            total_files_indexed: AtomicUsize::new(0),
            resolver_runs: AtomicU64::new(0),
            resolver_resolved_total: AtomicU64::new(0),
            resolver_fallback_resolved_total: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            shard_corrupt_reads: AtomicU64::new(0),
        }
    }

    pub fn record_shard_cache_hit(&self) {
        self.shard_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shard_cache_miss(&self) {
        self.shard_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn shard_cache_hit_rate(&self) -> f64 {
        let hits = self.shard_cache_hits.load(Ordering::Relaxed);
        let misses = self.shard_cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 { 0.0 } else { hits as f64 / total as f64 }
    }

    pub fn record_find_definitions(&self) {
        self.find_definitions_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_find_references(&self) {
        self.find_references_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_search_symbols(&self) {
        self.search_symbols_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timing(&self, operation: &str, duration: Duration) {
        let micros = duration.as_micros() as u64;
        self.operation_timings
            .entry(operation.to_string())
            .or_insert_with(Vec::new)
            .push(micros);
    }

    pub fn record_bulk_index_run(&self, file_count: usize) {
        self.bulk_index_runs.fetch_add(1, Ordering::Relaxed);
        self.total_files_indexed.fetch_add(file_count, Ordering::Relaxed);
    }

    /// Records one completed deferred-resolver pass (§4.7 report).
    pub fn record_resolver_run(&self, resolved: u64, fallback_resolved: u64) {
        self.resolver_runs.fetch_add(1, Ordering::Relaxed);
        self.resolver_resolved_total.fetch_add(resolved, Ordering::Relaxed);
        self.resolver_fallback_resolved_total.fetch_add(fallback_resolved, Ordering::Relaxed);
    }

    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shard_corrupt_read(&self) {
        self.shard_corrupt_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn operation_stats(&self, operation: &str) -> Option<OperationStats> {
        self.operation_timings.get(operation).map(|timings| {
            let mut sorted = timings.value().clone();
            sorted.sort_unstable();

            let count = sorted.len();
            if count == 0 {
                return OperationStats::default();
            }

            let sum: u64 = sorted.iter().sum();
            let mean = sum / count as u64;

            let p50_idx = count / 2;
            let p95_idx = ((count as f64) * 0.95) as usize;
            let p99_idx = ((count as f64) * 0.99) as usize;

            OperationStats {
                count,
                min_micros: sorted[0],
                max_micros: sorted[count - 1],
                mean_micros: mean,
                p50_micros: sorted[p50_idx.min(count - 1)],
                p95_micros: sorted[p95_idx.min(count - 1)],
                p99_micros: sorted[p99_idx.min(count - 1)],
            }
        })
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            shard_cache_hits: self.shard_cache_hits.load(Ordering::Relaxed),
            shard_cache_misses: self.shard_cache_misses.load(Ordering::Relaxed),
            shard_cache_hit_rate: self.shard_cache_hit_rate(),
            find_definitions_count: self.find_definitions_count.load(Ordering::Relaxed),
            find_references_count: self.find_references_count.load(Ordering::Relaxed),
            search_symbols_count: self.search_symbols_count.load(Ordering::Relaxed),
            bulk_index_runs: self.bulk_index_runs.load(Ordering::Relaxed),
            total_files_indexed: self.total_files_indexed.load(Ordering::Relaxed),
            resolver_runs: self.resolver_runs.load(Ordering::Relaxed),
            resolver_resolved_total: self.resolver_resolved_total.load(Ordering::Relaxed),
            resolver_fallback_resolved_total: self.resolver_fallback_resolved_total.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            shard_corrupt_reads: self.shard_corrupt_reads.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.shard_cache_hits.store(0, Ordering::Relaxed);
        self.shard_cache_misses.store(0, Ordering::Relaxed);
        self.find_definitions_count.store(0, Ordering::Relaxed);
        self.find_references_count.store(0, Ordering::Relaxed);
        self.search_symbols_count.store(0, Ordering::Relaxed);
        self.operation_timings.clear();
        self.bulk_index_runs.store(0, Ordering::Relaxed);
        self.total_files_indexed.store(0, Ordering::Relaxed);
        self.resolver_runs.store(0, Ordering::Relaxed);
        self.resolver_resolved_total.store(0, Ordering::Relaxed);
        self.resolver_fallback_resolved_total.store(0, Ordering::Relaxed);
        self.parse_failures.store(0, Ordering::Relaxed);
        self.shard_corrupt_reads.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperationStats {
    pub count: usize,
    pub min_micros: u64,
    pub max_micros: u64,
    pub mean_micros: u64,
    pub p50_micros: u64,
    pub p95_micros: u64,
    pub p99_micros: u64,
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub shard_cache_hits: u64,
    pub shard_cache_misses: u64,
    pub shard_cache_hit_rate: f64,
    pub find_definitions_count: u64,
    pub find_references_count: u64,
    pub search_symbols_count: u64,
    pub bulk_index_runs: usize,
    pub total_files_indexed: usize,
    pub resolver_runs: u64,
    pub resolver_resolved_total: u64,
    pub resolver_fallback_resolved_total: u64,
    pub parse_failures: u64,
    pub shard_corrupt_reads: u64,
}

/// RAII guard that records the elapsed time of a scope under `operation`.
pub struct TimingGuard {
    operation: String,
    start: Instant,
}

impl TimingGuard {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        metrics().record_timing(&self.operation, duration);
    }
}
