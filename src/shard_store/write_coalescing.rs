//! Write coalescing (spec §4.1 "Write coalescing").
//!
//! Saves within a short window for the same uri collapse to a single write.
//! Modeled as a bounded pending-write table: a `save` registers itself and
//! is either flushed immediately (table over capacity — backpressure) or
//! left pending until the scheduled flush runs and supersedes any earlier
//! pending write for the same uri (last-writer-wins).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::model::FileShard;
use crate::uri::Uri;

pub struct PendingWrite {
    pub shard: FileShard,
    pub queued_at: Instant,
}

/// Tracks in-flight coalesced writes. Not internally locked — the shard
/// store owns one instance behind its own per-uri lock, so mutation here
/// only ever happens while that uri's lock is held.
pub struct WriteCoalescer {
    window: Duration,
    max_pending: usize,
    pending: HashMap<Uri, PendingWrite>,
}

pub enum CoalesceOutcome {
    /// The write was buffered; no disk I/O is needed yet.
    Buffered,
    /// The pending-write table was at capacity; this write (and the one it
    /// replaced, if any) must be flushed immediately.
    FlushNow(FileShard),
}

impl WriteCoalescer {
    pub fn new(window: Duration, max_pending: usize) -> Self {
        Self {
            window,
            max_pending: max_pending.max(1),
            pending: HashMap::new(),
        }
    }

    /// Registers `shard` as the latest desired state for its uri. Returns
    /// `FlushNow` with the shard to persist immediately if the coalescing
    /// table is full; otherwise buffers it for the next scheduled flush.
    pub fn submit(&mut self, shard: FileShard) -> CoalesceOutcome {
        let uri = shard.uri.clone();
        if self.pending.contains_key(&uri) {
            self.pending.insert(uri, PendingWrite { shard, queued_at: Instant::now() });
            return CoalesceOutcome::Buffered;
        }

        if self.pending.len() >= self.max_pending {
            return CoalesceOutcome::FlushNow(shard);
        }

        self.pending.insert(uri, PendingWrite { shard, queued_at: Instant::now() });
        CoalesceOutcome::Buffered
    }

    /// Removes and returns every pending write whose coalescing window has
    /// elapsed — the scheduled-flush sweep.
    pub fn drain_ready(&mut self) -> Vec<FileShard> {
        let now = Instant::now();
        let ready_uris: Vec<Uri> = self
            .pending
            .iter()
            .filter(|(_, w)| now.duration_since(w.queued_at) >= self.window)
            .map(|(uri, _)| uri.clone())
            .collect();

        ready_uris
            .into_iter()
            .filter_map(|uri| self.pending.remove(&uri).map(|w| w.shard))
            .collect()
    }

    /// Removes and returns every pending write regardless of window —
    /// called from `dispose` (spec: "all pending writes are flushed").
    pub fn drain_all(&mut self) -> Vec<FileShard> {
        self.pending.drain().map(|(_, w)| w.shard).collect()
    }

    /// Drops a pending write for `uri` without flushing it — used when a
    /// `delete` arrives for a uri with a buffered save (the pending write
    /// "completes with a deleted-before-write failure").
    pub fn cancel(&mut self, uri: &Uri) -> bool {
        self.pending.remove(uri).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SHARD_VERSION;

    fn shard(uri: &str) -> FileShard {
        FileShard::empty(Uri::new(uri), "h".to_string(), SHARD_VERSION, 0)
    }

    #[test]
    fn repeated_submits_for_same_uri_collapse() {
        let mut coalescer = WriteCoalescer::new(Duration::from_millis(100), 10);
        coalescer.submit(shard("file:///a.rs"));
        coalescer.submit(shard("file:///a.rs"));
        assert_eq!(coalescer.pending_count(), 1);
    }

    #[test]
    fn over_capacity_triggers_immediate_flush() {
        let mut coalescer = WriteCoalescer::new(Duration::from_millis(100), 1);
        coalescer.submit(shard("file:///a.rs"));
        match coalescer.submit(shard("file:///b.rs")) {
            CoalesceOutcome::FlushNow(s) => assert_eq!(s.uri, Uri::new("file:///b.rs")),
            CoalesceOutcome::Buffered => panic!("expected immediate flush under backpressure"),
        }
    }

    #[test]
    fn cancel_removes_pending_write() {
        let mut coalescer = WriteCoalescer::new(Duration::from_millis(100), 10);
        coalescer.submit(shard("file:///a.rs"));
        assert!(coalescer.cancel(&Uri::new("file:///a.rs")));
        assert_eq!(coalescer.pending_count(), 0);
    }

    #[test]
    fn drain_all_empties_table_regardless_of_window() {
        let mut coalescer = WriteCoalescer::new(Duration::from_secs(600), 10);
        coalescer.submit(shard("file:///a.rs"));
        coalescer.submit(shard("file:///b.rs"));
        let drained = coalescer.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(coalescer.pending_count(), 0);
    }
}
