//! Per-uri mutual exclusion (spec §4.1 `with_lock`, §5 ordering guarantees).
//!
//! Grounded on the teacher's `DashMap`-based adjacency tables
//! (`dependency_graph.rs`): a `DashMap` from key to a ref-counted lock,
//! cloned out under the map's own short-lived shard lock and then awaited
//! independently, so holding one uri's lock never blocks unrelated uris.
//!
//! The table is swept once it exceeds [`LockTable::gc_threshold`] entries,
//! dropping any lock with no other outstanding holder (spec: "Lock table is
//! garbage-collected periodically when its size exceeds a configurable
//! threshold").

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::uri::Uri;

pub struct LockTable {
    locks: DashMap<Uri, Arc<Mutex<()>>>,
    gc_threshold: usize,
}

impl LockTable {
    pub fn new(gc_threshold: usize) -> Self {
        Self {
            locks: DashMap::new(),
            gc_threshold,
        }
    }

    /// Runs `task` with exclusive access to `uri`. Only one public entry
    /// point in this crate acquires more than zero locks at once, and never
    /// more than one (no lock nesting — spec §5).
    pub async fn with_lock<F, Fut, T>(&self, uri: &Uri, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self
            .locks
            .entry(uri.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        self.maybe_sweep();

        let _guard = lock.lock().await;
        task().await
    }

    fn maybe_sweep(&self) {
        if self.locks.len() <= self.gc_threshold {
            return;
        }
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn serializes_access_per_uri() {
        let table = Arc::new(LockTable::new(1000));
        let uri = Uri::new("file:///a.rs");
        let counter = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let counter = counter.clone();
            let table = table.clone();
            let uri = uri.clone();
            handles.push(tokio::spawn(async move {
                table
                    .with_lock(&uri, || async {
                        let before = counter.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(before, counter.load(Ordering::SeqCst) - 1);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn sweep_drops_locks_with_no_holders() {
        let table = LockTable::new(2);
        for i in 0..5 {
            let uri = Uri::new(format!("file:///{i}.rs"));
            table.with_lock(&uri, || async {}).await;
        }
        assert!(table.len() <= 2);
    }
}
