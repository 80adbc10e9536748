//! Runtime configuration (spec §6): every tunable the embedder can set, each
//! clamped to a safe range rather than rejected outright so a bad config
//! value degrades performance instead of breaking startup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn clamp_u32(value: u32, min: u32, max: u32) -> u32 {
    value.clamp(min, max)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    /// Root directory holding the persisted shard store and metadata
    /// summary. Defaults to `<workspace>/.index-cache`.
    pub cache_dir: PathBuf,

    /// Worker-pool width for bulk indexing. Clamped to `[1, 16]`.
    pub max_concurrent_index_jobs: u32,

    /// How long the write-coalescing window waits before flushing a shard
    /// that keeps getting re-written. Clamped to `[100, 5000]` ms.
    pub debounce_delay_ms: u32,

    /// In-memory LRU shard cache capacity, in entries. Clamped to
    /// `[64, 65536]`.
    pub shard_cache_capacity: u32,

    /// Maximum file size the parser will attempt, in bytes. Files over this
    /// are recorded with a skip reason rather than parsed. Clamped to
    /// `[1024, 64 * 1024 * 1024]`.
    pub max_file_size_bytes: u32,

    /// How many pending writes the coalescing queue tolerates before it
    /// starts applying backpressure to callers. Clamped to `[16, 4096]`.
    pub max_pending_writes: u32,

    /// Throttle interval for progress notifications during bulk indexing.
    /// Clamped to `[50, 2000]` ms.
    pub progress_notification_interval_ms: u32,

    /// Glob patterns identifying entry points / lifecycle hooks excluded
    /// from dead-code analysis (spec §... dead-code Non-goals carve-out).
    pub dead_code_entry_point_globs: Vec<String>,

    /// When true, prefer the SQL-backed storage implementation over the
    /// file-shard backend.
    pub use_sql_storage: bool,

    /// Glob patterns matched against candidate file paths during a bulk
    /// run. A match is never parsed, and — if it was indexed by a previous
    /// run — is purged from the index on this run (spec §6
    /// `excludePatterns`).
    pub exclude_patterns: Vec<String>,

    /// Whether the shard store coalesces writes within the debounce window
    /// at all (spec §6 `writeBufferEnabled`). When false, every shard write
    /// flushes to the backend synchronously; `debounce_delay_ms` still
    /// governs the coalescing window's width when this is true.
    pub write_buffer_enabled: bool,
}

impl IndexConfig {
    /// Builds a config from raw (possibly out-of-range) values, clamping
    /// each numeric field into its valid range per §6.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            max_concurrent_index_jobs: 4,
            debounce_delay_ms: 300,
            shard_cache_capacity: 2048,
            max_file_size_bytes: 2 * 1024 * 1024,
            max_pending_writes: 256,
            progress_notification_interval_ms: 250,
            dead_code_entry_point_globs: vec![
                "**/main.rs".to_string(),
                "**/lib.rs".to_string(),
                "**/tests/**".to_string(),
                "**/*.test.*".to_string(),
            ],
            use_sql_storage: false,
            exclude_patterns: Vec::new(),
            write_buffer_enabled: true,
        }
    }

    /// Clamps every numeric field into its documented range in place. Called
    /// after deserializing an embedder-supplied config so an out-of-range
    /// value degrades rather than panics or fails startup.
    pub fn clamp(&mut self) {
        self.max_concurrent_index_jobs = clamp_u32(self.max_concurrent_index_jobs, 1, 16);
        self.debounce_delay_ms = clamp_u32(self.debounce_delay_ms, 100, 5000);
        self.shard_cache_capacity = clamp_u32(self.shard_cache_capacity, 64, 65536);
        self.max_file_size_bytes = clamp_u32(self.max_file_size_bytes, 1024, 64 * 1024 * 1024);
        self.max_pending_writes = clamp_u32(self.max_pending_writes, 16, 4096);
        self.progress_notification_interval_ms =
            clamp_u32(self.progress_notification_interval_ms, 50, 2000);
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::new(PathBuf::from(".index-cache"))
    }
}
