//! Error types for the index core.
//!
//! Boundary-facing operations (shard codec, file I/O, the SQL backend) return
//! `Result<T, IndexError>` so callers can match on error *kind* the way spec
//! §7 enumerates them. Internal pure transforms (index-map mutation, uri
//! normalization) are infallible and return plain values — the same split the
//! teacher draws between `anyhow::Result` at I/O edges and bare values in its
//! in-memory symbol-table code.

use std::path::PathBuf;

use thiserror::Error;

/// Error kinds from spec §7. Every variant here is recoverable without user
/// action except [`IndexError::ShardVersionMismatch`], which forces a full
/// store clear and re-index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shard at {path} is corrupt or empty and will be treated as absent")]
    CorruptShard { path: PathBuf },

    #[error("shard version mismatch: store has {found}, build expects {expected}; store must be cleared")]
    ShardVersionMismatch { found: u32, expected: u32 },

    #[error("metadata summary is corrupt or unreadable: {reason}")]
    CorruptMetadataSummary { reason: String },

    #[error("lock for {uri} was requested while already held and {held_for_ms}ms elapsed; treating as poisoned")]
    LockPoisoned { uri: String, held_for_ms: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("sql storage backend error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io { path: path.into(), source }
    }
}
