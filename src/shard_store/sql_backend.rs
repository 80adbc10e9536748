//! SQL-backed shard storage (spec §6 "optional SQL back-end", §9 open
//! question on `IIndexStorage`).
//!
//! Grounded on the vu1n-canopy indexing pipeline's rusqlite usage: a single
//! `rusqlite::Connection` guarded by a mutex, batch transactions for bulk
//! writes, and `params!`-based prepared statements. This backend implements
//! the same [`crate::shard_store::IndexStorage`] contract as
//! [`crate::shard_store::fs_backend::FsShardBackend`] — load/save/delete/
//! list_all/clear — plus one SQL-only relational query,
//! [`SqlShardBackend::find_references_join`], kept as an inherent method
//! rather than added to the shared trait (open question in spec §9, resolved
//! in DESIGN.md: the core never depends on it, only embedders that know
//! they're holding a `SqlShardBackend` do).

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::error::{IndexError, Result};
use crate::model::FileShard;
use crate::shard_store::format::{decode_shard, encode_shard};
use crate::uri::Uri;

pub struct SqlShardBackend {
    conn: Mutex<Connection>,
}

impl SqlShardBackend {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .map_err(|e| IndexError::io(db_path.as_ref(), std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS shards (
                uri TEXT PRIMARY KEY,
                content_hash TEXT NOT NULL,
                blob BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS shard_references (
                uri TEXT NOT NULL,
                symbol_name TEXT NOT NULL,
                line INTEGER NOT NULL,
                character INTEGER NOT NULL,
                FOREIGN KEY(uri) REFERENCES shards(uri) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS shard_references_symbol_name
                ON shard_references(symbol_name);",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn load(&self, uri: &Uri) -> Result<Option<FileShard>> {
        let conn = self.conn.lock().expect("sql backend mutex poisoned");
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT blob FROM shards WHERE uri = ?1",
                params![uri.as_str()],
                |row| row.get(0),
            )
            .ok();

        match blob {
            Some(bytes) if !bytes.is_empty() => match decode_shard(&bytes) {
                Ok(shard) => Ok(Some(shard)),
                Err(_) => {
                    crate::metrics::metrics().record_shard_corrupt_read();
                    self.delete(uri)?;
                    Ok(None)
                }
            },
            _ => Ok(None),
        }
    }

    pub fn save(&self, shard: &FileShard) -> Result<()> {
        let bytes = encode_shard(shard)?;
        let conn = self.conn.lock().expect("sql backend mutex poisoned");
        conn.execute(
            "INSERT INTO shards (uri, content_hash, blob) VALUES (?1, ?2, ?3)
             ON CONFLICT(uri) DO UPDATE SET content_hash = excluded.content_hash, blob = excluded.blob",
            params![shard.uri.as_str(), shard.content_hash, bytes],
        )?;
        replace_shard_references(&conn, shard)?;
        Ok(())
    }

    /// Persists a whole bulk-indexing batch inside a single transaction —
    /// the pattern the reference pipeline uses to amortize commit cost
    /// across hundreds of files instead of fsyncing per file.
    pub fn save_batch(&self, shards: &[FileShard]) -> Result<()> {
        let mut conn = self.conn.lock().expect("sql backend mutex poisoned");
        let tx = conn.transaction()?;
        for shard in shards {
            let bytes = encode_shard(shard)?;
            tx.execute(
                "INSERT INTO shards (uri, content_hash, blob) VALUES (?1, ?2, ?3)
                 ON CONFLICT(uri) DO UPDATE SET content_hash = excluded.content_hash, blob = excluded.blob",
                params![shard.uri.as_str(), shard.content_hash, bytes],
            )?;
            replace_shard_references(&tx, shard)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn delete(&self, uri: &Uri) -> Result<()> {
        let conn = self.conn.lock().expect("sql backend mutex poisoned");
        conn.execute("DELETE FROM shard_references WHERE uri = ?1", params![uri.as_str()])?;
        conn.execute("DELETE FROM shards WHERE uri = ?1", params![uri.as_str()])?;
        Ok(())
    }

    pub fn exists(&self, uri: &Uri) -> bool {
        let conn = self.conn.lock().expect("sql backend mutex poisoned");
        conn.query_row(
            "SELECT 1 FROM shards WHERE uri = ?1",
            params![uri.as_str()],
            |_| Ok(()),
        )
        .is_ok()
    }

    pub fn list_all(&self) -> Result<Vec<FileShard>> {
        let conn = self.conn.lock().expect("sql backend mutex poisoned");
        let mut stmt = conn.prepare("SELECT blob FROM shards")?;
        let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;

        let mut shards = Vec::new();
        for row in rows {
            let bytes = row?;
            if let Ok(shard) = decode_shard(&bytes) {
                shards.push(shard);
            }
        }
        Ok(shards)
    }

    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().expect("sql backend mutex poisoned");
        conn.execute("DELETE FROM shard_references", [])?;
        conn.execute("DELETE FROM shards", [])?;
        Ok(())
    }

    /// Every shard that references `symbol_name`, found via a genuine SQL
    /// `JOIN` against `shard_references` instead of decoding every blob —
    /// the one relational query this backend can answer that the file
    /// backend structurally cannot (spec §9 open question).
    pub fn find_references_join(&self, symbol_name: &str) -> Result<Vec<FileShard>> {
        let conn = self.conn.lock().expect("sql backend mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT DISTINCT shards.blob FROM shards
             JOIN shard_references ON shard_references.uri = shards.uri
             WHERE shard_references.symbol_name = ?1",
        )?;
        let rows = stmt.query_map(params![symbol_name], |row| row.get::<_, Vec<u8>>(0))?;

        let mut shards = Vec::new();
        for row in rows {
            let bytes = row?;
            if let Ok(shard) = decode_shard(&bytes) {
                shards.push(shard);
            }
        }
        Ok(shards)
    }
}

/// Replaces `shard`'s rows in `shard_references` with its current reference
/// set. Shared by `save` and `save_batch` so the join table never drifts
/// from the blob it's derived from.
fn replace_shard_references(conn: &Connection, shard: &FileShard) -> Result<()> {
    conn.execute("DELETE FROM shard_references WHERE uri = ?1", params![shard.uri.as_str()])?;
    for reference in &shard.references {
        conn.execute(
            "INSERT INTO shard_references (uri, symbol_name, line, character) VALUES (?1, ?2, ?3, ?4)",
            params![shard.uri.as_str(), reference.symbol_name, reference.location.line, reference.location.character],
        )?;
    }
    Ok(())
}
