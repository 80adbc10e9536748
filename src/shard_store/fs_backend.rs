//! Content-addressed file-shard backend (spec §4.1, §6 on-disk layout).
//!
//! Grounded on the teacher's `persistent_cache.rs`: atomic write-temp +
//! rename, zero-byte-file detection (a crashed prior write), and graceful
//! degradation on read failure rather than propagating a hard error for
//! anything short of an actual I/O failure.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};
use crate::model::FileShard;
use crate::shard_store::format::{decode_shard, encode_shard};
use crate::uri::Uri;

/// One shard's on-disk location, bucketed by the first four hex chars of
/// its uri's content address to bound directory fan-out.
fn shard_path(root: &Path, uri: &Uri) -> PathBuf {
    let address = uri.content_address();
    root.join("index")
        .join(&address[0..2])
        .join(&address[2..4])
        .join(format!("{address}.bin"))
}

pub struct FsShardBackend {
    root: PathBuf,
}

impl FsShardBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Loads the shard for `uri`, or `Ok(None)` if absent. A corrupt, empty,
    /// or zero-byte file is treated as absent: the bytes are removed and
    /// `None` is returned rather than propagating a codec error (spec §7).
    pub fn load(&self, uri: &Uri) -> Result<Option<FileShard>> {
        let path = shard_path(&self.root, uri);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IndexError::io(path, e)),
        };

        if bytes.is_empty() {
            let _ = fs::remove_file(&path);
            return Ok(None);
        }

        match decode_shard(&bytes) {
            Ok(shard) => Ok(Some(shard)),
            Err(_) => {
                crate::metrics::metrics().record_shard_corrupt_read();
                let _ = fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    /// Persists `shard` atomically: write to a sibling temp file, then
    /// rename over the target path.
    pub fn save(&self, shard: &FileShard) -> Result<()> {
        let path = shard_path(&self.root, &shard.uri);
        let parent = path.parent().expect("shard path always has a parent");
        fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;

        let tmp_path = parent.join(format!(".{}.tmp", path.file_name().unwrap().to_string_lossy()));
        let bytes = encode_shard(shard)?;

        fs::write(&tmp_path, &bytes).map_err(|e| IndexError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| IndexError::io(&path, e))?;
        Ok(())
    }

    pub fn delete(&self, uri: &Uri) -> Result<()> {
        let path = shard_path(&self.root, uri);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IndexError::io(path, e)),
        }
    }

    pub fn exists(&self, uri: &Uri) -> bool {
        shard_path(&self.root, uri).exists()
    }

    /// Enumerates every shard currently on disk. Used for the cold-start
    /// fallback when the metadata summary is absent or corrupt.
    pub fn list_all(&self) -> Result<Vec<FileShard>> {
        let index_root = self.root.join("index");
        if !index_root.exists() {
            return Ok(Vec::new());
        }

        let mut shards = Vec::new();
        for entry in walkdir::WalkDir::new(&index_root)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|e| e.to_str()) == Some("bin")
            {
                let bytes = fs::read(entry.path()).map_err(|e| IndexError::io(entry.path(), e))?;
                if bytes.is_empty() {
                    continue;
                }
                if let Ok(shard) = decode_shard(&bytes) {
                    shards.push(shard);
                }
            }
        }
        Ok(shards)
    }

    pub fn clear(&self) -> Result<()> {
        let index_root = self.root.join("index");
        if index_root.exists() {
            fs::remove_dir_all(&index_root).map_err(|e| IndexError::io(&index_root, e))?;
        }
        Ok(())
    }
}
