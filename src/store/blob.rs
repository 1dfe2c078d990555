//! Blob store - immutable, content-addressed payload files
//!
//! Layout:
//! ```text
//! objs/<first two hex chars>/<full hex digest>   zstd-compressed payload
//! ```
//! The digest is taken over the uncompressed bytes.

use super::write_atomic;
use crate::model::Hash;
use crate::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub(crate) const OBJECTS_DIR: &str = "objs";

/// What a garbage collection sweep removed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcSummary {
    pub removed: usize,
    pub bytes_freed: u64,
}

/// Content-addressed blob storage under a store root
pub struct BlobStore {
    objects: PathBuf,
    staging: PathBuf,
    compression_level: i32,
}

impl BlobStore {
    /// Open the blob store rooted at `root`, creating its directories
    pub fn open(root: impl AsRef<Path>, staging: impl AsRef<Path>, compression_level: i32) -> Result<Self> {
        let objects = root.as_ref().join(OBJECTS_DIR);
        let staging = staging.as_ref().to_path_buf();
        fs::create_dir_all(&objects)?;
        fs::create_dir_all(&staging)?;
        Ok(BlobStore {
            objects,
            staging,
            compression_level,
        })
    }

    /// Where the blob for `hash` lives
    pub fn path_for(&self, hash: &Hash) -> PathBuf {
        let hex = hash.to_hex();
        self.objects.join(&hex[..2]).join(hex)
    }

    /// Store bytes, returning their digest. A no-op if already present.
    pub fn put(&self, data: &[u8]) -> Result<Hash> {
        let hash = Hash::digest(data);
        let path = self.path_for(&hash);

        if path.exists() {
            debug!(hash = %hash.short(), "blob already stored");
            return Ok(hash);
        }

        let compressed = zstd::encode_all(data, self.compression_level)?;
        // Concurrent writers of the same digest publish identical content.
        write_atomic(&self.staging, &path, &compressed)?;
        debug!(hash = %hash.short(), size = data.len(), "blob stored");
        Ok(hash)
    }

    /// Read a blob, verifying its digest
    pub fn get(&self, hash: &Hash) -> Result<Vec<u8>> {
        let compressed = match fs::read(self.path_for(hash)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("Blob {}", hash)))
            }
            Err(e) => return Err(e.into()),
        };

        let data = zstd::decode_all(compressed.as_slice())
            .map_err(|e| Error::Corruption(format!("blob {} does not decompress: {}", hash, e)))?;
        let actual = Hash::digest(&data);
        if actual != *hash {
            return Err(Error::Corruption(format!(
                "blob {} has digest {}",
                hash, actual
            )));
        }
        Ok(data)
    }

    /// Check if a blob is stored
    pub fn exists(&self, hash: &Hash) -> bool {
        self.path_for(hash).is_file()
    }

    /// All stored digests, sorted
    pub fn list(&self) -> Result<Vec<Hash>> {
        let mut hashes = Vec::new();
        for shard in fs::read_dir(&self.objects)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                let name = entry.file_name();
                match name.to_str().map(Hash::from_hex) {
                    Some(Ok(hash)) => hashes.push(hash),
                    _ => warn!(path = %entry.path().display(), "ignoring stray file in blob store"),
                }
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    /// Get the number of stored blobs
    pub fn object_count(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }

    /// Delete every blob whose digest is not in `retained`.
    ///
    /// `retained` must cover every manifest still installed; callers hold
    /// the store lock so no in-flight ingest can be swept.
    pub fn delete_unreferenced(&self, retained: &HashSet<Hash>) -> Result<GcSummary> {
        let mut summary = GcSummary::default();

        for hash in self.list()? {
            if retained.contains(&hash) {
                continue;
            }
            let path = self.path_for(&hash);
            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match fs::remove_file(&path) {
                Ok(()) => {
                    summary.removed += 1;
                    summary.bytes_freed += size;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            if let Some(shard) = path.parent() {
                // Fails harmlessly while the shard still has entries.
                let _ = fs::remove_dir(shard);
            }
        }

        info!(
            removed = summary.removed,
            bytes_freed = summary.bytes_freed,
            retained = retained.len(),
            "blob sweep finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, BlobStore) {
        let dir = tempdir().unwrap();
        let store = BlobStore::open(dir.path(), dir.path().join("tmp"), 3).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_get() {
        let (_dir, store) = setup();
        let hash = store.put(b"hello world").unwrap();
        assert_eq!(hash, Hash::digest(b"hello world"));
        assert!(store.exists(&hash));
        assert_eq!(store.get(&hash).unwrap(), b"hello world");
    }

    #[test]
    fn test_deduplication() {
        let (_dir, store) = setup();
        let h1 = store.put(b"duplicate data").unwrap();
        let h2 = store.put(b"duplicate data").unwrap();
        assert_eq!(h1, h2);
        assert_eq!(store.object_count().unwrap(), 1);
    }

    #[test]
    fn test_missing_blob() {
        let (_dir, store) = setup();
        let hash = Hash::digest(b"never stored");
        assert!(!store.exists(&hash));
        assert!(matches!(store.get(&hash), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_fan_out_layout() {
        let (dir, store) = setup();
        let hash = store.put(b"layout").unwrap();
        let hex = hash.to_hex();
        assert!(dir.path().join("objs").join(&hex[..2]).join(&hex).is_file());
    }

    #[test]
    fn test_detects_corruption() {
        let (_dir, store) = setup();
        let hash = store.put(b"original").unwrap();
        let forged = zstd::encode_all(&b"tampered"[..], 3).unwrap();
        fs::write(store.path_for(&hash), forged).unwrap();
        assert!(matches!(store.get(&hash), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_delete_unreferenced() {
        let (_dir, store) = setup();
        let keep = store.put(b"keep").unwrap();
        let drop1 = store.put(b"drop one").unwrap();
        let drop2 = store.put(b"drop two").unwrap();

        let retained: HashSet<Hash> = [keep].into_iter().collect();
        let summary = store.delete_unreferenced(&retained).unwrap();

        assert_eq!(summary.removed, 2);
        assert!(summary.bytes_freed > 0);
        assert!(store.exists(&keep));
        assert!(!store.exists(&drop1));
        assert!(!store.exists(&drop2));

        // Nothing left to sweep
        assert_eq!(store.delete_unreferenced(&retained).unwrap().removed, 0);
    }

    #[test]
    fn test_list_sorted() {
        let (_dir, store) = setup();
        for i in 0..10u8 {
            store.put(&[i]).unwrap();
        }
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 10);
        assert!(listed.windows(2).all(|w| w[0] < w[1]));
    }
}
