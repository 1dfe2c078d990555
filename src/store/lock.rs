//! Store-wide mutual exclusion
//!
//! Ingest, removal and GC must not interleave: a sweep could otherwise
//! delete blobs referenced only by a manifest that is not yet recorded.
//! The in-process mutex serializes threads; the file lock serializes
//! processes sharing the same store root.

use crate::Result;
use fs4::FileExt;
use parking_lot::{Mutex, MutexGuard};
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use tracing::warn;

pub(crate) struct StoreLock {
    path: PathBuf,
    local: Mutex<()>,
}

pub(crate) struct StoreGuard<'a> {
    file: File,
    _local: MutexGuard<'a, ()>,
}

impl StoreLock {
    pub(crate) fn new(path: PathBuf) -> Self {
        StoreLock {
            path,
            local: Mutex::new(()),
        }
    }

    /// Block until this thread holds the store exclusively
    pub(crate) fn acquire(&self) -> Result<StoreGuard<'_>> {
        let local = self.local.lock();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;
        file.lock_exclusive()?;
        Ok(StoreGuard {
            file,
            _local: local,
        })
    }
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(error = %e, "failed to release store lock");
        }
    }
}
