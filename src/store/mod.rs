//! Local package store
//!
//! Blobs are stored once per digest under `objs/`; each installed package
//! keeps a record of its retained instances and their manifests. Removing
//! a package sweeps every blob no remaining manifest references.

mod blob;
mod lock;
mod package;
mod record;

pub use blob::{BlobStore, GcSummary};
pub use package::{PackageStore, RemoveSummary, ResolvedPackage};
pub use record::{InstalledRecord, InstanceEntry};

use crate::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Write `data` to `dest` by staging it in `staging` and renaming it into
/// place, so readers never observe a partial file.
pub(crate) fn write_atomic(staging: &Path, dest: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = NamedTempFile::new_in(staging)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
