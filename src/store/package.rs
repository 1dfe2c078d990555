//! Package store - installed package records over a shared blob store
//!
//! Layout:
//! ```text
//! objs/..                                   blobs (see BlobStore)
//! tmp/                                      staging for atomic writes
//! pkgs/<owner>/<package>/                   team-less packages
//! teams/<team>/<owner>/<package>/           team packages
//!     record.json                           retained instances
//!     contents/<hash>.json                  one manifest per instance
//! .lock                                     store-wide lock
//! ```

use super::blob::{BlobStore, GcSummary};
use super::lock::StoreLock;
use super::record::{InstalledRecord, InstanceEntry};
use super::write_atomic;
use crate::build::PackageBuild;
use crate::config::StoreConfig;
use crate::model::{Hash, ManifestTree, PackageAddress, PackageKey, Selector, SelectorKind};
use crate::ops::resolve_prefix;
use crate::remote::RegistryClient;
use crate::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const PACKAGES_DIR: &str = "pkgs";
const TEAMS_DIR: &str = "teams";
const STAGING_DIR: &str = "tmp";
const CONTENTS_DIR: &str = "contents";
const RECORD_FILE: &str = "record.json";
const LOCK_FILE: &str = ".lock";

/// A located package instance
#[derive(Clone, Debug)]
pub struct ResolvedPackage {
    pub key: PackageKey,
    pub hash: Hash,
    pub manifest: ManifestTree,
}

/// Outcome of removing a package
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemoveSummary {
    /// False when the package was not installed
    pub removed: bool,
    pub blobs_deleted: usize,
    pub bytes_freed: u64,
}

/// The local store of installed packages
pub struct PackageStore {
    root: PathBuf,
    staging: PathBuf,
    blobs: BlobStore,
    lock: StoreLock,
}

impl PackageStore {
    /// Open or create the store described by `config`
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let root = config.root.clone();
        let staging = root.join(STAGING_DIR);
        fs::create_dir_all(root.join(PACKAGES_DIR))?;
        fs::create_dir_all(root.join(TEAMS_DIR))?;
        let blobs = BlobStore::open(&root, &staging, config.compression_level)?;
        let lock = StoreLock::new(root.join(LOCK_FILE));
        debug!(root = %root.display(), "opened package store");

        Ok(PackageStore {
            root,
            staging,
            blobs,
            lock,
        })
    }

    /// Open or create a store at `root` with default settings
    pub fn open_at(root: impl Into<PathBuf>) -> Result<Self> {
        Self::open(&StoreConfig::at(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Directory holding a package's record. Pure path computation.
    pub fn package_path(&self, key: &PackageKey) -> PathBuf {
        match &key.team {
            Some(team) => self
                .root
                .join(TEAMS_DIR)
                .join(team)
                .join(&key.owner)
                .join(&key.package),
            None => self.root.join(PACKAGES_DIR).join(&key.owner).join(&key.package),
        }
    }

    /// Whether any instance of the package is installed
    pub fn exists(&self, key: &PackageKey) -> bool {
        self.package_path(key).join(RECORD_FILE).is_file()
    }

    /// Store a built package under `address`, returning its instance hash.
    ///
    /// Earlier instances of the same package are kept.
    pub fn ingest(&self, address: &PackageAddress, build: &PackageBuild) -> Result<Hash> {
        require_top_level(address)?;
        build.tree.root.validate()?;

        let key = address.key();
        let hash = build.tree.root_hash();
        let referenced = build.tree.blob_hashes();

        let _guard = self.lock.acquire()?;

        for blob in &referenced {
            if !build.payloads.contains_key(blob) && !self.blobs.exists(blob) {
                return Err(Error::NotFound(format!(
                    "Blob {} referenced by {}",
                    blob, address
                )));
            }
        }
        for (blob, bytes) in &build.payloads {
            if !referenced.contains(blob) {
                continue;
            }
            if Hash::digest(bytes) != *blob {
                return Err(Error::Corruption(format!(
                    "payload for {} does not match its digest",
                    blob
                )));
            }
            self.blobs.put(bytes)?;
        }

        let dir = self.package_path(&key);
        let manifest_path = dir.join(CONTENTS_DIR).join(format!("{}.json", hash));
        write_atomic(&self.staging, &manifest_path, &serde_json::to_vec(&build.tree)?)?;

        let mut record = self.record(&key)?.unwrap_or_default();
        record.touch(hash, now_millis(), build.tree.message.clone());
        self.save_record(&key, &record)?;

        info!(
            package = %key,
            hash = %hash.short(),
            blobs = referenced.len(),
            "ingested package"
        );
        Ok(hash)
    }

    /// Load a package's record, if installed
    pub fn record(&self, key: &PackageKey) -> Result<Option<InstalledRecord>> {
        match fs::read(self.package_path(key).join(RECORD_FILE)) {
            Ok(bytes) => Ok(Some(InstalledRecord::from_json(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn require_record(&self, key: &PackageKey) -> Result<InstalledRecord> {
        self.record(key)?
            .ok_or_else(|| Error::NotFound(format!("Package {}", key)))
    }

    fn save_record(&self, key: &PackageKey, record: &InstalledRecord) -> Result<()> {
        let path = self.package_path(key).join(RECORD_FILE);
        write_atomic(&self.staging, &path, &record.to_json()?)
    }

    /// Locate the instance an address selects.
    ///
    /// Without a selector this is the latest ingested instance. Versions and
    /// tags are looked up in the local record first, then through `registry`.
    pub fn resolve(
        &self,
        address: &PackageAddress,
        registry: Option<&dyn RegistryClient>,
    ) -> Result<ResolvedPackage> {
        let key = address.key();
        let record = self.require_record(&key)?;

        let hash = match &address.selector {
            None => {
                record
                    .latest()
                    .ok_or_else(|| Error::NotFound(format!("Package {}", key)))?
                    .hash
            }
            Some(Selector::Hash(prefix)) => resolve_prefix(prefix, record.hashes())?,
            Some(selector) => match record.find_label(selector.kind(), selector.value()) {
                Some(hash) => hash,
                None => {
                    let registry = registry.ok_or_else(|| {
                        Error::Registry(format!(
                            "{} {} of {} is not known locally and no registry was given",
                            selector.kind().keyword(),
                            selector.value(),
                            key
                        ))
                    })?;
                    let hash =
                        registry.resolve_tag_or_version(&key, selector.kind(), selector.value())?;
                    if !record.contains(&hash) {
                        return Err(Error::NotFound(format!(
                            "Instance {} of package {}",
                            hash.short(),
                            key
                        )));
                    }
                    hash
                }
            },
        };

        let manifest = self.load_manifest(&key, &hash)?;
        Ok(ResolvedPackage {
            key,
            hash,
            manifest,
        })
    }

    /// Read and verify one instance's manifest
    pub fn load_manifest(&self, key: &PackageKey, hash: &Hash) -> Result<ManifestTree> {
        let path = self
            .package_path(key)
            .join(CONTENTS_DIR)
            .join(format!("{}.json", hash));
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "Instance {} of package {}",
                    hash.short(),
                    key
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let manifest: ManifestTree = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Corruption(format!("manifest {}: {}", path.display(), e)))?;
        manifest
            .root
            .validate()
            .map_err(|e| Error::Corruption(format!("manifest {}: {}", path.display(), e)))?;
        let actual = manifest.root_hash();
        if actual != *hash {
            return Err(Error::Corruption(format!(
                "manifest {} hashes to {}",
                path.display(),
                actual
            )));
        }
        Ok(manifest)
    }

    /// Record a version or tag on a retained instance
    pub fn label(&self, key: &PackageKey, hash: &Hash, kind: SelectorKind, value: &str) -> Result<()> {
        if kind == SelectorKind::Hash {
            return Err(Error::InvalidTarget("hashes are not labels".into()));
        }
        let _guard = self.lock.acquire()?;
        let mut record = self.require_record(key)?;
        if !record.label(hash, kind, value) {
            return Err(Error::NotFound(format!(
                "Instance {} of package {}",
                hash.short(),
                key
            )));
        }
        self.save_record(key, &record)
    }

    /// Retained instances of a package, newest first
    pub fn history(&self, key: &PackageKey) -> Result<Vec<InstanceEntry>> {
        Ok(self.require_record(key)?.history())
    }

    /// Every installed package, sorted
    pub fn list(&self) -> Result<Vec<PackageKey>> {
        let mut keys = Vec::new();

        for (owner, owner_dir) in subdirs(&self.root.join(PACKAGES_DIR))? {
            for (package, package_dir) in subdirs(&owner_dir)? {
                if package_dir.join(RECORD_FILE).is_file() {
                    keys.push(PackageKey::new(None, &owner, &package));
                }
            }
        }
        for (team, team_dir) in subdirs(&self.root.join(TEAMS_DIR))? {
            for (owner, owner_dir) in subdirs(&team_dir)? {
                for (package, package_dir) in subdirs(&owner_dir)? {
                    if package_dir.join(RECORD_FILE).is_file() {
                        keys.push(PackageKey::new(Some(&team), &owner, &package));
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Remove every local instance of a package and sweep unreferenced blobs.
    ///
    /// Removing a package that is not installed succeeds and changes nothing.
    pub fn remove(&self, address: &PackageAddress) -> Result<RemoveSummary> {
        require_top_level(address)?;
        if address.selector.is_some() {
            return Err(Error::InvalidTarget(
                "Specify package as owner/pkg without a hash, version or tag".into(),
            ));
        }

        let key = address.key();
        let _guard = self.lock.acquire()?;

        let dir = self.package_path(&key);
        if !dir.exists() {
            debug!(package = %key, "package not installed, nothing to remove");
            return Ok(RemoveSummary::default());
        }

        // The record must be gone before the sweep computes what is retained.
        fs::remove_dir_all(&dir)?;
        self.prune_empty_parents(&dir);

        let retained = self.retained_blobs()?;
        let gc = self.blobs.delete_unreferenced(&retained)?;

        info!(
            package = %key,
            blobs_deleted = gc.removed,
            bytes_freed = gc.bytes_freed,
            "removed package"
        );
        Ok(RemoveSummary {
            removed: true,
            blobs_deleted: gc.removed,
            bytes_freed: gc.bytes_freed,
        })
    }

    /// Sweep blobs no installed manifest references
    pub fn gc(&self) -> Result<GcSummary> {
        let _guard = self.lock.acquire()?;
        let retained = self.retained_blobs()?;
        self.blobs.delete_unreferenced(&retained)
    }

    /// Union of blobs referenced by every retained instance of every package
    fn retained_blobs(&self) -> Result<HashSet<Hash>> {
        let mut retained = HashSet::new();
        for key in self.list()? {
            let record = self.require_record(&key)?;
            for hash in record.hashes() {
                retained.extend(self.load_manifest(&key, &hash)?.blob_hashes());
            }
        }
        Ok(retained)
    }

    fn prune_empty_parents(&self, removed: &Path) {
        let stops = [self.root.join(PACKAGES_DIR), self.root.join(TEAMS_DIR)];
        let mut current = removed.parent();
        while let Some(dir) = current {
            if stops.iter().any(|stop| stop == dir) || fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

fn require_top_level(address: &PackageAddress) -> Result<()> {
    if address.subpath.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidTarget(format!(
            "Specify package as owner/pkg, not {}",
            address
        )))
    }
}

/// `(name, path)` of each directory directly under `dir`; empty if `dir` is missing
fn subdirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            dirs.push((name.to_string(), entry.path()));
        }
    }
    Ok(dirs)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
