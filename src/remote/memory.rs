//! In-process registry, used for tests and offline tooling

use super::RegistryClient;
use crate::model::{Hash, LogEntry, ManifestTree, PackageKey, SelectorKind};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Default)]
struct RemotePackage {
    manifests: HashMap<Hash, ManifestTree>,
    log: Vec<LogEntry>,
    versions: HashMap<String, Hash>,
    tags: HashMap<String, Hash>,
}

/// A registry that keeps everything in memory
pub struct MemoryRegistry {
    author: String,
    blobs: RwLock<HashMap<Hash, Vec<u8>>>,
    packages: RwLock<HashMap<PackageKey, RemotePackage>>,
}

impl MemoryRegistry {
    /// A registry that attributes pushes to `author`
    pub fn new(author: impl Into<String>) -> Self {
        MemoryRegistry {
            author: author.into(),
            blobs: RwLock::new(HashMap::new()),
            packages: RwLock::new(HashMap::new()),
        }
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.read().len()
    }

    /// Insert a log entry directly (e.g. to simulate history)
    pub fn push_log(&self, key: &PackageKey, entry: LogEntry) {
        self.packages
            .write()
            .entry(key.clone())
            .or_default()
            .log
            .push(entry);
    }

    fn missing_package(key: &PackageKey) -> Error {
        Error::NotFound(format!("Package {}", key))
    }
}

impl RegistryClient for MemoryRegistry {
    fn has_blob(&self, hash: &Hash) -> Result<bool> {
        Ok(self.blobs.read().contains_key(hash))
    }

    fn upload(&self, hash: &Hash, data: &[u8]) -> Result<()> {
        if Hash::digest(data) != *hash {
            return Err(Error::Registry(format!("upload of {} failed digest check", hash)));
        }
        self.blobs.write().insert(*hash, data.to_vec());
        Ok(())
    }

    fn download(&self, hash: &Hash) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(hash)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Remote blob {}", hash)))
    }

    fn put_manifest(&self, key: &PackageKey, manifest: &ManifestTree) -> Result<()> {
        let hash = manifest.root_hash();
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        let mut packages = self.packages.write();
        let package = packages.entry(key.clone()).or_default();
        package.manifests.insert(hash, manifest.clone());
        package.log.push(LogEntry {
            hash,
            author: self.author.clone(),
            created,
        });
        Ok(())
    }

    fn get_manifest(&self, key: &PackageKey, hash: &Hash) -> Result<ManifestTree> {
        self.packages
            .read()
            .get(key)
            .ok_or_else(|| Self::missing_package(key))?
            .manifests
            .get(hash)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Instance {} of package {}", hash.short(), key)))
    }

    fn log(&self, key: &PackageKey) -> Result<Vec<LogEntry>> {
        self.packages
            .read()
            .get(key)
            .map(|p| p.log.clone())
            .ok_or_else(|| Self::missing_package(key))
    }

    fn resolve_tag_or_version(
        &self,
        key: &PackageKey,
        kind: SelectorKind,
        value: &str,
    ) -> Result<Hash> {
        let packages = self.packages.read();
        let package = packages.get(key).ok_or_else(|| Self::missing_package(key))?;
        let labels = match kind {
            SelectorKind::Version => &package.versions,
            SelectorKind::Tag => &package.tags,
            SelectorKind::Hash => {
                return Err(Error::Registry("hashes are resolved from the log".into()))
            }
        };
        labels
            .get(value)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("{} {} of package {}", kind.keyword(), value, key)))
    }

    fn add_version(&self, key: &PackageKey, version: &str, hash: &Hash) -> Result<()> {
        let mut packages = self.packages.write();
        let package = packages.get_mut(key).ok_or_else(|| Self::missing_package(key))?;
        if let Some(existing) = package.versions.get(version) {
            if existing != hash {
                return Err(Error::Registry(format!(
                    "version {} of {} already points at {}",
                    version,
                    key,
                    existing.short()
                )));
            }
        }
        package.versions.insert(version.to_string(), *hash);
        Ok(())
    }

    fn add_tag(&self, key: &PackageKey, tag: &str, hash: &Hash) -> Result<()> {
        let mut packages = self.packages.write();
        let package = packages.get_mut(key).ok_or_else(|| Self::missing_package(key))?;
        package.tags.insert(tag.to_string(), *hash);
        Ok(())
    }
}
