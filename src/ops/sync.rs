//! Push/pull between the local store and a registry

use super::resolve_prefix;
use crate::build::PackageBuild;
use crate::model::{is_valid_identifier, Hash, LogEntry, PackageAddress, PackageKey, Selector, Version};
use crate::remote::RegistryClient;
use crate::store::PackageStore;
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, info};

/// Outcome of a push
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushSummary {
    pub hash: Hash,
    /// Blobs sent to the registry
    pub uploaded: usize,
    /// Blobs the registry already had
    pub skipped: usize,
}

/// Outcome of a pull
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PullSummary {
    pub hash: Hash,
    /// Blobs fetched from the registry
    pub downloaded: usize,
    /// Blobs already present locally
    pub skipped: usize,
}

/// Mirrors packages between a [`PackageStore`] and a [`RegistryClient`]
pub struct RegistrySync<'a> {
    store: &'a PackageStore,
    registry: &'a dyn RegistryClient,
}

impl<'a> RegistrySync<'a> {
    pub fn new(store: &'a PackageStore, registry: &'a dyn RegistryClient) -> Self {
        RegistrySync { store, registry }
    }

    /// Upload an installed instance and every blob the registry lacks
    pub fn push(&self, address: &PackageAddress) -> Result<PushSummary> {
        if !address.subpath.is_empty() {
            return Err(Error::InvalidTarget(format!(
                "Specify package as owner/pkg, not {}",
                address
            )));
        }

        let resolved = self.store.resolve(address, Some(self.registry))?;
        let mut uploaded = 0;
        let mut skipped = 0;
        for blob in resolved.manifest.blob_hashes() {
            if self.registry.has_blob(&blob)? {
                skipped += 1;
                continue;
            }
            let bytes = self.store.blobs().get(&blob)?;
            self.registry.upload(&blob, &bytes)?;
            uploaded += 1;
        }
        self.registry.put_manifest(&resolved.key, &resolved.manifest)?;

        info!(
            package = %resolved.key,
            hash = %resolved.hash.short(),
            uploaded,
            skipped,
            "pushed package"
        );
        Ok(PushSummary {
            hash: resolved.hash,
            uploaded,
            skipped,
        })
    }

    /// Fetch a remote instance into the local store.
    ///
    /// A version or tag used to select the instance is recorded locally, so
    /// later lookups of the same label need no registry.
    pub fn pull(&self, address: &PackageAddress) -> Result<PullSummary> {
        if !address.subpath.is_empty() {
            return Err(Error::InvalidTarget(format!(
                "Specify package as owner/pkg, not {}",
                address
            )));
        }

        let key = address.key();
        let hash = match &address.selector {
            Some(Selector::Hash(prefix)) => self.match_hash(&key, prefix)?,
            Some(selector) => {
                self.registry
                    .resolve_tag_or_version(&key, selector.kind(), selector.value())?
            }
            None => {
                self.log(&key)?
                    .last()
                    .ok_or_else(|| Error::NotFound(format!("Package {}", key)))?
                    .hash
            }
        };

        let manifest = self.registry.get_manifest(&key, &hash)?;
        if manifest.root_hash() != hash {
            return Err(Error::Corruption(format!(
                "registry manifest for {} does not match its hash",
                hash
            )));
        }

        let mut payloads = HashMap::new();
        let mut skipped = 0;
        for blob in manifest.blob_hashes() {
            if self.store.blobs().exists(&blob) {
                skipped += 1;
                continue;
            }
            let bytes = self.registry.download(&blob)?;
            if Hash::digest(&bytes) != blob {
                return Err(Error::Corruption(format!(
                    "downloaded blob {} does not match its digest",
                    blob
                )));
            }
            debug!(blob = %blob.short(), size = bytes.len(), "downloaded blob");
            payloads.insert(blob, bytes);
        }
        let downloaded = payloads.len();

        let build = PackageBuild {
            tree: manifest,
            payloads,
        };
        self.store.ingest(&address.top_level(), &build)?;
        if let Some(selector) = &address.selector {
            if !matches!(selector, Selector::Hash(_)) {
                self.store
                    .label(&key, &hash, selector.kind(), selector.value())?;
            }
        }

        info!(
            package = %key,
            hash = %hash.short(),
            downloaded,
            skipped,
            "pulled package"
        );
        Ok(PullSummary {
            hash,
            downloaded,
            skipped,
        })
    }

    /// Remote push history, oldest first
    pub fn log(&self, key: &PackageKey) -> Result<Vec<LogEntry>> {
        let mut entries = self.registry.log(key)?;
        entries.sort_by(|a, b| a.created.total_cmp(&b.created));
        Ok(entries)
    }

    /// Resolve a short hash against the remote history
    pub fn match_hash(&self, key: &PackageKey, prefix: &str) -> Result<Hash> {
        let entries = self.registry.log(key)?;
        resolve_prefix(prefix, entries.into_iter().map(|entry| entry.hash))
    }

    /// Register `version` for the remote instance matching `prefix`
    pub fn version_add(&self, key: &PackageKey, version: &str, prefix: &str) -> Result<Hash> {
        let version = Version::parse(version)?;
        let hash = self.match_hash(key, prefix)?;
        self.registry.add_version(key, version.as_str(), &hash)?;
        info!(package = %key, %version, hash = %hash.short(), "added version");
        Ok(hash)
    }

    /// Point `tag` at the remote instance matching `prefix`
    pub fn tag_add(&self, key: &PackageKey, tag: &str, prefix: &str) -> Result<Hash> {
        if !is_valid_identifier(tag) {
            return Err(Error::InvalidTarget(format!("Invalid tag name: {}", tag)));
        }
        let hash = self.match_hash(key, prefix)?;
        self.registry.add_tag(key, tag, &hash)?;
        info!(package = %key, tag, hash = %hash.short(), "added tag");
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::PackageBuilder;
    use crate::remote::MemoryRegistry;
    use tempfile::tempdir;

    fn addr(spec: &str) -> PackageAddress {
        PackageAddress::parse(spec, true).unwrap()
    }

    fn build(files: &[(&str, &[u8])]) -> PackageBuild {
        let mut builder = PackageBuilder::new();
        for (path, bytes) in files {
            builder.add_bytes(path, "raw", bytes.to_vec()).unwrap();
        }
        builder.finish(Some("test build".into()))
    }

    #[test]
    fn test_push_then_pull_into_fresh_store() {
        let dir = tempdir().unwrap();
        let local = PackageStore::open_at(dir.path().join("a")).unwrap();
        let other = PackageStore::open_at(dir.path().join("b")).unwrap();
        let registry = MemoryRegistry::new("tester");

        let hash = local
            .ingest(&addr("foo/bar"), &build(&[("x", b"one"), ("y", b"two")]))
            .unwrap();
        let pushed = RegistrySync::new(&local, &registry).push(&addr("foo/bar")).unwrap();
        assert_eq!(pushed.hash, hash);
        assert_eq!(pushed.uploaded, 2);
        assert_eq!(registry.blob_count(), 2);

        // Second push finds everything already remote
        let again = RegistrySync::new(&local, &registry).push(&addr("foo/bar")).unwrap();
        assert_eq!((again.uploaded, again.skipped), (0, 2));

        let pulled = RegistrySync::new(&other, &registry).pull(&addr("foo/bar")).unwrap();
        assert_eq!(pulled.hash, hash);
        assert_eq!(pulled.downloaded, 2);
        assert_eq!(other.resolve(&addr("foo/bar"), None).unwrap().hash, hash);
    }

    #[test]
    fn test_push_rejects_subpath() {
        let dir = tempdir().unwrap();
        let store = PackageStore::open_at(dir.path()).unwrap();
        let registry = MemoryRegistry::new("tester");
        assert!(matches!(
            RegistrySync::new(&store, &registry).push(&addr("foo/bar/x")),
            Err(Error::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_pull_by_version_records_label() {
        let dir = tempdir().unwrap();
        let local = PackageStore::open_at(dir.path().join("a")).unwrap();
        let other = PackageStore::open_at(dir.path().join("b")).unwrap();
        let registry = MemoryRegistry::new("tester");
        let key = addr("foo/bar").key();

        let v1 = local.ingest(&addr("foo/bar"), &build(&[("x", b"one")])).unwrap();
        RegistrySync::new(&local, &registry).push(&addr("foo/bar")).unwrap();
        local.ingest(&addr("foo/bar"), &build(&[("x", b"two")])).unwrap();
        RegistrySync::new(&local, &registry).push(&addr("foo/bar")).unwrap();

        let sync = RegistrySync::new(&other, &registry);
        sync.version_add(&key, "1.0.0", &v1.to_hex()[..8]).unwrap();
        let pulled = sync.pull(&addr("foo/bar:v:1.0.0")).unwrap();
        assert_eq!(pulled.hash, v1);

        // The label now resolves without a registry
        let resolved = other.resolve(&addr("foo/bar:v:1.0.0"), None).unwrap();
        assert_eq!(resolved.hash, v1);
    }

    #[test]
    fn test_version_add_validates_format() {
        let dir = tempdir().unwrap();
        let store = PackageStore::open_at(dir.path()).unwrap();
        let registry = MemoryRegistry::new("tester");
        let key = addr("foo/bar").key();
        store.ingest(&addr("foo/bar"), &build(&[("x", b"1")])).unwrap();
        let sync = RegistrySync::new(&store, &registry);
        let hash = sync.push(&addr("foo/bar")).unwrap().hash;

        let err = sync.version_add(&key, "2.9.12.2error", &hash.to_hex()).unwrap_err();
        assert!(err.to_string().contains("Invalid version format"));
        assert_eq!(sync.version_add(&key, "2.9.12", &hash.to_hex()).unwrap(), hash);
    }

    #[test]
    fn test_tag_add_requires_identifier() {
        let dir = tempdir().unwrap();
        let store = PackageStore::open_at(dir.path()).unwrap();
        let registry = MemoryRegistry::new("tester");
        let key = addr("foo/bar").key();
        store.ingest(&addr("foo/bar"), &build(&[("x", b"1")])).unwrap();
        let sync = RegistrySync::new(&store, &registry);
        let hash = sync.push(&addr("foo/bar")).unwrap().hash;

        assert!(sync.tag_add(&key, "9bad", &hash.to_hex()).is_err());
        assert_eq!(sync.tag_add(&key, "stable", &hash.to_hex()).unwrap(), hash);
        assert_eq!(
            registry
                .resolve_tag_or_version(&key, crate::model::SelectorKind::Tag, "stable")
                .unwrap(),
            hash
        );
    }

    #[test]
    fn test_log_sorted_and_ambiguous_match() {
        let dir = tempdir().unwrap();
        let store = PackageStore::open_at(dir.path()).unwrap();
        let registry = MemoryRegistry::new("tester");
        let key = PackageKey::new(None, "foo", "bar");

        let hashes: Vec<Hash> = [
            "885696c6e40613b3c601e95037caf4e43bda58c39f67ab5d5e56beefb3662ff4",
            "795a7bc9e40613b3c601e95037caf4e43bda58c39f67ab5d5e56beefb3662ff4",
            "795a7bc6e40613b3c601e95037caf4e43bda58c39f67ab5d5e56beefb3662ff4",
            "2501a6c6e40a7b355901fc5037caf4e43bda58c39f67ab5d5e56beefb3662ff4",
        ]
        .iter()
        .map(|h| Hash::from_hex(h).unwrap())
        .collect();
        for (i, hash) in hashes.iter().enumerate() {
            registry.push_log(
                &key,
                LogEntry {
                    hash: *hash,
                    author: "tester".into(),
                    created: 100.0 - i as f64,
                },
            );
        }

        let sync = RegistrySync::new(&store, &registry);
        let log = sync.log(&key).unwrap();
        assert_eq!(log.first().unwrap().hash, hashes[3]);
        assert_eq!(log.last().unwrap().hash, hashes[0]);

        match sync.match_hash(&key, "795a7b") {
            Err(Error::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates, vec![hashes[2], hashes[1]]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
        assert_eq!(sync.match_hash(&key, "2501a6").unwrap(), hashes[3]);
    }
}
