//! Registry collaborator
//!
//! The HTTP client, authentication and session handling live outside this
//! crate. Remote flows take a [`RegistryClient`] value explicitly, so the
//! core never reads registry URLs or tokens from ambient state.

mod memory;

pub use memory::MemoryRegistry;

use crate::model::{Hash, LogEntry, ManifestTree, PackageKey, SelectorKind};
use crate::Result;

/// A remote mirror of the blob and package stores
pub trait RegistryClient {
    /// Whether the registry already holds a blob
    fn has_blob(&self, hash: &Hash) -> Result<bool>;

    /// Upload one blob
    fn upload(&self, hash: &Hash, data: &[u8]) -> Result<()>;

    /// Download one blob
    fn download(&self, hash: &Hash) -> Result<Vec<u8>>;

    /// Publish a manifest as a new instance of `key`
    fn put_manifest(&self, key: &PackageKey, manifest: &ManifestTree) -> Result<()>;

    /// Fetch the manifest of one instance
    fn get_manifest(&self, key: &PackageKey, hash: &Hash) -> Result<ManifestTree>;

    /// Push history of a package
    fn log(&self, key: &PackageKey) -> Result<Vec<LogEntry>>;

    /// Map a version or tag to an instance hash
    fn resolve_tag_or_version(&self, key: &PackageKey, kind: SelectorKind, value: &str)
        -> Result<Hash>;

    /// Register a version for an instance
    fn add_version(&self, key: &PackageKey, version: &str, hash: &Hash) -> Result<()>;

    /// Point a tag at an instance
    fn add_tag(&self, key: &PackageKey, tag: &str, hash: &Hash) -> Result<()>;
}
