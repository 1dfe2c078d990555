//! # quarry
//!
//! A local store for versioned, content-addressed data packages.
//!
//! A package is a tree of named groups whose leaves point at blobs. Blobs are
//! stored once per digest and shared by every package that references them;
//! each build of a package is an immutable instance identified by the hash of
//! its tree.
//!
//! ## Core Concepts
//!
//! - **Blobs**: Compressed, content-addressed payloads under `objs/`
//! - **Manifests**: Immutable trees of groups and data leaves
//! - **Instances**: Manifests recorded under an `owner/package` key
//! - **Addresses**: `[team:]owner/package[/sub/path][:h|v|t:value]`
//!
//! ## Example
//!
//! ```ignore
//! use quarry::{DirectoryConverter, Exporter, ExportOptions, PackageAddress, PackageStore, SourceConverter};
//!
//! let store = PackageStore::open_at("/tmp/quarry")?;
//! let build = DirectoryConverter::default().build("data/".as_ref())?;
//! let address: PackageAddress = "alice/weather".parse()?;
//! store.ingest(&address, &build)?;
//! Exporter::new(&store).export(&address, "out/".as_ref(), &ExportOptions::new())?;
//! ```

pub mod build;
pub mod config;
pub mod model;
pub mod ops;
pub mod remote;
pub mod store;

mod error;

pub use build::{DirectoryConverter, PackageBuild, PackageBuilder, SourceConverter};
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use model::{
    AddressErrorKind, DataNode, GroupNode, Hash, LogEntry, ManifestTree, Node, PackageAddress,
    PackageKey, Selector, SelectorKind, Version,
};
pub use ops::{
    resolve_prefix, ExportOptions, Exporter, PullSummary, PushSummary, RegistrySync,
};
pub use remote::{MemoryRegistry, RegistryClient};
pub use store::{BlobStore, GcSummary, PackageStore, RemoveSummary, ResolvedPackage};

/// On-disk record format version
pub const VERSION: u32 = 1;
