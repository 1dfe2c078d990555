//! Core data model types for quarry

mod address;
mod hash;
mod log;
mod manifest;
mod node;
mod version;

pub use address::{
    is_valid_identifier, is_valid_team, AddressErrorKind, PackageAddress, PackageKey, Selector,
    SelectorKind,
};
pub use hash::Hash;
pub use log::LogEntry;
pub use manifest::{Leaves, ManifestTree};
pub use node::{validate_name, DataNode, GroupNode, Node};
pub use version::Version;
