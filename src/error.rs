//! Error types for quarry

use crate::model::{AddressErrorKind, Hash};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for quarry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in quarry operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Ambiguous hash prefix {prefix}, matches:\n{}", join_hashes(.candidates))]
    Ambiguous {
        prefix: String,
        candidates: Vec<Hash>,
    },

    #[error("{kind}: {input}")]
    InvalidAddress {
        kind: AddressErrorKind,
        input: String,
    },

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Invalid node name: {0:?}")]
    InvalidName(String),

    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    #[error("Cannot overwrite {}: file already exists", .0.display())]
    FileExists(PathBuf),

    #[error("Invalid export path: {} already exists", .0.display())]
    PathConflict(PathBuf),

    #[error("Export destination {} is not writable", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Export failed at {} after writing {written} file(s): {source}", .path.display())]
    PartialExport {
        written: usize,
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn address(kind: AddressErrorKind, input: impl Into<String>) -> Self {
        Error::InvalidAddress {
            kind,
            input: input.into(),
        }
    }

    /// The address sub-kind, if this is an address parse failure
    pub fn address_kind(&self) -> Option<AddressErrorKind> {
        match self {
            Error::InvalidAddress { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

fn join_hashes(hashes: &[Hash]) -> String {
    hashes
        .iter()
        .map(|h| h.to_hex())
        .collect::<Vec<_>>()
        .join("\n")
}
