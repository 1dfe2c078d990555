//! Remote history entries

use super::Hash;
use serde::{Deserialize, Serialize};

/// One pushed instance as reported by a registry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Instance hash
    pub hash: Hash,
    /// Who pushed it
    pub author: String,
    /// When it was pushed (unix seconds)
    pub created: f64,
}
