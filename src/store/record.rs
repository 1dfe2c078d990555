//! Installed package record - which instances of a package are kept locally

use crate::model::{Hash, SelectorKind};
use crate::{Error, Result, VERSION};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// One locally retained instance of a package
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEntry {
    /// Instance hash
    pub hash: Hash,
    /// Ingest order within the record; the highest is the latest instance
    pub seq: u64,
    /// When it was last ingested (unix millis)
    pub ingested_at: u64,
    /// Build message carried by the manifest
    #[serde(default)]
    pub message: Option<String>,
    /// Versions known to name this instance
    #[serde(default)]
    pub versions: BTreeSet<String>,
    /// Tags known to point at this instance
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Contents of `record.json`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstalledRecord {
    format_version: u32,
    next_seq: u64,
    instances: Vec<InstanceEntry>,
}

impl Default for InstalledRecord {
    fn default() -> Self {
        InstalledRecord {
            format_version: VERSION,
            next_seq: 0,
            instances: Vec::new(),
        }
    }
}

impl InstalledRecord {
    pub(crate) fn from_json(bytes: &[u8]) -> Result<Self> {
        let record: InstalledRecord = serde_json::from_slice(bytes)?;
        if record.format_version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: record.format_version,
            });
        }
        Ok(record)
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Record an ingest of `hash`; re-ingesting an instance makes it the latest again
    pub(crate) fn touch(&mut self, hash: Hash, ingested_at: u64, message: Option<String>) {
        let seq = self.next_seq;
        self.next_seq += 1;

        match self.instances.iter_mut().find(|e| e.hash == hash) {
            Some(entry) => {
                entry.seq = seq;
                entry.ingested_at = ingested_at;
                entry.message = message;
            }
            None => self.instances.push(InstanceEntry {
                hash,
                seq,
                ingested_at,
                message,
                versions: BTreeSet::new(),
                tags: BTreeSet::new(),
            }),
        }
    }

    /// Attach a version or tag to `hash`, detaching it from any sibling instance
    pub(crate) fn label(&mut self, hash: &Hash, kind: SelectorKind, value: &str) -> bool {
        if !self.contains(hash) {
            return false;
        }
        for entry in &mut self.instances {
            let labels = match kind {
                SelectorKind::Version => &mut entry.versions,
                SelectorKind::Tag => &mut entry.tags,
                SelectorKind::Hash => return false,
            };
            if entry.hash == *hash {
                labels.insert(value.to_string());
            } else {
                labels.remove(value);
            }
        }
        true
    }

    /// The instance carrying a version or tag label
    pub fn find_label(&self, kind: SelectorKind, value: &str) -> Option<Hash> {
        self.instances
            .iter()
            .find(|e| match kind {
                SelectorKind::Version => e.versions.contains(value),
                SelectorKind::Tag => e.tags.contains(value),
                SelectorKind::Hash => false,
            })
            .map(|e| e.hash)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.instances.iter().any(|e| e.hash == *hash)
    }

    /// The most recently ingested instance
    pub fn latest(&self) -> Option<&InstanceEntry> {
        self.instances.iter().max_by_key(|e| e.seq)
    }

    /// Every retained instance hash
    pub fn hashes(&self) -> HashSet<Hash> {
        self.instances.iter().map(|e| e.hash).collect()
    }

    /// Entries, newest first
    pub fn history(&self) -> Vec<InstanceEntry> {
        let mut entries = self.instances.clone();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_follows_ingest_order() {
        let a = Hash::digest(b"a");
        let b = Hash::digest(b"b");
        let mut record = InstalledRecord::default();

        record.touch(a, 10, None);
        record.touch(b, 10, None);
        assert_eq!(record.latest().unwrap().hash, b);

        // Same timestamp, but re-ingesting `a` makes it the latest
        record.touch(a, 10, Some("again".into()));
        assert_eq!(record.latest().unwrap().hash, a);
        assert_eq!(record.hashes().len(), 2);

        let history: Vec<Hash> = record.history().iter().map(|e| e.hash).collect();
        assert_eq!(history, vec![a, b]);
    }

    #[test]
    fn test_labels_move_between_instances() {
        let a = Hash::digest(b"a");
        let b = Hash::digest(b"b");
        let mut record = InstalledRecord::default();
        record.touch(a, 1, None);
        record.touch(b, 2, None);

        assert!(record.label(&a, SelectorKind::Tag, "stable"));
        assert_eq!(record.find_label(SelectorKind::Tag, "stable"), Some(a));

        assert!(record.label(&b, SelectorKind::Tag, "stable"));
        assert_eq!(record.find_label(SelectorKind::Tag, "stable"), Some(b));
        assert_eq!(record.find_label(SelectorKind::Version, "stable"), None);

        assert!(!record.label(&Hash::digest(b"unknown"), SelectorKind::Tag, "x"));
    }

    #[test]
    fn test_json_roundtrip_and_version_check() {
        let mut record = InstalledRecord::default();
        record.touch(Hash::digest(b"a"), 1, Some("msg".into()));
        let json = record.to_json().unwrap();
        let back = InstalledRecord::from_json(&json).unwrap();
        assert_eq!(back.history(), record.history());

        let mut value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        value["format_version"] = serde_json::json!(VERSION + 1);
        let err = InstalledRecord::from_json(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { .. }));
    }
}
