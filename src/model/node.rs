//! Manifest tree nodes
//!
//! A package is an owned tree of groups and data leaves. Names live as the
//! keys of each group's sorted child map, so there are no parent pointers
//! and iteration order is always lexicographic.

use super::Hash;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A leaf: one content-addressed payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataNode {
    /// Digest of the payload bytes
    pub blob: Hash,
    /// Opaque description of the payload shape (e.g. `csv`, `raw`)
    pub format: String,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DataNode {
    pub fn new(blob: Hash, format: impl Into<String>) -> Self {
        DataNode {
            blob,
            format: format.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// An interior node with uniquely named children
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupNode {
    pub children: BTreeMap<String, Node>,
}

impl GroupNode {
    pub fn new() -> Self {
        GroupNode::default()
    }

    /// Add a child; names must be valid and unique within the group
    pub fn insert(&mut self, name: impl Into<String>, node: Node) -> Result<()> {
        let name = name.into();
        validate_name(&name)?;
        if self.children.contains_key(&name) {
            return Err(Error::InvalidName(format!("duplicate child {}", name)));
        }
        self.children.insert(name, node);
        Ok(())
    }

    /// Insert a leaf at a `/`-separated path, creating intermediate groups
    pub fn insert_path(&mut self, path: &str, leaf: DataNode) -> Result<()> {
        let segments: Vec<&str> = path.split('/').collect();
        let (leaf_name, parents) = match segments.split_last() {
            Some(split) => split,
            None => return Err(Error::InvalidName(path.to_string())),
        };

        let mut group = self;
        for segment in parents {
            validate_name(segment)?;
            let child = group
                .children
                .entry(segment.to_string())
                .or_insert_with(|| Node::Group(GroupNode::new()));
            group = match child {
                Node::Group(g) => g,
                Node::Data(_) => {
                    return Err(Error::InvalidName(format!(
                        "{} is a data node, not a group",
                        segment
                    )))
                }
            };
        }
        group.insert(*leaf_name, Node::Data(leaf))
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Check every name in the subtree (used after deserializing)
    pub(crate) fn validate(&self) -> Result<()> {
        for (name, child) in &self.children {
            validate_name(name)?;
            if let Node::Group(group) = child {
                group.validate()?;
            }
        }
        Ok(())
    }
}

/// Either kind of manifest node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Group(GroupNode),
    Data(DataNode),
}

impl Node {
    pub fn as_group(&self) -> Option<&GroupNode> {
        match self {
            Node::Group(g) => Some(g),
            Node::Data(_) => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataNode> {
        match self {
            Node::Data(d) => Some(d),
            Node::Group(_) => None,
        }
    }
}

/// Node names become path segments on export, so they must be usable as one.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(data: &[u8]) -> DataNode {
        DataNode::new(Hash::digest(data), "raw")
    }

    #[test]
    fn test_insert_path_creates_groups() {
        let mut root = GroupNode::new();
        root.insert_path("a/b/c.txt", leaf(b"c")).unwrap();
        root.insert_path("a/d.txt", leaf(b"d")).unwrap();

        let a = root.get("a").unwrap().as_group().unwrap();
        assert_eq!(a.len(), 2);
        let b = a.get("b").unwrap().as_group().unwrap();
        assert!(b.get("c.txt").unwrap().as_data().is_some());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut root = GroupNode::new();
        root.insert("x", Node::Data(leaf(b"1"))).unwrap();
        assert!(matches!(
            root.insert("x", Node::Data(leaf(b"2"))),
            Err(Error::InvalidName(_))
        ));
    }

    #[test]
    fn test_leaf_cannot_become_group() {
        let mut root = GroupNode::new();
        root.insert_path("a", leaf(b"a")).unwrap();
        assert!(root.insert_path("a/b", leaf(b"b")).is_err());
    }

    #[test]
    fn test_name_rules() {
        assert!(validate_name("3-bad-identifier").is_ok());
        assert!(validate_name("9{}bad-identifier.html").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
    }
}
