//! Manifest tree - one immutable version of a package

use super::{DataNode, GroupNode, Hash, Node};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// The root group of a package plus package-level metadata
///
/// Only the node tree contributes to the instance hash: the message and
/// build timestamp do not, so rebuilding identical content reproduces the
/// identical hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestTree {
    /// Top-level namespace of the package
    pub root: GroupNode,

    /// Human-readable build message
    #[serde(default)]
    pub message: Option<String>,

    /// Build timestamp (unix millis)
    pub created: u64,
}

impl ManifestTree {
    pub fn new(root: GroupNode) -> Self {
        ManifestTree {
            root,
            message: None,
            created: now_millis(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Deterministic encoding of the node tree
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Children are BTreeMaps, so key order is fixed regardless of insertion order.
        bincode::serialize(&self.root).expect("serialization should not fail")
    }

    /// The instance hash
    pub fn root_hash(&self) -> Hash {
        Hash::digest(&self.canonical_bytes())
    }

    /// Look up the node at `subpath`. The root group is not a `Node` value,
    /// so an empty subpath fails; use [`ManifestTree::subtree`] when the
    /// whole package is a valid answer.
    pub fn find(&self, subpath: &[String]) -> Result<&Node> {
        let (last, parents) = subpath
            .split_last()
            .ok_or_else(|| Error::NotFound("Empty subpath".into()))?;

        let mut group = &self.root;
        for segment in parents {
            group = group
                .get(segment)
                .and_then(Node::as_group)
                .ok_or_else(|| Error::NotFound(format!("Subpath {}", subpath.join("/"))))?;
        }
        group
            .get(last)
            .ok_or_else(|| Error::NotFound(format!("Subpath {}", subpath.join("/"))))
    }

    /// Leaves below `subpath` (the whole package when empty), with logical
    /// paths relative to the package root
    pub fn subtree(&self, subpath: &[String]) -> Result<Leaves<'_>> {
        if subpath.is_empty() {
            return Ok(self.walk_leaves());
        }
        let node = self.find(subpath)?;
        Ok(Leaves::new(subpath.join("/"), node))
    }

    /// Deterministic pre-order walk over every data leaf
    pub fn walk_leaves(&self) -> Leaves<'_> {
        Leaves::from_group(String::new(), &self.root)
    }

    /// Every blob referenced by this manifest
    pub fn blob_hashes(&self) -> BTreeSet<Hash> {
        self.walk_leaves().map(|(_, leaf)| leaf.blob).collect()
    }
}

/// Iterator over `(logical_path, leaf)` pairs in lexicographic pre-order
pub struct Leaves<'a> {
    stack: Vec<(String, &'a Node)>,
    root_group: Option<(String, &'a GroupNode)>,
}

impl<'a> Leaves<'a> {
    fn new(path: String, node: &'a Node) -> Self {
        Leaves {
            stack: vec![(path, node)],
            root_group: None,
        }
    }

    fn from_group(path: String, group: &'a GroupNode) -> Self {
        Leaves {
            stack: Vec::new(),
            root_group: Some((path, group)),
        }
    }

    fn push_children(&mut self, prefix: &str, group: &'a GroupNode) {
        // Reverse so the smallest name is popped first.
        for (name, child) in group.children.iter().rev() {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            self.stack.push((path, child));
        }
    }
}

impl<'a> Iterator for Leaves<'a> {
    type Item = (String, &'a DataNode);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((prefix, group)) = self.root_group.take() {
            self.push_children(&prefix, group);
        }
        while let Some((path, node)) = self.stack.pop() {
            match node {
                Node::Data(leaf) => return Some((path, leaf)),
                Node::Group(group) => self.push_children(&path, group),
            }
        }
        None
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
