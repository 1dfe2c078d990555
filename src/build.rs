//! Build staging: turning source content into a manifest plus payloads
//!
//! Parsing specific source formats is left to external converters; they
//! only need to produce a [`PackageBuild`]. [`DirectoryConverter`] covers
//! the common case of packaging a directory of files as-is.

use crate::model::{DataNode, GroupNode, Hash, ManifestTree};
use crate::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path};
use tracing::debug;
use walkdir::WalkDir;

/// Format tag for payloads with no recognisable extension
pub const RAW_FORMAT: &str = "raw";

/// A manifest ready for ingest, with the bytes of the blobs it introduces
#[derive(Clone, Debug)]
pub struct PackageBuild {
    pub tree: ManifestTree,
    pub payloads: HashMap<Hash, Vec<u8>>,
}

impl PackageBuild {
    /// A build whose blobs are all expected to be stored already
    pub fn from_tree(tree: ManifestTree) -> Self {
        PackageBuild {
            tree,
            payloads: HashMap::new(),
        }
    }
}

/// Accumulates leaves into a tree
#[derive(Default)]
pub struct PackageBuilder {
    root: GroupNode,
    payloads: HashMap<Hash, Vec<u8>>,
}

impl PackageBuilder {
    pub fn new() -> Self {
        PackageBuilder::default()
    }

    /// Add a payload at a `/`-separated logical path
    pub fn add_bytes(
        &mut self,
        path: &str,
        format: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Hash> {
        let hash = Hash::digest(&bytes);
        self.root.insert_path(path, DataNode::new(hash, format))?;
        self.payloads.entry(hash).or_insert(bytes);
        Ok(hash)
    }

    /// Add a leaf whose blob is already in the store
    pub fn add_node(&mut self, path: &str, node: DataNode) -> Result<()> {
        self.root.insert_path(path, node)
    }

    pub fn finish(self, message: Option<String>) -> PackageBuild {
        let mut tree = ManifestTree::new(self.root);
        tree.message = message;
        PackageBuild {
            tree,
            payloads: self.payloads,
        }
    }
}

/// Produces a package build from some source location
pub trait SourceConverter {
    fn build(&self, source_root: &Path) -> Result<PackageBuild>;
}

/// Packages every regular file under a directory, keeping relative paths
#[derive(Clone, Debug)]
pub struct DirectoryConverter {
    /// Skip files and directories whose name starts with `.`
    pub skip_hidden: bool,
    /// Message recorded on the manifest
    pub message: Option<String>,
}

impl Default for DirectoryConverter {
    fn default() -> Self {
        DirectoryConverter {
            skip_hidden: true,
            message: None,
        }
    }
}

impl SourceConverter for DirectoryConverter {
    fn build(&self, source_root: &Path) -> Result<PackageBuild> {
        if !source_root.is_dir() {
            return Err(Error::NotFound(format!(
                "Source directory {}",
                source_root.display()
            )));
        }

        let mut builder = PackageBuilder::new();
        let skip_hidden = self.skip_hidden;
        let walker = WalkDir::new(source_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || !(skip_hidden && e.file_name().to_string_lossy().starts_with('.'))
            });

        for entry in walker {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(source_root)
                .map_err(|_| Error::InvalidName(entry.path().display().to_string()))?;
            let logical = logical_path(relative)?;
            let bytes = fs::read(entry.path())?;
            builder.add_bytes(&logical, format_for(relative), bytes)?;
        }

        let build = builder.finish(self.message.clone());
        debug!(
            source = %source_root.display(),
            leaves = build.tree.walk_leaves().count(),
            blobs = build.payloads.len(),
            "built package from directory"
        );
        Ok(build)
    }
}

fn logical_path(relative: &Path) -> Result<String> {
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => segments.push(
                part.to_str()
                    .ok_or_else(|| Error::InvalidName(part.to_string_lossy().into_owned()))?
                    .to_string(),
            ),
            _ => return Err(Error::InvalidName(relative.display().to_string())),
        }
    }
    Ok(segments.join("/"))
}

fn format_for(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| RAW_FORMAT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builder_shares_payloads() {
        let mut builder = PackageBuilder::new();
        let a = builder.add_bytes("a.txt", "txt", b"same".to_vec()).unwrap();
        let b = builder.add_bytes("dir/b.txt", "txt", b"same".to_vec()).unwrap();
        assert_eq!(a, b);

        let build = builder.finish(Some("shared".into()));
        assert_eq!(build.payloads.len(), 1);
        assert_eq!(build.tree.walk_leaves().count(), 2);
        assert_eq!(build.tree.message.as_deref(), Some("shared"));
    }

    #[test]
    fn test_directory_converter() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("3-bad-identifier")).unwrap();
        fs::write(dir.path().join("readme.md"), b"# readme").unwrap();
        fs::write(dir.path().join("single_file"), b"single").unwrap();
        fs::write(dir.path().join("3-bad-identifier/9{}bad.html"), b"<p>").unwrap();
        fs::write(dir.path().join(".hidden"), b"secret").unwrap();

        let build = DirectoryConverter::default().build(dir.path()).unwrap();
        let leaves: Vec<(String, String)> = build
            .tree
            .walk_leaves()
            .map(|(path, leaf)| (path, leaf.format.clone()))
            .collect();

        assert_eq!(
            leaves,
            vec![
                ("3-bad-identifier/9{}bad.html".to_string(), "html".to_string()),
                ("readme.md".to_string(), "md".to_string()),
                ("single_file".to_string(), RAW_FORMAT.to_string()),
            ]
        );
        assert_eq!(build.payloads.len(), 3);
    }

    #[test]
    fn test_identical_sources_hash_identically() {
        let one = tempdir().unwrap();
        let two = tempdir().unwrap();
        for dir in [&one, &two] {
            fs::write(dir.path().join("data.csv"), b"a,b\n1,2\n").unwrap();
        }
        let converter = DirectoryConverter::default();
        let h1 = converter.build(one.path()).unwrap().tree.root_hash();
        let h2 = converter.build(two.path()).unwrap().tree.root_hash();
        assert_eq!(h1, h2);

        fs::write(two.path().join("data.csv"), b"a,b\n1,3\n").unwrap();
        let h3 = converter.build(two.path()).unwrap().tree.root_hash();
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_missing_source() {
        let dir = tempdir().unwrap();
        let err = DirectoryConverter::default()
            .build(&dir.path().join("nope"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
