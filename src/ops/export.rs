//! Export - materialize a package or subtree onto the filesystem

use crate::model::{DataNode, PackageAddress};
use crate::remote::RegistryClient;
use crate::store::PackageStore;
use crate::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

type Filter<'a> = Box<dyn Fn(&str) -> bool + 'a>;
type Mapper<'a> = Box<dyn Fn(&str) -> PathBuf + 'a>;

/// How an export treats existing files and which leaves it writes
#[derive(Default)]
pub struct ExportOptions<'a> {
    force: bool,
    filter: Option<Filter<'a>>,
    mapper: Option<Mapper<'a>>,
}

impl<'a> ExportOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite files that already exist at a destination
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Only export leaves whose logical path passes `filter`
    pub fn filter(mut self, filter: impl Fn(&str) -> bool + 'a) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Map a logical path to a destination relative to the export root
    pub fn mapper(mut self, mapper: impl Fn(&str) -> PathBuf + 'a) -> Self {
        self.mapper = Some(Box::new(mapper));
        self
    }

    fn includes(&self, logical: &str) -> bool {
        self.filter.as_ref().map_or(true, |f| f(logical))
    }

    fn destination(&self, logical: &str) -> PathBuf {
        match &self.mapper {
            Some(mapper) => mapper(logical),
            None => logical.split('/').collect(),
        }
    }
}

struct PlannedWrite<'m> {
    logical: String,
    dest: PathBuf,
    leaf: &'m DataNode,
}

/// Writes installed packages out to plain files
pub struct Exporter<'a> {
    store: &'a PackageStore,
    registry: Option<&'a dyn RegistryClient>,
}

impl<'a> Exporter<'a> {
    pub fn new(store: &'a PackageStore) -> Self {
        Exporter {
            store,
            registry: None,
        }
    }

    /// Consult `registry` for versions and tags not known locally
    pub fn with_registry(mut self, registry: &'a dyn RegistryClient) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Export the subtree `address` names into `dest_root`, returning the
    /// number of files written.
    ///
    /// Every collision and every missing blob is detected before the first
    /// write. A failure while writing leaves earlier files in place and is
    /// reported as [`Error::PartialExport`].
    pub fn export(
        &self,
        address: &PackageAddress,
        dest_root: &Path,
        options: &ExportOptions<'_>,
    ) -> Result<usize> {
        let resolved = self.store.resolve(address, self.registry)?;
        let leaves: Vec<(String, &DataNode)> = resolved
            .manifest
            .subtree(&address.subpath)?
            .filter(|(logical, _)| options.includes(logical))
            .collect();

        check_writable(dest_root)?;
        let plan = plan_writes(dest_root, leaves, options)?;
        debug!(
            package = %resolved.key,
            hash = %resolved.hash.short(),
            files = plan.len(),
            "planned export"
        );

        for write in &plan {
            if !self.store.blobs().exists(&write.leaf.blob) {
                return Err(Error::NotFound(format!(
                    "Blob {} for {}",
                    write.leaf.blob, write.logical
                )));
            }
        }

        let mut written = 0;
        for write in &plan {
            let result = self.store.blobs().get(&write.leaf.blob).and_then(|bytes| {
                if let Some(parent) = write.dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&write.dest, &bytes)?;
                Ok(())
            });

            if let Err(source) = result {
                warn!(
                    path = %write.dest.display(),
                    logical = %write.logical,
                    written,
                    error = %source,
                    "export interrupted"
                );
                return Err(Error::PartialExport {
                    written,
                    path: write.dest.clone(),
                    source: Box::new(source),
                });
            }
            written += 1;
        }

        info!(
            package = %resolved.key,
            dest = %dest_root.display(),
            files = written,
            "exported package"
        );
        Ok(written)
    }
}

/// Create `dest_root` if needed and probe that files can be created in it
fn check_writable(dest_root: &Path) -> Result<()> {
    fs::create_dir_all(dest_root).map_err(|e| unwritable(dest_root, e))?;
    tempfile::NamedTempFile::new_in(dest_root).map_err(|e| unwritable(dest_root, e))?;
    Ok(())
}

fn unwritable(dest_root: &Path, e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::PermissionDenied => Error::PermissionDenied(dest_root.to_path_buf()),
        _ if dest_root.is_file() => Error::PathConflict(dest_root.to_path_buf()),
        _ => Error::Io(e),
    }
}

fn plan_writes<'m>(
    dest_root: &Path,
    leaves: Vec<(String, &'m DataNode)>,
    options: &ExportOptions<'_>,
) -> Result<Vec<PlannedWrite<'m>>> {
    let mut plan = Vec::with_capacity(leaves.len());
    let mut targets = HashSet::new();

    for (logical, leaf) in leaves {
        let relative = options.destination(&logical);
        let is_plain_relative = relative.components().next().is_some()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain_relative {
            return Err(Error::InvalidTarget(format!(
                "{} maps to {}, which is not a relative path inside the export root",
                logical,
                relative.display()
            )));
        }

        let dest = dest_root.join(&relative);
        if !targets.insert(dest.clone()) {
            return Err(Error::PathConflict(dest));
        }
        plan.push(PlannedWrite { logical, dest, leaf });
    }

    for write in &plan {
        check_destination(dest_root, &write.dest, &targets, options.force)?;
    }
    Ok(plan)
}

fn check_destination(
    dest_root: &Path,
    dest: &Path,
    targets: &HashSet<PathBuf>,
    force: bool,
) -> Result<()> {
    // Directories below the root are created by the export; without force
    // none of them may exist yet.
    for ancestor in dest.ancestors().skip(1) {
        if ancestor == dest_root {
            break;
        }
        if targets.contains(ancestor) || ancestor.is_file() || (!force && ancestor.is_dir()) {
            return Err(Error::PathConflict(ancestor.to_path_buf()));
        }
    }

    if dest.is_dir() {
        return Err(Error::PathConflict(dest.to_path_buf()));
    }
    if dest.exists() && !force {
        return Err(Error::FileExists(dest.to_path_buf()));
    }
    Ok(())
}
