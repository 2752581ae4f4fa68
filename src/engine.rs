//! The inner LSM engine collaborator: the thinnest real
//! implementation that satisfies the contract the cloud core needs to be
//! runnable end to end, rather than a bag of traits with no body.
//!
//! It persists a local `CURRENT`/`MANIFEST-NNNNNN` pair via
//! [`crate::storage::manifest::Manifest`], tracks live files, and exposes
//! identity plus a table factory that can carry an optional persistent
//! cache handle. Full LSM read/write/compaction machinery is out of
//! scope here -- this is the collaborator boundary, not a
//! competing storage engine.

use std::path::{Path, PathBuf};

use crate::cloud::CloudEnv;
use crate::config::PersistentCacheOptions;
use crate::error::Result;
use crate::storage::manifest::{FileMetadata, Manifest};

/// A column family descriptor, as the engine's `Open`/`OpenForReadOnly`
/// entry points require. The cloud core never inspects the
/// contents of these beyond passing them through.
#[derive(Debug, Clone)]
pub struct ColumnFamilyDescriptor {
    pub name: String,
}

impl ColumnFamilyDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// An installed persistent (block) cache: a local path plus a size budget.
#[derive(Debug, Clone)]
pub struct PersistentCacheHandle {
    pub path: PathBuf,
    pub size_gb: u64,
}

/// A configurable table factory exposing an optional persistent-cache
/// handle. The cloud core installs a cache here if requested
/// and one isn't already present.
#[derive(Debug, Clone, Default)]
pub struct TableFactory {
    persistent_cache: Option<PersistentCacheHandle>,
}

impl TableFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_persistent_cache(&self) -> bool {
        self.persistent_cache.is_some()
    }

    pub fn persistent_cache(&self) -> Option<&PersistentCacheHandle> {
        self.persistent_cache.as_ref()
    }

    /// Install a persistent cache sized in GiB. A no-op if one is already
    /// installed: a no-op if the table factory already has one.
    pub fn install_persistent_cache(&mut self, opts: &PersistentCacheOptions) {
        if self.persistent_cache.is_some() {
            return;
        }
        self.persistent_cache = Some(PersistentCacheHandle {
            path: PathBuf::from(&opts.path),
            size_gb: opts.size_gb,
        });
    }
}

/// The inner LSM database: a real (if deliberately thin) engine sitting
/// under the cloud core, grounded in [`crate::storage::manifest`].
pub struct InnerEngine {
    manifest: Manifest,
    identity: String,
    table_factory: TableFactory,
    max_manifest_file_size: u64,
}

impl InnerEngine {
    /// Open against `env`'s loaded cloud manifest: the nominal
    /// `MANIFEST-000001` name `CURRENT` carries is resolved to its
    /// epoch-stamped physical file via `env.remap_name` before anything
    /// touches disk. This is the seam that keeps the engine's own
    /// fixed-filename assumption compatible with the cloud layer's
    /// epoch-qualified storage without the engine knowing about epochs at
    /// all.
    ///
    /// `table_factory` and `max_manifest_file_size` are baked in at
    /// construction rather than patched on afterward: a persistent cache
    /// or a forced rollover threshold only take effect if the engine has
    /// them the moment it opens, not once it is already running.
    pub fn open(
        local_dir: &Path,
        _column_families: &[ColumnFamilyDescriptor],
        env: &CloudEnv,
        table_factory: TableFactory,
        max_manifest_file_size: u64,
    ) -> Result<Self> {
        Self::open_with(local_dir, env, table_factory, max_manifest_file_size)
    }

    /// The cloud core does not special-case reads at the inner-engine
    /// level: the engine's own `Manifest::open` recovery path is already
    /// read-and-recover, never destructive. The read-only distinction
    /// lives one layer up, in whether the orchestrator runs the
    /// bootstrap/sanitize/roll pipeline before delegating here.
    pub fn open_read_only(
        local_dir: &Path,
        column_families: &[ColumnFamilyDescriptor],
        env: &CloudEnv,
        table_factory: TableFactory,
        max_manifest_file_size: u64,
    ) -> Result<Self> {
        Self::open(local_dir, column_families, env, table_factory, max_manifest_file_size)
    }

    fn open_with(local_dir: &Path, env: &CloudEnv, table_factory: TableFactory, max_manifest_file_size: u64) -> Result<Self> {
        let manifest = Manifest::open_with_remap(local_dir, |name| {
            env.remap_name(name).unwrap_or_else(|_| name.to_string())
        })?;
        let identity = crate::cloud::local_files::read_identity(local_dir).unwrap_or_default();
        Ok(Self {
            manifest,
            identity,
            table_factory,
            max_manifest_file_size,
        })
    }

    /// Open with no cloud manifest loaded (plain local use, outside the
    /// `DbCloud` pipeline): the nominal name is used verbatim as the
    /// physical name.
    pub fn open_standalone(local_dir: &Path, _column_families: &[ColumnFamilyDescriptor]) -> Result<Self> {
        let manifest = Manifest::open(local_dir)?;
        let identity = crate::cloud::local_files::read_identity(local_dir).unwrap_or_default();
        Ok(Self {
            manifest,
            identity,
            table_factory: TableFactory::new(),
            max_manifest_file_size: crate::config::LSMConfig::default().max_manifest_file_size,
        })
    }

    pub fn max_manifest_file_size(&self) -> u64 {
        self.max_manifest_file_size
    }

    pub fn get_live_files_metadata(&self) -> Vec<FileMetadata> {
        self.manifest.current_version().files.into_values().collect()
    }

    pub fn get_db_identity(&self) -> &str {
        &self.identity
    }

    pub fn data_dir(&self) -> &Path {
        self.manifest.data_dir()
    }

    pub fn table_factory(&self) -> &TableFactory {
        &self.table_factory
    }

    /// Blocking flush: the engine already `fsync`s on every
    /// [`Manifest::apply_edit`], so the durability guarantee `Drop` needs
    /// already holds by the time this runs; kept as an
    /// explicit call so the intent is visible at the call site.
    pub fn flush(&self) -> Result<()> {
        Ok(())
    }
}
