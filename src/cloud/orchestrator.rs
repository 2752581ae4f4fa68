//! The open orchestrator and the public API surface:
//! `DbCloud::open`/`open_read_only`, `savepoint`, and a `Drop`-time
//! blocking flush.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::{CloudOptions, DBConfig, CLOUD_MANIFEST_FILE_SIZE_LIMIT};
use crate::engine::{ColumnFamilyDescriptor, InnerEngine, TableFactory};
use crate::error::Result;

use super::bootstrap::{fetch_cloud_manifest, maybe_migrate_manifest_file, sanitize_directory};
use super::env::CloudEnv;
use super::epoch_roller::maybe_roll_new_epoch;
use super::manifest::manifest_file_name;
use super::object_store::ObjectStore;
use super::savepoint::savepoint as run_savepoint;

/// Whether the process-wide default subscriber has been installed yet
/// One process-wide logger, installed at most once.
static LOGGER_INIT: AtomicBool = AtomicBool::new(false);

fn ensure_logger() {
    if LOGGER_INIT.swap(true, Ordering::SeqCst) {
        return;
    }
    // `try_init` rather than `init`: a host application may already have
    // installed its own subscriber, and that should win silently.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

/// An open cloud-backed database handle.
pub struct DbCloud {
    engine: InnerEngine,
    env: Arc<CloudEnv>,
    local_dir: PathBuf,
    read_only: bool,
    max_file_opening_threads: usize,
    /// One-shot relaxation after a successful open. Benign if a
    /// background compaction observes a late `true -> false` transition.
    validate_filesize: AtomicBool,
}

impl DbCloud {
    pub fn open(
        config: &DBConfig,
        local_dbname: impl AsRef<Path>,
        column_families: &[ColumnFamilyDescriptor],
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self> {
        Self::open_impl(config, local_dbname.as_ref(), column_families, store, false)
    }

    pub fn open_read_only(
        config: &DBConfig,
        local_dbname: impl AsRef<Path>,
        column_families: &[ColumnFamilyDescriptor],
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self> {
        Self::open_impl(config, local_dbname.as_ref(), column_families, store, true)
    }

    fn open_impl(
        config: &DBConfig,
        local_dir: &Path,
        column_families: &[ColumnFamilyDescriptor],
        store: Arc<dyn ObjectStore>,
        read_only: bool,
    ) -> Result<Self> {
        ensure_logger();

        let cloud = &config.cloud;
        let env = Arc::new(CloudEnv::new(store, cloud.src_bucket.clone(), cloud.dest_bucket.clone()));

        if !read_only {
            run_bootstrap_pipeline(&env, cloud, local_dir, read_only)?;
        }

        // Steps 8-9: build the table factory -- installing a persistent
        // cache if requested and not already present -- and compute the
        // forced manifest rollover threshold *before* the inner engine
        // opens. Patching either onto an already-open engine would be too
        // late: the cloud layer re-uploads the manifest on every update, so
        // a large local rollover threshold would only delay that upload,
        // and a cache installed after open misses whatever the open itself
        // already read through the table factory.
        let mut table_factory = TableFactory::new();
        if let Some(cache) = &cloud.persistent_cache {
            table_factory.install_persistent_cache(cache);
        }
        let max_manifest_file_size = CLOUD_MANIFEST_FILE_SIZE_LIMIT;

        let engine = if read_only {
            InnerEngine::open_read_only(local_dir, column_families, &env, table_factory, max_manifest_file_size)?
        } else {
            InnerEngine::open(local_dir, column_families, &env, table_factory, max_manifest_file_size)?
        };

        // Step 11: the open path has already validated every file size, so
        // the relaxation is cleared the moment the open succeeds, regardless
        // of what the caller configured going in.
        let validate_filesize = AtomicBool::new(cloud.validate_filesize);
        validate_filesize.store(false, Ordering::Relaxed);

        tracing::info!(dbid = %engine.get_db_identity(), read_only, "cloud database open");

        Ok(Self {
            engine,
            env,
            local_dir: local_dir.to_path_buf(),
            read_only,
            max_file_opening_threads: cloud.max_file_opening_threads,
            validate_filesize,
        })
    }

    pub fn db_identity(&self) -> &str {
        self.engine.get_db_identity()
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    pub fn validate_filesize(&self) -> bool {
        self.validate_filesize.load(Ordering::Relaxed)
    }

    /// Whether the engine's table factory already carries a persistent
    /// cache. Installed by `open_impl` before the engine opens, so this
    /// reflects what the running engine actually had in effect.
    pub fn has_persistent_cache(&self) -> bool {
        self.engine.table_factory().has_persistent_cache()
    }

    /// Mirror every live data file from src to dest.
    pub fn savepoint(&self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        let live_files = self.engine.get_live_files_metadata();
        run_savepoint(&self.env, &live_files, self.max_file_opening_threads)
    }

    fn flush(&self) {
        if self.read_only {
            return;
        }
        if let Err(e) = self.engine.flush() {
            tracing::warn!(error = %e, "flush at close failed");
        }
    }
}

impl Drop for DbCloud {
    /// Blocking flush, ensuring the latest manifest is durable in the
    /// object store.
    fn drop(&mut self) {
        self.flush();
    }
}

/// The bootstrap/sanitize/roll steps, skipped entirely for read-only opens.
fn run_bootstrap_pipeline(env: &CloudEnv, cloud: &CloudOptions, local_dir: &Path, read_only: bool) -> Result<()> {
    sanitize_directory(env, cloud, local_dir, read_only)?;
    maybe_migrate_manifest_file(local_dir)?;
    let manifest = fetch_cloud_manifest(env, cloud, local_dir)?;
    env.load_cloud_manifest(manifest);
    maybe_roll_new_epoch(env, cloud, local_dir)?;
    // Best-effort: log and ignore failure.
    if let Err(e) = delete_invisible_files(env, local_dir) {
        tracing::warn!(error = %e, "invisible-file cleanup failed, continuing");
    }
    Ok(())
}

/// Every `MANIFEST-<epoch>` the loaded cloud manifest still references
/// (every recorded cut-over plus the current epoch) is kept; everything
/// else that isn't `CURRENT`/`IDENTITY`/`CLOUDMANIFEST`/`LOG*` is a
/// leftover from a prior generation and is swept.
fn delete_invisible_files(env: &CloudEnv, local_dir: &Path) -> Result<()> {
    let keep = env.with_manifest(|m| {
        let mut names: Vec<String> = m.entries().iter().map(|e| manifest_file_name(&e.epoch)).collect();
        names.push(manifest_file_name(m.current_epoch()));
        names
    })?;
    env.delete_invisible_files(local_dir, &keep)
}
