//! The cloud environment: the engine-facing binding point that routes
//! `RemapFilename`, cloud-manifest load/get, invisible-file cleanup and
//! the object-store passthroughs through one handle.

use crate::error::{Result, StorageError};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

use super::bucket::BucketOptions;
use super::epoch::generate_unique_id;
use super::manifest::CloudManifest;
use super::object_store::ObjectStore;

/// Separator between a base dbid and a clone's unique suffix. Exported so
/// callers can parse `<base>{SEP}<suffix>` back apart if needed.
pub const DBID_SEPARATOR: &str = "-clone-";

/// Binds an [`ObjectStore`] to a concrete (src, dest) bucket pair and owns
/// the loaded [`CloudManifest`] for the lifetime of one open database.
pub struct CloudEnv {
    store: Arc<dyn ObjectStore>,
    src: BucketOptions,
    dest: BucketOptions,
    manifest: RwLock<Option<CloudManifest>>,
}

impl CloudEnv {
    pub fn new(store: Arc<dyn ObjectStore>, src: BucketOptions, dest: BucketOptions) -> Self {
        Self {
            store,
            src,
            dest,
            manifest: RwLock::new(None),
        }
    }

    pub fn src(&self) -> &BucketOptions {
        &self.src
    }

    pub fn dest(&self) -> &BucketOptions {
        &self.dest
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Install a freshly fetched/created cloud manifest as the one this
    /// env serves `RemapFilename` from.
    pub fn load_cloud_manifest(&self, manifest: CloudManifest) {
        *self.manifest.write() = Some(manifest);
    }

    /// Run `f` with the loaded cloud manifest, or fail if none is loaded
    /// yet — fetching the cloud manifest must run before any engine read
    /// goes through this env.
    pub fn with_manifest<T>(&self, f: impl FnOnce(&CloudManifest) -> T) -> Result<T> {
        let guard = self.manifest.read();
        let manifest = guard
            .as_ref()
            .ok_or_else(|| StorageError::InvalidArgument("cloud manifest not loaded".into()))?;
        Ok(f(manifest))
    }

    /// Mutate the loaded cloud manifest in place (used only by the epoch
    /// roller, before it finalizes and re-installs via
    /// [`Self::load_cloud_manifest`]).
    pub fn with_manifest_mut<T>(&self, f: impl FnOnce(&mut CloudManifest) -> T) -> Result<T> {
        let mut guard = self.manifest.write();
        let manifest = guard
            .as_mut()
            .ok_or_else(|| StorageError::InvalidArgument("cloud manifest not loaded".into()))?;
        Ok(f(manifest))
    }

    /// Epoch-stamp a manifest file number into its object-store name.
    pub fn remap_filename(&self, file_number: u64) -> Result<String> {
        self.with_manifest(|m| m.remap(file_number))
    }

    /// `RemapFilename(name)` for an arbitrary file name: epoch-stamps
    /// `MANIFEST-<N>` names, passes every other name through unchanged.
    /// This is what [`super::savepoint::savepoint`] uses to locate a live
    /// file's object-store name.
    pub fn remap_name(&self, name: &str) -> Result<String> {
        self.with_manifest(|m| m.remap_name(name))
    }

    pub fn generate_unique_id(&self) -> u128 {
        generate_unique_id()
    }

    pub fn exists_object(&self, bucket: &BucketOptions, relative: &str) -> Result<bool> {
        self.store.exists(&bucket.bucket_prefix, &bucket.object_path(relative))
    }

    pub fn get_object(&self, bucket: &BucketOptions, relative: &str, local_dst: &Path) -> Result<()> {
        self.store.get(&bucket.bucket_prefix, &bucket.object_path(relative), local_dst)
    }

    pub fn put_object(&self, local_src: &Path, bucket: &BucketOptions, relative: &str) -> Result<()> {
        self.store.put(local_src, &bucket.bucket_prefix, &bucket.object_path(relative))
    }

    pub fn copy_object(&self, src: &BucketOptions, src_relative: &str, dst: &BucketOptions, dst_relative: &str) -> Result<()> {
        self.store.copy(
            &src.bucket_prefix,
            &src.object_path(src_relative),
            &dst.bucket_prefix,
            &dst.object_path(dst_relative),
        )
    }

    pub fn get_path_for_dbid(&self, bucket: &BucketOptions, dbid: &str) -> Result<Option<String>> {
        self.store.get_path_for_dbid(&bucket.bucket_prefix, dbid)
    }

    pub fn register_dbid(&self, bucket: &BucketOptions, dbid: &str, object_path: &str) -> Result<()> {
        self.store.register_dbid(&bucket.bucket_prefix, dbid, object_path)
    }

    /// Best-effort removal of stale epoch-stamped manifest files left
    /// behind by a prior generation: only `MANIFEST-<epoch>` names not in
    /// `keep` are invisible. Every other local file (SSTs, `CURRENT`,
    /// `IDENTITY`, `CLOUDMANIFEST`, `LOG*`) is always live data or
    /// bookkeeping and is never touched here.
    pub fn delete_invisible_files(&self, local_dir: &Path, keep: &[String]) -> Result<()> {
        let keep: std::collections::HashSet<&str> = keep.iter().map(|s| s.as_str()).collect();
        for entry in std::fs::read_dir(local_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name != "MANIFEST" && !name.starts_with("MANIFEST-") {
                continue;
            }
            if keep.contains(name.as_ref()) {
                continue;
            }
            tracing::debug!(file = %name, "deleting invisible file");
            std::fs::remove_file(entry.path())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::bucket::BucketOptions;
    use crate::cloud::object_store::MemoryObjectStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn delete_invisible_files_only_sweeps_stale_manifests() {
        let env = CloudEnv::new(Arc::new(MemoryObjectStore::new()), BucketOptions::empty(), BucketOptions::empty());
        let dir = TempDir::new().unwrap();

        std::fs::write(dir.path().join("CURRENT"), b"MANIFEST-000001\n").unwrap();
        std::fs::write(dir.path().join("IDENTITY"), b"db\n").unwrap();
        std::fs::write(dir.path().join("CLOUDMANIFEST"), b"{}").unwrap();
        std::fs::write(dir.path().join("LOG"), b"log").unwrap();
        std::fs::write(dir.path().join("000007.sst"), vec![0u8; 4]).unwrap();
        std::fs::write(dir.path().join("MANIFEST-aaaaaaaaaaaaaaaa"), b"stale").unwrap();
        std::fs::write(dir.path().join("MANIFEST-bbbbbbbbbbbbbbbb"), b"current").unwrap();

        env.delete_invisible_files(dir.path(), &["MANIFEST-bbbbbbbbbbbbbbbb".to_string()]).unwrap();

        assert!(dir.path().join("CURRENT").exists());
        assert!(dir.path().join("IDENTITY").exists());
        assert!(dir.path().join("CLOUDMANIFEST").exists());
        assert!(dir.path().join("LOG").exists());
        assert!(dir.path().join("000007.sst").exists());
        assert!(dir.path().join("MANIFEST-bbbbbbbbbbbbbbbb").exists());
        assert!(!dir.path().join("MANIFEST-aaaaaaaaaaaaaaaa").exists());
    }
}
