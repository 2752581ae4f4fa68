//! Bootstrap / sanitizer: deciding whether a local
//! directory is a usable cache for the configured (src, dest) pair, and
//! reseeding it from the object store when it is not.

use crate::config::CloudOptions;
use crate::error::{Result, StorageError};
use std::fs;
use std::path::Path;

use super::env::{CloudEnv, DBID_SEPARATOR};
use super::epoch::{new_epoch, LEGACY_EPOCH};
use super::local_files::{read_current, read_identity, write_dummy_current, write_identity, CURRENT_FILE, IDENTITY_FILE};
use super::manifest::{CloudManifest, CLOUD_MANIFEST_FILE_NAME};

fn lookup_dbid_path(env: &CloudEnv, bucket: &crate::cloud::BucketOptions, dbid: &str) -> Result<Option<String>> {
    env.get_path_for_dbid(bucket, dbid)
}

/// `true` if `path` exists, `false` if it's absent, and any other I/O
/// error (permission denied, ...) propagated rather than collapsed into
/// either outcome.
fn probe_exists(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Decide whether `local_dir` is a usable cache for `cloud`'s (src, dest)
/// pair, or must be reinitialized.
pub fn needs_reinitialization(env: &CloudEnv, cloud: &CloudOptions, local_dir: &Path) -> Result<bool> {
    let src = &cloud.src_bucket;
    let dest = &cloud.dest_bucket;

    // No cloud storage configured at all: nothing to sanitize against.
    if src.is_empty() && dest.is_empty() {
        return Ok(false);
    }

    // Missing directory or missing bookkeeping files: must reinitialize.
    // Any other I/O error (permission denied, ...) fails the open outright
    // rather than being silently treated as "needs reinit".
    match fs::metadata(local_dir) {
        Ok(meta) if !meta.is_dir() => return Ok(true),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    }
    if !probe_exists(&local_dir.join(CURRENT_FILE))? || !probe_exists(&local_dir.join(IDENTITY_FILE))? {
        return Ok(true);
    }

    let local_dbid = read_identity(local_dir)?;

    let src_dbid_path = if !src.is_empty() { lookup_dbid_path(env, src, &local_dbid)? } else { None };

    let dest_dbid_path = if !dest.is_empty() {
        let found = lookup_dbid_path(env, dest, &local_dbid)?;
        if let Some(ref path) = found {
            if path.trim_end_matches('/') != dest.trimmed_object_prefix() {
                return Err(StorageError::InvalidArgument(format!(
                    "local directory belongs to a different clone: dbid {local_dbid} is registered under {path}, configured dest is {}",
                    dest.trimmed_object_prefix()
                )));
            }
        }
        found
    } else {
        None
    };

    // A src registration for the local dbid exists, but src and dest name
    // different buckets — inconsistent with clone mode. Only meaningful
    // when dest is actually configured; an unconfigured dest is not a
    // competing bucket to be inconsistent with.
    if src_dbid_path.is_some() && !dest.is_empty() && src.bucket_prefix != dest.bucket_prefix {
        return Ok(true);
    }

    // Symmetric check for dest.
    if dest_dbid_path.is_some() && !src.is_empty() && dest.bucket_prefix != src.bucket_prefix {
        return Ok(true);
    }

    if src_dbid_path.is_none() && dest_dbid_path.is_none() {
        return Ok(true);
    }

    Ok(false)
}

/// Run the sanitizer after the reinit decision: cross-check configuration,
/// wipe-and-reseed when reinit is required, otherwise no-op.
pub fn sanitize_directory(env: &CloudEnv, cloud: &CloudOptions, local_dir: &Path, read_only: bool) -> Result<()> {
    if cloud.is_cloud_disabled() {
        return Ok(());
    }
    if !cloud.is_supported_cloud_type() {
        return Err(StorageError::NotSupported(format!("unsupported cloud type: {:?}", cloud.cloud_type)));
    }

    if cloud.dest_bucket.is_empty() {
        if cloud.max_open_files != -1 {
            return Err(StorageError::InvalidArgument("max_open_files must be -1 when dest bucket is empty".into()));
        }
        if !cloud.keep_local_sst_files {
            return Err(StorageError::InvalidArgument("keep_local_sst_files must be true when dest bucket is empty".into()));
        }
    }

    if !needs_reinitialization(env, cloud, local_dir)? {
        return Ok(());
    }

    if !local_dir.exists() {
        if read_only {
            return Err(StorageError::NotFound(format!("local directory {} does not exist", local_dir.display())));
        }
        fs::create_dir_all(local_dir)?;
    } else {
        for entry in fs::read_dir(local_dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with("LOG") {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
    }

    let dest = &cloud.dest_bucket;
    let src = &cloud.src_bucket;
    let identity_path = local_dir.join(IDENTITY_FILE);

    let mut dbid_from_src = false;
    let mut dbid: Option<String> = None;

    if !dest.is_empty() {
        match env.get_object(dest, IDENTITY_FILE, &identity_path) {
            Ok(()) => dbid = Some(read_identity(local_dir)?),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }

    if dbid.is_none() && !src.is_empty() && (dest.is_empty() || src.bucket_prefix != dest.bucket_prefix) {
        match env.get_object(src, IDENTITY_FILE, &identity_path) {
            Ok(()) => {
                dbid = Some(read_identity(local_dir)?);
                dbid_from_src = true;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }

    let dbid = match dbid {
        // Both lookups missed: brand-new database. Mint a dbid now rather
        // than waiting on the engine: scenario 1 requires dest to already
        // hold an IDENTITY once open succeeds, before any file has ever
        // been written.
        None => {
            let fresh_dbid = new_epoch();
            write_identity(local_dir, &fresh_dbid)?;
            if !dest.is_empty() {
                env.put_object(&identity_path, dest, IDENTITY_FILE)?;
                env.register_dbid(dest, &fresh_dbid, dest.trimmed_object_prefix())?;
            }
            write_dummy_current(local_dir)?;
            return Ok(());
        }
        Some(dbid) => dbid,
    };

    if dbid_from_src && !dest.is_empty() && dest.bucket_prefix != src.bucket_prefix {
        let suffix = new_epoch();
        let clone_dbid = format!("{dbid}{DBID_SEPARATOR}{suffix}");
        write_identity(local_dir, &clone_dbid)?;
        // Dest must be self-sufficient after a clone open: upload the
        // freshly-minted IDENTITY alongside registering it, not just
        // writing it locally.
        env.put_object(&identity_path, dest, IDENTITY_FILE)?;
        env.register_dbid(dest, &clone_dbid, dest.trimmed_object_prefix())?;
    }

    write_dummy_current(local_dir)?;
    Ok(())
}

/// Load the cloud manifest for this open: prefer dest, fall back to src,
/// else create a fresh legacy manifest.
pub fn fetch_cloud_manifest(env: &CloudEnv, cloud: &CloudOptions, local_dir: &Path) -> Result<CloudManifest> {
    let local_path = local_dir.join(CLOUD_MANIFEST_FILE_NAME);
    let dest = &cloud.dest_bucket;
    let src = &cloud.src_bucket;

    if dest.is_empty() && local_path.exists() {
        return CloudManifest::read_from_log(&local_path);
    }

    if !dest.is_empty() {
        match env.get_object(dest, CLOUD_MANIFEST_FILE_NAME, &local_path) {
            Ok(()) => return CloudManifest::read_from_log(&local_path),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }

    if !src.is_empty() && src.bucket_prefix != dest.bucket_prefix {
        match env.get_object(src, CLOUD_MANIFEST_FILE_NAME, &local_path) {
            Ok(()) => return CloudManifest::read_from_log(&local_path),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }

    let manifest = CloudManifest::create_empty(LEGACY_EPOCH);
    manifest.write_to_log(&local_path)?;
    Ok(manifest)
}

/// Rename a legacy numbered manifest (`MANIFEST-000001`) referenced by
/// `CURRENT` to the epoch-less `MANIFEST` name the cloud pipeline expects.
/// A no-op when `CURRENT` is absent, already points at `MANIFEST`, or the
/// referenced file does not exist locally.
pub fn maybe_migrate_manifest_file(local_dir: &Path) -> Result<()> {
    let current_path = local_dir.join(CURRENT_FILE);
    if !current_path.exists() {
        return Ok(());
    }
    let referenced = read_current(local_dir)?;
    if referenced.is_empty() || referenced == "MANIFEST" {
        return Ok(());
    }
    let referenced_path = local_dir.join(&referenced);
    if !referenced_path.exists() {
        return Ok(());
    }
    fs::rename(&referenced_path, local_dir.join("MANIFEST"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{BucketOptions, MemoryObjectStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn env_with(store: &MemoryObjectStore, src: BucketOptions, dest: BucketOptions) -> CloudEnv {
        CloudEnv::new(Arc::new(store.clone()), src, dest)
    }

    #[test]
    fn no_cloud_interaction_when_both_buckets_empty() {
        let store = MemoryObjectStore::new();
        let env = env_with(&store, BucketOptions::empty(), BucketOptions::empty());
        let dir = TempDir::new().unwrap();
        let cloud = CloudOptions::default();
        assert!(!needs_reinitialization(&env, &cloud, dir.path()).unwrap());
    }

    #[test]
    fn dest_only_registration_with_no_src_does_not_force_reinit() {
        let store = MemoryObjectStore::new();
        let dest = BucketOptions::new("dest-bucket", "db");
        let env = env_with(&store, BucketOptions::empty(), dest.clone());
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CURRENT_FILE), "MANIFEST-000001\n").unwrap();
        fs::write(dir.path().join(IDENTITY_FILE), "existing-dbid\n").unwrap();
        store.register_dbid("dest-bucket", "existing-dbid", "db").unwrap();

        let mut cloud = CloudOptions::default();
        cloud.dest_bucket = dest;

        assert!(!needs_reinitialization(&env, &cloud, dir.path()).unwrap());
    }

    #[test]
    fn missing_local_files_force_reinit() {
        let store = MemoryObjectStore::new();
        let dest = BucketOptions::new("dest-bucket", "db");
        let env = env_with(&store, BucketOptions::empty(), dest.clone());
        let dir = TempDir::new().unwrap();
        let mut cloud = CloudOptions::default();
        cloud.dest_bucket = dest;
        assert!(needs_reinitialization(&env, &cloud, dir.path()).unwrap());
    }

    #[test]
    fn sanitize_directory_brand_new_database_mints_and_uploads_identity() {
        let store = MemoryObjectStore::new();
        let dest = BucketOptions::new("dest-bucket", "db");
        let env = env_with(&store, BucketOptions::empty(), dest.clone());
        let dir = TempDir::new().unwrap();
        let mut cloud = CloudOptions::default();
        cloud.dest_bucket = dest.clone();

        sanitize_directory(&env, &cloud, dir.path(), false).unwrap();

        assert_eq!(read_current(dir.path()).unwrap(), "MANIFEST-000001");
        let minted = read_identity(dir.path()).unwrap();
        assert!(!minted.is_empty());

        let uploaded = store.get_bytes("dest-bucket", &dest.object_path(IDENTITY_FILE)).unwrap();
        assert_eq!(std::str::from_utf8(&uploaded).unwrap().trim(), minted);
    }

    #[test]
    fn sanitize_directory_clone_mints_suffixed_dbid() {
        let store = MemoryObjectStore::new();
        store.seed("src-bucket", "db/IDENTITY", b"base-dbid\n".to_vec());

        let src = BucketOptions::new("src-bucket", "db");
        let dest = BucketOptions::new("dest-bucket", "db");
        let env = env_with(&store, src.clone(), dest.clone());
        let dir = TempDir::new().unwrap();
        let mut cloud = CloudOptions::default();
        cloud.src_bucket = src;
        cloud.dest_bucket = dest.clone();

        sanitize_directory(&env, &cloud, dir.path(), false).unwrap();

        let minted = read_identity(dir.path()).unwrap();
        assert!(minted.starts_with("base-dbid"));
        assert!(minted.contains(DBID_SEPARATOR));
        assert_ne!(minted, "base-dbid");

        let uploaded = store.get_bytes("dest-bucket", &dest.object_path(IDENTITY_FILE)).unwrap();
        assert_eq!(std::str::from_utf8(&uploaded).unwrap().trim(), minted);
    }

    #[test]
    fn sanitize_directory_rejects_unsupported_cloud_type() {
        let store = MemoryObjectStore::new();
        let env = env_with(&store, BucketOptions::empty(), BucketOptions::empty());
        let dir = TempDir::new().unwrap();
        let mut cloud = CloudOptions::default();
        cloud.cloud_type = crate::config::CloudType::Other("gcp".into());
        assert!(sanitize_directory(&env, &cloud, dir.path(), false).is_err());
    }

    #[test]
    fn sanitize_directory_rejects_bad_config_with_empty_dest() {
        let store = MemoryObjectStore::new();
        let env = env_with(&store, BucketOptions::empty(), BucketOptions::empty());
        let dir = TempDir::new().unwrap();
        let mut cloud = CloudOptions::default();
        cloud.cloud_type = crate::config::CloudType::Aws;
        cloud.max_open_files = 100;
        assert!(sanitize_directory(&env, &cloud, dir.path(), false).is_err());
    }

    #[test]
    fn fetch_cloud_manifest_creates_legacy_when_absent_everywhere() {
        let store = MemoryObjectStore::new();
        let dest = BucketOptions::new("dest-bucket", "db");
        let env = env_with(&store, BucketOptions::empty(), dest.clone());
        let dir = TempDir::new().unwrap();
        let mut cloud = CloudOptions::default();
        cloud.dest_bucket = dest;

        let manifest = fetch_cloud_manifest(&env, &cloud, dir.path()).unwrap();
        assert!(manifest.is_legacy());
    }

    #[test]
    fn maybe_migrate_manifest_file_renames_legacy_numbered_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CURRENT_FILE), "MANIFEST-000001\n").unwrap();
        fs::write(dir.path().join("MANIFEST-000001"), b"data").unwrap();

        maybe_migrate_manifest_file(dir.path()).unwrap();

        assert!(dir.path().join("MANIFEST").exists());
        assert!(!dir.path().join("MANIFEST-000001").exists());
    }

    #[test]
    fn maybe_migrate_manifest_file_is_idempotent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CURRENT_FILE), "MANIFEST-000001\n").unwrap();
        fs::write(dir.path().join("MANIFEST-000001"), b"data").unwrap();

        maybe_migrate_manifest_file(dir.path()).unwrap();
        maybe_migrate_manifest_file(dir.path()).unwrap();

        assert!(dir.path().join("MANIFEST").exists());
    }
}
