//! The epoch roller: decides, at open time, whether a new
//! epoch is needed -- and if so, mints one, rewrites the local manifest
//! name, and publishes both the manifest and the cloud manifest to dest
//! in the order a concurrent reader depends on (manifest object before
//! `CLOUDMANIFEST` object).

use std::path::Path;

use crate::config::CloudOptions;
use crate::error::Result;
use crate::storage::manifest::Manifest as LocalManifest;

use super::env::CloudEnv;
use super::epoch::new_epoch;
use super::manifest::{manifest_file_name, CLOUD_MANIFEST_FILE_NAME};

/// Roll a new epoch if nobody else has written since this process last
/// saw the cloud manifest; otherwise finalize in place.
pub fn maybe_roll_new_epoch(env: &CloudEnv, cloud: &CloudOptions, local_dir: &Path) -> Result<()> {
    let old_epoch = env.with_manifest(|m| m.current_epoch().to_string())?;
    let old_manifest_name = manifest_file_name(&old_epoch);
    let old_manifest_path = local_dir.join(&old_manifest_name);

    // Nobody else has written since we last ran.
    if !old_epoch.is_empty() && old_manifest_path.exists() {
        env.with_manifest_mut(|m| m.finalize())?;
        return Ok(());
    }

    let max_file_number = resolve_max_file_number(env, cloud, &old_manifest_path, &old_manifest_name)?;

    // Adding an epoch requires the file number to strictly exceed every
    // prior upper bound, which a database that has never written a file
    // can never satisfy: `max_file_number` stays 0 forever, since no local
    // `MANIFEST-<epoch>` is ever materialized below to satisfy the
    // "already rolled" check above on the next open. Treat "nothing new
    // since the last recorded cut-over" the same as "nothing new since we
    // last ran": finalize in place rather than violate monotonicity.
    let needs_new_epoch = env.with_manifest(|m| match m.entries().last() {
        Some(last) => max_file_number > last.file_number_upper_bound,
        None => true,
    })?;
    if !needs_new_epoch {
        env.with_manifest_mut(|m| m.finalize())?;
        return Ok(());
    }

    let epoch = new_epoch();

    env.with_manifest_mut(|m| m.add_epoch(max_file_number, epoch.clone()))??;
    env.with_manifest_mut(|m| m.finalize())?;

    if max_file_number > 0 {
        let new_manifest_path = local_dir.join(manifest_file_name(&epoch));
        std::fs::rename(&old_manifest_path, &new_manifest_path)?;

        if !cloud.dest_bucket.is_empty() {
            env.put_object(&new_manifest_path, &cloud.dest_bucket, &manifest_file_name(&epoch))?;
        }
    }

    // Upload the manifest object (above) before CLOUDMANIFEST (here), so a
    // concurrent reader of CLOUDMANIFEST never observes an epoch whose
    // manifest object doesn't exist yet.
    if !cloud.dest_bucket.is_empty() {
        let cloud_manifest_path = local_dir.join(CLOUD_MANIFEST_FILE_NAME);
        env.with_manifest(|m| m.write_to_log(&cloud_manifest_path))??;
        env.put_object(&cloud_manifest_path, &cloud.dest_bucket, CLOUD_MANIFEST_FILE_NAME)?;
    }

    Ok(())
}

/// Find the greatest file number recorded in the manifest the *old*
/// current epoch names. If it isn't present locally yet -- the common
/// case for a fresh clone, which only downloaded `IDENTITY` and
/// `CLOUDMANIFEST` during sanitization -- materialize it from dest,
/// falling back to src, before concluding this is a brand-new database.
fn resolve_max_file_number(env: &CloudEnv, cloud: &CloudOptions, local_path: &Path, remote_name: &str) -> Result<u64> {
    if local_path.exists() {
        return LocalManifest::read_max_file_number(local_path);
    }

    let dest = &cloud.dest_bucket;
    let src = &cloud.src_bucket;

    if !dest.is_empty() {
        match env.get_object(dest, remote_name, local_path) {
            Ok(()) => return LocalManifest::read_max_file_number(local_path),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }

    if !src.is_empty() && src.bucket_prefix != dest.bucket_prefix {
        match env.get_object(src, remote_name, local_path) {
            Ok(()) => return LocalManifest::read_max_file_number(local_path),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::manifest::CloudManifest;
    use crate::cloud::{BucketOptions, MemoryObjectStore};
    use crate::storage::manifest::{FileMetadata, FileType};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn env_with(store: &MemoryObjectStore, src: BucketOptions, dest: BucketOptions) -> CloudEnv {
        CloudEnv::new(Arc::new(store.clone()), src, dest)
    }

    #[test]
    fn fresh_database_dest_only_rolls_to_first_epoch_with_no_manifest_upload() {
        let store = MemoryObjectStore::new();
        let dest = BucketOptions::new("dest-bucket", "db");
        let env = env_with(&store, BucketOptions::empty(), dest.clone());
        let dir = TempDir::new().unwrap();
        let mut cloud = CloudOptions::default();
        cloud.dest_bucket = dest.clone();

        env.load_cloud_manifest(CloudManifest::create_empty(""));

        maybe_roll_new_epoch(&env, &cloud, dir.path()).unwrap();

        let new_epoch = env.with_manifest(|m| m.current_epoch().to_string()).unwrap();
        assert_ne!(new_epoch, "");
        assert!(store.get_bytes("dest-bucket", &dest.object_path("CLOUDMANIFEST")).is_some());
        assert!(store.get_bytes("dest-bucket", &dest.object_path(&manifest_file_name(&new_epoch))).is_none());
    }

    #[test]
    fn reopen_with_local_manifest_present_does_not_roll() {
        let store = MemoryObjectStore::new();
        let dest = BucketOptions::new("dest-bucket", "db");
        let env = env_with(&store, BucketOptions::empty(), dest.clone());
        let dir = TempDir::new().unwrap();
        let mut cloud = CloudOptions::default();
        cloud.dest_bucket = dest;

        let mut manifest = CloudManifest::create_empty("");
        manifest.add_epoch(0, "e1").unwrap();
        env.load_cloud_manifest(manifest);
        std::fs::write(dir.path().join(manifest_file_name("e1")), b"data").unwrap();

        maybe_roll_new_epoch(&env, &cloud, dir.path()).unwrap();

        let current = env.with_manifest(|m| m.current_epoch().to_string()).unwrap();
        assert_eq!(current, "e1");
        assert!(env.with_manifest(|m| m.is_finalized()).unwrap());
    }

    #[test]
    fn clone_downloads_old_epoch_manifest_to_learn_max_file_number_then_rolls() {
        let store = MemoryObjectStore::new();
        let src = BucketOptions::new("src-bucket", "db");
        let dest = BucketOptions::new("dest-bucket", "db");

        // Src already has MANIFEST-E0 with one live file at id 7. Build
        // that file's bytes via a throwaway local manifest -- we only
        // need `read_max_file_number` to see file id 7.
        let throwaway_dir = TempDir::new().unwrap();
        let throwaway = LocalManifest::open(throwaway_dir.path()).unwrap();
        let sst_path = throwaway_dir.path().join("000007.sst");
        std::fs::write(&sst_path, vec![0u8; 16]).unwrap();
        let checksum = LocalManifest::calculate_checksum(&sst_path).unwrap();
        let mut edit = crate::storage::manifest::VersionEdit::new();
        edit.add_file(FileMetadata {
            file_id: 7,
            file_type: FileType::Data,
            path: "000007.sst".to_string(),
            size: 16,
            checksum,
            level: Some(0),
        });
        throwaway.apply_edit(edit).unwrap();

        let manifest_bytes = std::fs::read(throwaway_dir.path().join("MANIFEST-000001")).unwrap();
        store.seed("src-bucket", "db/MANIFEST-e0", manifest_bytes);

        let env = env_with(&store, src.clone(), dest.clone());
        let dir = TempDir::new().unwrap();
        let mut cloud = CloudOptions::default();
        cloud.src_bucket = src;
        cloud.dest_bucket = dest;

        env.load_cloud_manifest(CloudManifest::create_empty("e0"));

        maybe_roll_new_epoch(&env, &cloud, dir.path()).unwrap();

        let new_epoch = env.with_manifest(|m| m.current_epoch().to_string()).unwrap();
        assert_ne!(new_epoch, "e0");
        assert!(dir.path().join(manifest_file_name(&new_epoch)).exists());
        let entries = env.with_manifest(|m| m.entries().to_vec()).unwrap();
        assert_eq!(entries.last().unwrap().file_number_upper_bound, 7);
    }

    #[test]
    fn repeated_reopen_of_an_always_empty_database_does_not_churn_epochs() {
        let store = MemoryObjectStore::new();
        let dest = BucketOptions::new("dest-bucket", "db");
        let env = env_with(&store, BucketOptions::empty(), dest.clone());
        let dir = TempDir::new().unwrap();
        let mut cloud = CloudOptions::default();
        cloud.dest_bucket = dest;

        env.load_cloud_manifest(CloudManifest::create_empty(""));
        maybe_roll_new_epoch(&env, &cloud, dir.path()).unwrap();
        let first_epoch = env.with_manifest(|m| m.current_epoch().to_string()).unwrap();
        assert_ne!(first_epoch, "");

        // A second open sees the same cloud manifest (current epoch
        // non-empty, no local MANIFEST-<epoch> was ever materialized
        // since no file was ever written) and must not mint another
        // epoch, since nothing new has happened.
        let reloaded = env.with_manifest(|m| m.clone()).unwrap();
        env.load_cloud_manifest(reloaded);
        maybe_roll_new_epoch(&env, &cloud, dir.path()).unwrap();
        let second_epoch = env.with_manifest(|m| m.current_epoch().to_string()).unwrap();
        assert_eq!(first_epoch, second_epoch);
    }
}
