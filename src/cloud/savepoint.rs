//! Savepoint: publish every live data file from src to
//! dest. A fixed worker pool shares a monotonically increasing index
//! counter over a flat file list; copies are independent, and the first
//! observed error wins.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{Result, StorageError};
use crate::storage::manifest::FileMetadata;

use super::env::CloudEnv;

/// Mirror every live file reported by the engine from `env`'s src bucket
/// to its dest bucket. A no-op when dest is empty.
///
/// The copy source is always
/// `env.src()` -- correct for a fresh clone, but a long-lived dest-only
/// instance with an empty src would find nothing to copy from. See
/// DESIGN.md for the resolution.
pub fn savepoint(env: &CloudEnv, live_files: &[FileMetadata], max_file_opening_threads: usize) -> Result<()> {
    if env.dest().is_empty() {
        return Ok(());
    }

    let mut missing = Vec::new();
    for file in live_files {
        let name = file.file_name();
        let remapped = env.remap_name(&name)?;
        if !env.exists_object(env.dest(), &remapped)? {
            missing.push(remapped);
        }
    }

    if missing.is_empty() {
        return Ok(());
    }

    let worker_count = max_file_opening_threads.max(1);
    let cursor = AtomicUsize::new(0);
    let aborted = AtomicBool::new(false);
    let first_error: Mutex<Option<StorageError>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            scope.spawn(|| loop {
                if aborted.load(Ordering::Relaxed) {
                    return;
                }
                let idx = cursor.fetch_add(1, Ordering::Relaxed);
                let name = match missing.get(idx) {
                    Some(name) => name,
                    None => return,
                };
                if let Err(e) = env.copy_object(env.src(), name, env.dest(), name) {
                    let mut slot = first_error.lock().expect("first_error mutex poisoned");
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                    aborted.store(true, Ordering::Relaxed);
                    return;
                }
            });
        }
    });

    match first_error.into_inner().expect("first_error mutex poisoned") {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::manifest::CloudManifest;
    use crate::cloud::{BucketOptions, MemoryObjectStore};
    use crate::storage::manifest::FileType;
    use std::sync::Arc;

    fn file(id: u64) -> FileMetadata {
        FileMetadata {
            file_id: id,
            file_type: FileType::Data,
            path: format!("{:06}.sst", id),
            size: 0,
            checksum: 0,
            level: Some(0),
        }
    }

    fn env_with(store: &MemoryObjectStore, src: BucketOptions, dest: BucketOptions) -> CloudEnv {
        let env = CloudEnv::new(Arc::new(store.clone()), src, dest);
        env.load_cloud_manifest(CloudManifest::create_empty(""));
        env
    }

    #[test]
    fn noop_when_dest_empty() {
        let store = MemoryObjectStore::new();
        let env = env_with(&store, BucketOptions::new("src", "db"), BucketOptions::empty());
        savepoint(&env, &[file(1)], 4).unwrap();
    }

    #[test]
    fn copies_missing_files_and_skips_present_ones() {
        let store = MemoryObjectStore::new();
        let src = BucketOptions::new("src-bucket", "db");
        let dest = BucketOptions::new("dest-bucket", "db");
        for id in 0..10u64 {
            store.seed("src-bucket", &format!("db/{:06}.sst", id), vec![id as u8]);
        }
        // 6 of the 10 already present in dest.
        for id in 0..6u64 {
            store.seed("dest-bucket", &format!("db/{:06}.sst", id), vec![id as u8]);
        }

        let env = env_with(&store, src, dest);
        let live: Vec<_> = (0..10u64).map(file).collect();

        savepoint(&env, &live, 3).unwrap();

        for id in 0..10u64 {
            assert_eq!(store.get_bytes("dest-bucket", &format!("db/{:06}.sst", id)).unwrap(), vec![id as u8]);
        }
    }

    #[test]
    fn first_error_is_returned_when_a_copy_fails() {
        let store = MemoryObjectStore::new();
        let src = BucketOptions::new("src-bucket", "db");
        let dest = BucketOptions::new("dest-bucket", "db");
        // Only seed file 0 in src; files 1 and 2 are missing there, so
        // their copies will fail with not-found.
        store.seed("src-bucket", "db/000000.sst", vec![0]);

        let env = env_with(&store, src, dest);
        let live = vec![file(0), file(1), file(2)];

        let err = savepoint(&env, &live, 2).unwrap_err();
        assert!(err.is_not_found());
    }
}
