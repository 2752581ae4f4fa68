//! Local manifest: the inner LSM engine's own CURRENT/MANIFEST-NNNNNN
//! bookkeeping, independent of the cloud layer above it.

use super::version::{FileMetadata, ManifestRecord, Version, VersionEdit};
use crate::{Result, StorageError};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Name of the fixed manifest file the engine always opens, regardless of
/// what epoch-stamped name the cloud layer ultimately stores it under.
pub const DUMMY_MANIFEST_NAME: &str = "MANIFEST-000001";

/// Local manifest manager: appends length-prefixed [`ManifestRecord`]s to
/// a single `MANIFEST-NNNNNN` file and tracks the resulting live-file
/// [`Version`] in memory.
pub struct Manifest {
    data_dir: PathBuf,
    current_version: Arc<Mutex<Version>>,
    manifest_file: Arc<Mutex<File>>,
    next_version: Arc<Mutex<u64>>,
    manifest_number: u64,
}

impl Manifest {
    /// Create or recover the manifest rooted at `data_dir`. If `CURRENT`
    /// is absent, starts a fresh `MANIFEST-000001`. Equivalent to
    /// [`Self::open_with_remap`] with an identity remap, for callers with
    /// no cloud indirection above them (plain local use, and this
    /// module's own tests).
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_remap(data_dir, |name| name.to_string())
    }

    /// Create or recover the manifest rooted at `data_dir`, routing the
    /// *physical* file the nominal `CURRENT` name resolves to through
    /// `remap` first.
    ///
    /// `CURRENT` itself always names the engine's fixed nominal manifest
    /// (`MANIFEST-000001` under the cloud pipeline, never rewritten once
    /// the bootstrap sanitizer has seeded it) — only the on-disk file this
    /// instance actually opens and appends to is subject to `remap`. This
    /// is the one seam where the cloud manifest's epoch indirection
    /// reaches the engine: every open re-resolves the physical name, so a
    /// session that starts after an epoch roll transparently picks up the
    /// newly-renamed file the roller produced.
    pub fn open_with_remap(data_dir: impl AsRef<Path>, remap: impl Fn(&str) -> String) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let current_path = data_dir.join("CURRENT");

        let nominal_name = if current_path.exists() {
            fs::read_to_string(&current_path)?.trim().to_string()
        } else {
            DUMMY_MANIFEST_NAME.to_string()
        };

        let physical_name = remap(&nominal_name);
        let manifest_path = data_dir.join(&physical_name);
        let version = Self::recover_version(&manifest_path)?;
        let manifest_number = nominal_name
            .strip_prefix("MANIFEST-")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);

        let manifest_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&manifest_path)?;

        let mut current_file = File::create(&current_path)?;
        writeln!(current_file, "{nominal_name}")?;
        current_file.sync_all()?;

        let next_version = version.version_number + 1;

        Ok(Self {
            data_dir,
            current_version: Arc::new(Mutex::new(version)),
            manifest_file: Arc::new(Mutex::new(manifest_file)),
            next_version: Arc::new(Mutex::new(next_version)),
            manifest_number,
        })
    }

    /// Read a `MANIFEST-*` file in isolation and report the greatest file
    /// id recorded in it, without touching `CURRENT` or opening it for
    /// further writes. Used by the epoch roller to find `max_file_number`
    /// when deciding whether a new epoch is needed.
    pub fn read_max_file_number(manifest_path: &Path) -> Result<u64> {
        Ok(Self::recover_version(manifest_path)?.max_file_number())
    }

    fn recover_version(manifest_path: &Path) -> Result<Version> {
        if !manifest_path.exists() {
            return Ok(Version::new(0));
        }
        let mut file = File::open(manifest_path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        let mut current_version = Version::new(0);
        let mut last_committed_version = Version::new(0);

        let mut offset = 0;
        while offset + 4 <= buffer.len() {
            let len = u32::from_le_bytes([
                buffer[offset],
                buffer[offset + 1],
                buffer[offset + 2],
                buffer[offset + 3],
            ]) as usize;
            offset += 4;

            if offset + len > buffer.len() {
                break;
            }

            if let Ok(record) = bincode::deserialize::<ManifestRecord>(&buffer[offset..offset + len]) {
                match record {
                    ManifestRecord::AddFile(meta) => current_version.add_file(meta),
                    ManifestRecord::DeleteFile { file_id } => current_version.delete_file(file_id),
                    ManifestRecord::VersionCommit { version } => {
                        current_version.version_number = version;
                        last_committed_version = current_version.clone();
                    }
                }
            }
            offset += len;
        }

        Ok(last_committed_version)
    }

    pub fn current_version(&self) -> Version {
        self.current_version.lock().expect("manifest version lock poisoned").clone()
    }

    pub fn manifest_number(&self) -> u64 {
        self.manifest_number
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Apply a batch of file additions/removals as a single atomic
    /// append, fsync, commit-marker, fsync sequence.
    pub fn apply_edit(&self, edit: VersionEdit) -> Result<u64> {
        if edit.is_empty() {
            return Ok(self.current_version.lock().expect("manifest version lock poisoned").version_number);
        }

        for meta in &edit.add_files {
            let file_path = self.data_dir.join(&meta.path);
            if !file_path.exists() {
                return Err(StorageError::FileNotFound(file_path));
            }
            let actual_size = fs::metadata(&file_path)?.len();
            if actual_size != meta.size {
                return Err(StorageError::Corruption(format!(
                    "file size mismatch for {}: expected {}, got {}",
                    meta.path, meta.size, actual_size
                )));
            }
            let actual_checksum = Self::calculate_checksum(&file_path)?;
            if actual_checksum != meta.checksum {
                return Err(StorageError::Corruption(format!("checksum mismatch for {}", meta.path)));
            }
        }

        let mut version = self.current_version.lock().map_err(|_| StorageError::Lock("version lock poisoned".into()))?;
        let mut file = self.manifest_file.lock().map_err(|_| StorageError::Lock("manifest file lock poisoned".into()))?;
        let mut next_ver = self.next_version.lock().map_err(|_| StorageError::Lock("next version lock poisoned".into()))?;

        for meta in &edit.add_files {
            Self::append_record(&mut file, &ManifestRecord::AddFile(meta.clone()))?;
        }
        for file_id in &edit.delete_files {
            Self::append_record(&mut file, &ManifestRecord::DeleteFile { file_id: *file_id })?;
        }
        file.sync_all()?;

        Self::append_record(&mut file, &ManifestRecord::VersionCommit { version: *next_ver })?;
        file.sync_all()?;

        for meta in &edit.add_files {
            version.add_file(meta.clone());
        }
        for file_id in &edit.delete_files {
            version.delete_file(*file_id);
        }
        version.version_number = *next_ver;

        let committed_version = *next_ver;
        *next_ver += 1;
        Ok(committed_version)
    }

    fn append_record(file: &mut File, record: &ManifestRecord) -> Result<()> {
        let data = bincode::serialize(record).map_err(|e| StorageError::Serialization(e.to_string()))?;
        file.write_all(&(data.len() as u32).to_le_bytes())?;
        file.write_all(&data)?;
        Ok(())
    }

    pub fn calculate_checksum(path: &Path) -> Result<u32> {
        let mut file = File::open(path)?;
        let mut hasher = Hasher::new();
        let mut buffer = vec![0u8; 65536];
        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(hasher.finalize())
    }
}
