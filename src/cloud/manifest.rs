//! The cloud manifest: the ordered `(file_number_upper_bound, epoch)`
//! mapping that remaps the inner engine's fixed `MANIFEST-NNNNNN` name
//! into the object store's epoch-stamped namespace.

use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

use super::epoch::LEGACY_EPOCH;

pub const CLOUD_MANIFEST_FILE_NAME: &str = "CLOUDMANIFEST";

/// One cut-over entry: every file numbered strictly below `file_number_upper_bound`
/// lives under `epoch`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CutOver {
    pub file_number_upper_bound: u64,
    pub epoch: String,
}

/// Ordered mapping of file-number cut-overs to epochs, plus a current
/// epoch applied to every file number at or above the largest recorded
/// upper bound. Once [`CloudManifest::finalize`] is called the structure
/// is immutable for the remaining lifetime of the open instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudManifest {
    entries: Vec<CutOver>,
    current_epoch: String,
    #[serde(skip)]
    finalized: bool,
}

impl CloudManifest {
    /// Create an empty manifest with the given current epoch. Pass
    /// [`LEGACY_EPOCH`] for a pre-cloud-manifest database.
    pub fn create_empty(current_epoch: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            current_epoch: current_epoch.into(),
            finalized: false,
        }
    }

    pub fn current_epoch(&self) -> &str {
        &self.current_epoch
    }

    pub fn is_legacy(&self) -> bool {
        self.current_epoch == LEGACY_EPOCH && self.entries.is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn entries(&self) -> &[CutOver] {
        &self.entries
    }

    /// Append a cut-over at `file_number` for the *current* current epoch,
    /// then advance the current epoch to `new_epoch`.
    ///
    /// Precondition: `file_number` is strictly greater than every prior
    /// upper bound. Violating it, or calling this after [`Self::finalize`],
    /// is a programmer error in this core (the epoch roller is the sole
    /// caller and always respects monotonicity).
    pub fn add_epoch(&mut self, file_number: u64, new_epoch: impl Into<String>) -> Result<()> {
        if self.finalized {
            return Err(StorageError::InvalidArgument(
                "cannot add an epoch to a finalized cloud manifest".into(),
            ));
        }
        if let Some(last) = self.entries.last() {
            if file_number <= last.file_number_upper_bound {
                return Err(StorageError::InvalidArgument(format!(
                    "epoch cut-over file number {} is not greater than the last recorded {}",
                    file_number, last.file_number_upper_bound
                )));
            }
        }
        self.entries.push(CutOver {
            file_number_upper_bound: file_number,
            epoch: std::mem::replace(&mut self.current_epoch, new_epoch.into()),
        });
        Ok(())
    }

    /// Freeze the manifest. Further [`Self::add_epoch`] calls are rejected.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    /// Remap `"MANIFEST-<N>"` to the epoch-stamped name the object store
    /// actually holds it under: the epoch of the least upper bound
    /// strictly greater than `N`, or the current epoch if none applies.
    pub fn remap(&self, file_number: u64) -> String {
        let epoch = self
            .entries
            .iter()
            .filter(|e| e.file_number_upper_bound > file_number)
            .min_by_key(|e| e.file_number_upper_bound)
            .map(|e| e.epoch.as_str())
            .unwrap_or(&self.current_epoch);
        manifest_file_name(epoch)
    }

    /// Generalized `RemapFilename`: only names matching the engine's fixed
    /// `MANIFEST-<N>` schema are epoch-stamped; every other name (SSTs,
    /// `LOG*`, ...) is returned unchanged, since only the manifest file is
    /// subject to the cloud's content-addressed epoch naming.
    pub fn remap_name(&self, name: &str) -> String {
        match name.strip_prefix("MANIFEST-").and_then(|n| n.parse::<u64>().ok()) {
            Some(file_number) => self.remap(file_number),
            None => name.to_string(),
        }
    }

    /// Self-describing JSON serialization, written atomically (temp file
    /// then rename) so a reader never observes a partially-written
    /// manifest.
    pub fn write_to_log(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        atomic_write(path, &json)
    }

    pub fn read_from_log(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let manifest: Self = serde_json::from_slice(&bytes)?;
        Ok(manifest)
    }
}

/// Render the on-disk/object-store name for a manifest stamped with `epoch`.
/// The legacy epoch maps to the engine's own un-stamped `MANIFEST` name.
pub fn manifest_file_name(epoch: &str) -> String {
    if epoch.is_empty() {
        "MANIFEST".to_string()
    } else {
        format!("MANIFEST-{epoch}")
    }
}

/// Write `data` to `path` via a temp file + atomic rename + best-effort
/// parent-directory fsync, so a crash never leaves a partially written
/// file visible under `path`. Mirrors the manifest log's own
/// temp-file-then-rename manifest commit pattern.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| StorageError::InvalidArgument("path has no parent directory".into()))?;
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("atomic_write")
    ));

    {
        let mut file = fs::OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        if let Ok(dir) = fs::File::open(parent) {
            unsafe {
                libc::fsync(dir.as_raw_fd());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn remap_uses_least_upper_bound_strictly_greater_than_n() {
        let mut m = CloudManifest::create_empty("e0");
        m.add_epoch(100, "e1").unwrap();
        m.add_epoch(200, "e2").unwrap();
        m.finalize();

        assert_eq!(m.remap(50), manifest_file_name("e0"));
        assert_eq!(m.remap(100), manifest_file_name("e1"));
        assert_eq!(m.remap(150), manifest_file_name("e1"));
        assert_eq!(m.remap(200), manifest_file_name("e2"));
        assert_eq!(m.remap(1000), manifest_file_name("e2"));
    }

    #[test]
    fn add_epoch_rejects_non_monotonic_file_numbers() {
        let mut m = CloudManifest::create_empty("e0");
        m.add_epoch(100, "e1").unwrap();
        assert!(m.add_epoch(100, "e2").is_err());
        assert!(m.add_epoch(50, "e2").is_err());
    }

    #[test]
    fn finalize_is_a_monotone_latch() {
        let mut m = CloudManifest::create_empty("e0");
        m.finalize();
        assert!(m.add_epoch(1, "e1").is_err());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CLOUD_MANIFEST_FILE_NAME);

        let mut m = CloudManifest::create_empty("e0");
        m.add_epoch(10, "e1").unwrap();
        m.finalize();
        m.write_to_log(&path).unwrap();

        let loaded = CloudManifest::read_from_log(&path).unwrap();
        assert_eq!(loaded.current_epoch(), m.current_epoch());
        assert_eq!(loaded.entries(), m.entries());
    }

    #[test]
    fn legacy_manifest_has_empty_current_epoch() {
        let m = CloudManifest::create_empty(LEGACY_EPOCH);
        assert!(m.is_legacy());
        assert_eq!(m.remap(1), "MANIFEST");
    }

    #[test]
    fn remap_name_passes_through_non_manifest_names() {
        let mut m = CloudManifest::create_empty("e0");
        m.add_epoch(10, "e1").unwrap();
        m.finalize();

        assert_eq!(m.remap_name("000007.sst"), "000007.sst");
        assert_eq!(m.remap_name("LOG"), "LOG");
        assert_eq!(m.remap_name("MANIFEST-000001"), manifest_file_name("e0"));
        assert_eq!(m.remap_name("MANIFEST-000020"), manifest_file_name("e1"));
    }
}
