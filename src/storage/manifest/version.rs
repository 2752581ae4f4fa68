//! Live file bookkeeping for the inner LSM engine's local manifest.
//!
//! This is the engine's *own* notion of a manifest — a flat log of which
//! data files currently belong to the latest version. It is distinct from,
//! and sits underneath, the cloud manifest in [`crate::cloud::manifest`],
//! which remaps the fixed filename this module writes (`MANIFEST-NNNNNN`)
//! into an epoch-stamped object-store name.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// File kind recorded in the local manifest. The cloud core only ever
/// needs to know "this is a data file the engine considers live" — finer
/// classification (SST level, index kind, ...) is the inner engine's own
/// business and is intentionally not modeled here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FileType {
    /// On-disk LSM data file: a "live file" / SST.
    Data,
}

/// Metadata for one live file, as recorded in the local manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_id: u64,
    pub file_type: FileType,
    /// Path relative to the data directory.
    pub path: String,
    pub size: u64,
    pub checksum: u32,
    /// LSM level, if applicable.
    pub level: Option<u32>,
}

impl FileMetadata {
    pub fn file_name(&self) -> String {
        if !self.path.is_empty() {
            self.path.clone()
        } else {
            format!("{:06}.sst", self.file_id)
        }
    }
}

/// A point-in-time snapshot of every file the engine considers live.
#[derive(Debug, Clone)]
pub struct Version {
    pub version_number: u64,
    pub files: HashMap<u64, FileMetadata>,
}

impl Version {
    pub fn new(version_number: u64) -> Self {
        Self {
            version_number,
            files: HashMap::new(),
        }
    }

    pub fn add_file(&mut self, meta: FileMetadata) {
        self.files.insert(meta.file_id, meta);
    }

    pub fn delete_file(&mut self, file_id: u64) {
        self.files.remove(&file_id);
    }

    pub fn all_file_names(&self) -> std::collections::HashSet<String> {
        self.files.values().map(|f| f.file_name()).collect()
    }

    /// The greatest file id recorded, or 0 for an empty version. This is
    /// the `max_file_number` the epoch roller needs.
    pub fn max_file_number(&self) -> u64 {
        self.files.keys().copied().max().unwrap_or(0)
    }
}

/// A batch of file additions/removals applied atomically to a [`Version`].
#[derive(Default)]
pub struct VersionEdit {
    pub add_files: Vec<FileMetadata>,
    pub delete_files: Vec<u64>,
}

impl VersionEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, meta: FileMetadata) {
        self.add_files.push(meta);
    }

    pub fn delete_file(&mut self, file_id: u64) {
        self.delete_files.push(file_id);
    }

    pub fn is_empty(&self) -> bool {
        self.add_files.is_empty() && self.delete_files.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ManifestRecord {
    AddFile(FileMetadata),
    DeleteFile { file_id: u64 },
    VersionCommit { version: u64 },
}
