//! Database configuration recognized by the cloud-backed open pipeline.
//!
//! Everything the orchestrator, sanitizer and epoch roller consult
//! before and during an open.

use crate::cloud::BucketOptions;
use serde::{Deserialize, Serialize};

/// `max_manifest_file_size` is forced to this value at open time
/// because the cloud layer re-uploads the manifest on every update; a
/// large local rollover threshold would only delay that upload.
pub const CLOUD_MANIFEST_FILE_SIZE_LIMIT: u64 = 4 * 1024;

/// Cloud backend selection. AWS S3 is the only supported backend today;
/// anything else fails `SanitizeDirectory` with `not-supported`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CloudType {
    #[default]
    None,
    Aws,
    /// Any other named backend. Always rejected by `SanitizeDirectory`
    /// with `not-supported` — kept as a variant (rather than an
    /// exhaustiveness gap) so that path is reachable and testable.
    Other(String),
}

/// Persistent (block) cache directive: a local path plus a size budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentCacheOptions {
    pub path: String,
    pub size_gb: u64,
}

/// LSM-tree tuning knobs the inner engine consults. Only the fields the
/// cloud core itself reads or overrides are modeled here; everything else
/// about compaction/memtable sizing is the inner engine's business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LSMConfig {
    pub max_manifest_file_size: u64,
}

impl Default for LSMConfig {
    fn default() -> Self {
        Self {
            max_manifest_file_size: 128 * 1024 * 1024,
        }
    }
}

/// Top-level database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DBConfig {
    pub lsm_config: LSMConfig,
    pub cloud: CloudOptions,
}

impl Default for DBConfig {
    fn default() -> Self {
        Self {
            lsm_config: LSMConfig::default(),
            cloud: CloudOptions::default(),
        }
    }
}

/// Cloud-specific options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudOptions {
    pub cloud_type: CloudType,
    pub src_bucket: BucketOptions,
    pub dest_bucket: BucketOptions,

    /// If false, `dest_bucket` must be non-empty (sanitizer cross-check).
    pub keep_local_sst_files: bool,

    /// One-shot: cleared after the first successful open.
    pub validate_filesize: bool,

    /// Must be `-1` (meaning "open all files at startup") when dest is
    /// empty.
    pub max_open_files: i64,

    /// Parallelism for `Savepoint`'s copy pool. `<= 1` runs single-threaded.
    pub max_file_opening_threads: usize,

    pub persistent_cache: Option<PersistentCacheOptions>,
}

impl Default for CloudOptions {
    fn default() -> Self {
        Self {
            cloud_type: CloudType::None,
            src_bucket: BucketOptions::empty(),
            dest_bucket: BucketOptions::empty(),
            keep_local_sst_files: true,
            validate_filesize: true,
            max_open_files: -1,
            max_file_opening_threads: 1,
            persistent_cache: None,
        }
    }
}

impl CloudOptions {
    pub fn is_cloud_disabled(&self) -> bool {
        self.cloud_type == CloudType::None
    }

    pub fn is_supported_cloud_type(&self) -> bool {
        matches!(self.cloud_type, CloudType::None | CloudType::Aws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_open_all_files_with_no_dest() {
        let opts = CloudOptions::default();
        assert_eq!(opts.max_open_files, -1);
        assert!(opts.keep_local_sst_files);
    }

    #[test]
    fn other_cloud_type_is_unsupported() {
        let mut opts = CloudOptions::default();
        opts.cloud_type = CloudType::Other("gcp".to_string());
        assert!(!opts.is_supported_cloud_type());
    }
}
