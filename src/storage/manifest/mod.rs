//! Local manifest: version tracking and atomic multi-file commit for the
//! inner LSM engine. Distinct from the cloud manifest (`crate::cloud`),
//! which remaps this module's fixed `MANIFEST-NNNNNN` name into the
//! object store's epoch-stamped namespace.

pub mod manifest;
pub mod version;

pub use manifest::{Manifest, DUMMY_MANIFEST_NAME};
pub use version::{FileMetadata, FileType, ManifestRecord, Version, VersionEdit};
