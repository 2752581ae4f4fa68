//! Cloud-backed durability and bootstrap core: the layer that sits
//! between the local, on-disk [`crate::storage`] primitives and an
//! object-storage tier, remapping manifest names through epochs and
//! deciding when a local directory must be reinitialized from the cloud.

pub mod bootstrap;
pub mod bucket;
pub mod env;
pub mod epoch;
pub mod epoch_roller;
pub mod local_files;
pub mod manifest;
pub mod object_store;
pub mod orchestrator;
pub mod savepoint;

pub use bootstrap::{fetch_cloud_manifest, maybe_migrate_manifest_file, needs_reinitialization, sanitize_directory};
pub use bucket::BucketOptions;
pub use env::{CloudEnv, DBID_SEPARATOR};
pub use epoch::{generate_unique_id, hash_shrink, new_epoch, LEGACY_EPOCH};
pub use epoch_roller::maybe_roll_new_epoch;
pub use manifest::{manifest_file_name, CloudManifest, CutOver, CLOUD_MANIFEST_FILE_NAME};
pub use object_store::{MemoryObjectStore, ObjectStore};
pub use orchestrator::DbCloud;
pub use savepoint::savepoint;
