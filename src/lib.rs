//! Cloud-backed durability and bootstrap core for an LSM-tree storage
//! engine.
//!
//! This crate owns the subsystem that lets a local on-disk database
//! image be treated as a cache over a remote, append-only
//! object-storage tier: the cloud manifest and its epoch-roll protocol,
//! the directory sanitization / reinitialization decision, the open
//! pipeline that composes bootstrap with the inner engine's own open,
//! and the savepoint operation that promotes a read-only clone into a
//! self-sufficient copy.
//!
//! ## Layout
//! - [`cloud`]: the cloud manifest, epoch roller, bootstrap/sanitizer,
//!   savepoint, and the `ObjectStore`/`CloudEnv` collaborator surface.
//! - [`storage`]: the local, on-disk manifest/version bookkeeping shared
//!   by the cloud layer and the inner engine.
//! - [`engine`]: the thinnest real inner-LSM-engine collaborator that
//!   satisfies the open/savepoint contract the cloud core needs.
//! - [`config`]: the option surface the orchestrator, sanitizer, and
//!   epoch roller consult.

pub mod cloud;
pub mod config;
pub mod engine;
pub mod storage;

mod error;

pub use cloud::DbCloud;
pub use config::{CloudOptions, CloudType, DBConfig, PersistentCacheOptions};
pub use engine::{ColumnFamilyDescriptor, InnerEngine};
pub use error::{Result, StorageError};
