//! Local, on-disk storage primitives shared by the inner engine and the
//! cloud bootstrap/epoch layer.

pub mod manifest;

pub use manifest::{FileMetadata, FileType, Manifest};
