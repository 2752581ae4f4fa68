//! Small helpers for the handful of fixed-name local files the cloud
//! pipeline reads and writes directly: `IDENTITY`, `CURRENT`.

use crate::error::Result;
use std::fs;
use std::path::Path;

use super::manifest::atomic_write;

pub const IDENTITY_FILE: &str = "IDENTITY";
pub const CURRENT_FILE: &str = "CURRENT";

/// Exact content `SanitizeDirectory` writes for the dummy `CURRENT` file:
/// 16 bytes, `MANIFEST-000001\n`.
pub const DUMMY_CURRENT_CONTENT: &[u8] = b"MANIFEST-000001\n";

pub fn read_trimmed(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

pub fn read_identity(local_dir: &Path) -> Result<String> {
    read_trimmed(&local_dir.join(IDENTITY_FILE))
}

/// Write `IDENTITY` atomically (temp file + rename), for clone
/// provisioning.
pub fn write_identity(local_dir: &Path, dbid: &str) -> Result<()> {
    let mut content = dbid.as_bytes().to_vec();
    content.push(b'\n');
    atomic_write(&local_dir.join(IDENTITY_FILE), &content)
}

pub fn write_dummy_current(local_dir: &Path) -> Result<()> {
    atomic_write(&local_dir.join(CURRENT_FILE), DUMMY_CURRENT_CONTENT)
}

pub fn read_current(local_dir: &Path) -> Result<String> {
    read_trimmed(&local_dir.join(CURRENT_FILE))
}
