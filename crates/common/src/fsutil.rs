//! Filesystem helpers for staging, backup and restore.

use crate::timestamp::Timestamp;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Recursively copy a directory tree. Returns the number of files copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0u64;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// True when the path does not exist or contains no entries.
pub fn dir_is_empty(path: &Path) -> io::Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    Ok(fs::read_dir(path)?.next().is_none())
}

/// A transient working directory, removed on drop.
///
/// Named with a timestamp plus a random suffix so concurrent invocations
/// never collide. Removal runs on every exit path, success or error.
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    /// Create a fresh staging directory under the system temp dir.
    pub fn create(prefix: &str) -> io::Result<Self> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}-{}", prefix, Timestamp::now().to_slug(), &suffix[..8]);
        let path = std::env::temp_dir().join(name);
        fs::create_dir_all(&path)?;
        debug!("Created staging directory {:?}", path);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if self.path.exists() {
                warn!("Failed to remove staging directory {:?}: {}", self.path, e);
            }
        }
    }
}
