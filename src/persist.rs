//! Atomic JSON persistence helpers.
//!
//! Every JSON file this crate writes (archival collections, knowledge
//! collections, multi-model stores, dream archives, manifests, embedding
//! caches, state snapshots) goes through these helpers: serialise to a
//! sibling temp file, then rename over the destination. A crash mid-write
//! leaves the previous file intact and at worst an orphan `.tmp`.
//!
//! Files are created owner-read/write only, since several of them carry
//! conversation text and lifecycle data.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, warn};

/// Serialises `value` and atomically replaces `path` with it.
///
/// The parent directory is created if missing. On Unix the file is created
/// with mode `0o600`.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created, the temp file
/// cannot be written, or the rename fails.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(std::io::Error::other)?;
    write_bytes_atomic(path, &bytes)
}

/// Atomically replaces `path` with `bytes` via a sibling temp file.
///
/// # Errors
///
/// Returns an I/O error if the write or rename fails.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_sibling(path);
    {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp, path) {
        // Never leave the temp file behind on a failed commit.
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Loads a JSON file, returning `T::default()` when the file is absent.
///
/// A present-but-corrupt file is logged and truncated to the default: the
/// store keeps serving rather than refusing to start.
pub fn load_json_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return T::default();
    }
    match fs::read(path) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                error!(path = %path.display(), error = %e, "corrupt JSON, starting from empty collection");
                T::default()
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read persisted file");
            T::default()
        }
    }
}

/// Loads a JSON file, returning `None` when it is absent or unreadable.
pub fn load_json_opt<T>(path: &Path) -> Option<T>
where
    T: DeserializeOwned,
{
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to parse persisted JSON");
            None
        }
    }
}

/// Returns the temp-file path used by [`write_bytes_atomic`] for `path`.
fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| std::ffi::OsString::from("file"), std::ffi::OsStr::to_os_string);
    name.push(".tmp");
    path.with_file_name(name)
}
