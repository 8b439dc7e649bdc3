//! Collaborators the shell consults for users and per-user history.
//!
//! Each comes as a trait with a volatile in-memory implementation and a
//! JSON-file implementation rooted in the configured data directory.

pub mod history;
pub mod users;

pub use history::{HistoryEntry, HistoryStore, JsonHistoryStore, MemoryHistoryStore};
pub use users::{Creation, CredentialStore, JsonUserStore, MemoryUserStore, Verification};

use crate::error::StoreError;
use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

fn io_error(path: &Path, reason: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        reason,
    }
}

/// Reads a JSON document, or the default value when the file does not exist.
fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(io_error(path, e)),
    };
    serde_json::from_str(&content).map_err(|reason| StoreError::Corrupt {
        path: path.display().to_string(),
        reason,
    })
}

/// Replaces the file with the JSON form of `value`, creating parent
/// directories as needed.
///
/// The document is written to a temporary file in the same directory and
/// renamed over `path`, so readers see either the old or the new content.
fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| io_error(path, e))?;

    let json = serde_json::to_vec_pretty(value).map_err(|reason| StoreError::Corrupt {
        path: path.display().to_string(),
        reason,
    })?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(path, e))?;
    tmp.write_all(&json).map_err(|e| io_error(path, e))?;
    tmp.as_file().sync_all().map_err(|e| io_error(path, e))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

/// Read-modify-write of the document at `path`.
///
/// The file is re-read right before `update` runs, so changes written by
/// another shell sharing the data directory are kept.
fn update_json<T, R>(
    path: &Path,
    update: impl FnOnce(&mut T) -> Result<R, StoreError>,
) -> Result<R, StoreError>
where
    T: Serialize + DeserializeOwned + Default,
{
    let mut value = load_json(path)?;
    let out = update(&mut value)?;
    save_json(path, &value)?;
    Ok(out)
}

/// Where a malformed document is moved by [`set_aside_if_corrupt`].
fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".corrupt");
    path.with_file_name(name)
}

/// Moves a malformed document out of the way so the store starts empty
/// instead of refusing to open. Unreadable files are still errors.
fn set_aside_if_corrupt<T: DeserializeOwned + Default>(path: &Path) -> Result<(), StoreError> {
    match load_json::<T>(path) {
        Ok(_) => Ok(()),
        Err(StoreError::Corrupt { reason, .. }) => {
            let aside = corrupt_path(path);
            warn!(
                "{}: malformed data ({reason}), moved to {} and starting empty",
                path.display(),
                aside.display()
            );
            fs::rename(path, &aside).map_err(|e| io_error(path, e))
        }
        Err(e) => Err(e),
    }
}
