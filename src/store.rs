// src/store.rs
//! Feed State Store: the versioned JSON file that carries every admitted item from
//! one run to the next.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::PersistenceError;
use crate::item::Item;

/// Bump when the on-disk layout changes incompatibly.
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedState {
    pub version: u32,
    pub updated_at: Option<DateTime<Utc>>,
    /// Newest admitted first.
    pub items: Vec<Item>,
}

#[derive(Deserialize)]
struct VersionHeader {
    #[serde(default)]
    version: u32,
}

/// Load stored items. A missing file is a cold start; anything unreadable is an error,
/// never an empty store.
pub fn load(path: &Path) -> Result<Vec<Item>, PersistenceError> {
    let raw = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no feed state yet, cold start");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(PersistenceError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    decode(&raw, path)
}

fn decode(raw: &str, path: &Path) -> Result<Vec<Item>, PersistenceError> {
    let corrupt = |source| PersistenceError::Corrupt {
        path: path.to_path_buf(),
        source,
    };
    let header: VersionHeader = serde_json::from_str(raw).map_err(corrupt)?;
    if header.version != STATE_VERSION {
        return Err(PersistenceError::Version {
            path: path.to_path_buf(),
            found: header.version,
            expected: STATE_VERSION,
        });
    }
    let state: FeedState = serde_json::from_str(raw).map_err(corrupt)?;
    tracing::info!(path = %path.display(), items = state.items.len(), "feed state loaded");
    Ok(state.items)
}

pub fn encode(items: &[Item], now: DateTime<Utc>) -> Result<Vec<u8>, PersistenceError> {
    let state = FeedState {
        version: STATE_VERSION,
        updated_at: Some(now),
        items: items.to_vec(),
    };
    let mut out = serde_json::to_vec_pretty(&state).map_err(PersistenceError::Encode)?;
    out.push(b'\n');
    Ok(out)
}

/// Persist `items` atomically.
pub fn save(path: &Path, items: &[Item], now: DateTime<Utc>) -> Result<(), PersistenceError> {
    let bytes = encode(items, now)?;
    write_atomic(path, &bytes)?;
    tracing::info!(path = %path.display(), items = items.len(), "feed state saved");
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "state".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write to a sibling temp file, then rename over `path`. Readers see either the old
/// or the new content, never a torn file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let err = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(err)?;
    }
    let tmp = tmp_path(path);
    let mut f = fs::File::create(&tmp).map_err(err)?;
    f.write_all(bytes).map_err(err)?;
    f.sync_all().map_err(err)?;
    drop(f);
    fs::rename(&tmp, path).map_err(err)?;
    Ok(())
}
