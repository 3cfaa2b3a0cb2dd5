use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::GalleryError;

/// Disk-backed key/value cache with per-entry expiry.
///
/// Entries are JSON `{value, expiry}` records, one file per key. Reads never
/// fail: expired entries are still returned, flagged stale, so callers can
/// render immediately and refresh in the background. Nothing is ever evicted
/// except corrupt entries, which are deleted on read.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: Utf8PathBuf,
}

/// Outcome of a cache read. `value` is `None` only when the key was absent
/// or its entry was corrupt; a present-but-expired value comes back with
/// `is_stale` set.
#[derive(Debug)]
pub struct Lookup<T> {
    pub value: Option<T>,
    pub is_stale: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct Record<T> {
    value: T,
    /// Absolute expiry, unix milliseconds.
    expiry: i64,
}

impl CacheStore {
    pub fn new() -> Result<Self, GalleryError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("newtro-gallery"))
                    .ok()
            })
            .ok_or_else(|| {
                GalleryError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Persists `value` under `key` with `expiry = now + ttl`, overwriting
    /// any prior entry. Storage failures are logged, never returned.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let expiry = chrono::Utc::now().timestamp_millis() + ttl.as_millis() as i64;
        if let Err(err) = self.write_record(key, value, expiry) {
            warn!(key, error = %err, "cache write failed");
        }
    }

    /// Reads the entry at `key`. Corrupt entries are deleted as a side
    /// effect and reported as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Lookup<T> {
        let path = self.entry_path(key);
        let content = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content,
            Err(_) => {
                return Lookup {
                    value: None,
                    is_stale: true,
                };
            }
        };
        match serde_json::from_str::<Record<T>>(&content) {
            Ok(record) => {
                let now = chrono::Utc::now().timestamp_millis();
                Lookup {
                    value: Some(record.value),
                    is_stale: now > record.expiry,
                }
            }
            Err(err) => {
                warn!(key, error = %err, "removing corrupted cache entry");
                let _ = fs::remove_file(path.as_std_path());
                Lookup {
                    value: None,
                    is_stale: true,
                }
            }
        }
    }

    pub fn clear(&self) -> Result<(), GalleryError> {
        if self.root.as_std_path().exists() {
            fs::remove_dir_all(self.root.as_std_path())
                .map_err(|err| GalleryError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    fn write_record<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        expiry: i64,
    ) -> Result<(), GalleryError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| GalleryError::Filesystem(err.to_string()))?;
        let record = Record { value, expiry };
        let content =
            serde_json::to_vec(&record).map_err(|err| GalleryError::Filesystem(err.to_string()))?;
        let path = self.entry_path(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| GalleryError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| GalleryError::Filesystem(err.to_string()))
    }

    fn entry_path(&self, key: &str) -> Utf8PathBuf {
        self.root.join(format!("{}.json", sanitize_key(key)))
    }
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
