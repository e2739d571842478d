//! Disk-backed cache store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <cache-id>/cache.toml              cache name and creation time
//! <cache-id>/<entry-id>.toml         entry metadata (key, status, headers, body file)
//! <cache-id>/<entry-id>-<uuid>.body  entry body
//! ```
//!
//! Ids are truncated SHA-256 digests of the cache name and the entry key.
//! Metadata is written to a temp file and renamed into place, so a reader
//! sees either the previous entry or the new one, never a mix. Writers to the
//! same entry take turns so the replaced body is always the one removed.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::CacheStorage;
use crate::error::{Error, Result};
use crate::message::Response;

const CACHE_MANIFEST: &str = "cache.toml";

/// Contents of `cache.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheManifest {
    name: String,
    created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredHeader {
    name: String,
    value: String,
}

/// Contents of an entry's metadata file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    status: u16,
    headers: Vec<StoredHeader>,
    body_file: String,
    stored_at: DateTime<Utc>,
}

/// Hex-encoded, truncated SHA-256 digest used for file and directory names.
fn short_digest(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .take(16)
        .fold(String::with_capacity(32), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

/// Writes `contents` to a uuid-named temp file next to `path`, then renames it over `path`.
async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp_path, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}

/// Reads a TOML file, returning `None` if it does not exist.
async fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(toml::from_str(&text)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn to_toml<T: Serialize>(value: &T) -> Result<String> {
    toml::to_string(value).map_err(|e| Error::Cache(e.to_string()))
}

/// Cache store persisted under a root directory.
///
/// Clones share the per-entry write locks.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
    writers: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl DiskCacheStorage {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writers: Arc::default(),
        }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join(short_digest(name))
    }

    fn meta_path(cache_dir: &Path, key: &str) -> PathBuf {
        cache_dir.join(format!("{}.toml", short_digest(key)))
    }

    /// Returns the write lock for one entry's metadata file.
    async fn entry_lock(&self, meta_path: &Path) -> Arc<Mutex<()>> {
        let mut writers = self.writers.lock().await;
        Arc::clone(writers.entry(meta_path.to_path_buf()).or_default())
    }

    async fn read_manifest(dir: &Path) -> Result<Option<CacheManifest>> {
        read_toml(&dir.join(CACHE_MANIFEST)).await
    }

    /// Reads one entry. A body that vanished between reading the metadata and
    /// reading the body means a concurrent `put` replaced it; read again.
    async fn read_entry(cache_dir: &Path, key: &str) -> Result<Option<Response>> {
        let meta_path = Self::meta_path(cache_dir, key);
        for _ in 0..2 {
            let Some(meta) = read_toml::<EntryMeta>(&meta_path).await? else {
                return Ok(None);
            };
            if meta.key != key {
                return Err(Error::Cache(format!(
                    "entry {} holds {} instead of {key}",
                    meta_path.display(),
                    meta.key
                )));
            }
            match tokio::fs::read(cache_dir.join(&meta.body_file)).await {
                Ok(body) => {
                    return Ok(Some(Response {
                        status: meta.status,
                        headers: meta
                            .headers
                            .into_iter()
                            .map(|h| (h.name, h.value))
                            .collect(),
                        body: body.into(),
                    }));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let dir = self.cache_dir(name);
        tokio::fs::create_dir_all(&dir).await?;
        if Self::read_manifest(&dir).await?.is_none() {
            let manifest = CacheManifest {
                name: name.to_string(),
                created: Utc::now(),
            };
            write_atomic(&dir.join(CACHE_MANIFEST), to_toml(&manifest)?.as_bytes()).await?;
            log::debug!("Created cache {name} at {}", dir.display());
        }
        Ok(())
    }

    async fn put(&self, name: &str, key: &str, response: Response) -> Result<()> {
        self.open(name).await?;
        let dir = self.cache_dir(name);
        let meta_path = Self::meta_path(&dir, key);
        let lock = self.entry_lock(&meta_path).await;
        let _writer = lock.lock().await;
        let previous = read_toml::<EntryMeta>(&meta_path).await.ok().flatten();

        let body_file = format!("{}-{}.body", short_digest(key), uuid::Uuid::new_v4());
        tokio::fs::write(dir.join(&body_file), &response.body).await?;

        let meta = EntryMeta {
            key: key.to_string(),
            status: response.status,
            headers: response
                .headers
                .into_iter()
                .map(|(name, value)| StoredHeader { name, value })
                .collect(),
            body_file: body_file.clone(),
            stored_at: Utc::now(),
        };
        if let Err(e) = write_atomic(&meta_path, to_toml(&meta)?.as_bytes()).await {
            let _ = tokio::fs::remove_file(dir.join(&body_file)).await;
            return Err(e.into());
        }

        if let Some(old) = previous.filter(|old| old.body_file != body_file) {
            let _ = tokio::fs::remove_file(dir.join(old.body_file)).await;
        }
        Ok(())
    }

    async fn match_in(&self, name: &str, key: &str) -> Result<Option<Response>> {
        Self::read_entry(&self.cache_dir(name), key).await
    }

    async fn match_any(&self, key: &str) -> Result<Option<Response>> {
        for name in self.keys().await? {
            if let Some(response) = self.match_in(&name, key).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let dir = self.cache_dir(name);
        if Self::read_manifest(&dir).await?.is_none() {
            return Ok(false);
        }
        // Move aside first so the cache disappears from `keys` in one step.
        let trash = self.root.join(format!(".trash-{}", uuid::Uuid::new_v4()));
        match tokio::fs::rename(&dir, &trash).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        tokio::fs::remove_dir_all(&trash).await?;
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut manifests = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(manifest) = Self::read_manifest(&path).await? {
                manifests.push(manifest);
            }
        }

        manifests.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.name.cmp(&b.name)));
        Ok(manifests.into_iter().map(|m| m.name).collect())
    }
}
