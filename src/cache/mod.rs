//! Named cache stores owned by the host.
//!
//! The agent never holds cache contents itself. It issues single, atomic
//! calls against a [`CacheStorage`]: open, put, match, delete and keys.

mod disk;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::message::Response;

pub use disk::DiskCacheStorage;

/// The host's cache-store API: a mapping from cache name to a mapping from
/// request identity (absolute URL) to response.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens the named cache, creating it if absent.
    async fn open(&self, name: &str) -> Result<()>;

    /// Stores `response` under `key` in the named cache, creating the cache if
    /// needed. Replaces any previous entry for `key` as a whole.
    async fn put(&self, name: &str, key: &str, response: Response) -> Result<()>;

    /// Looks `key` up in one cache.
    async fn match_in(&self, name: &str, key: &str) -> Result<Option<Response>>;

    /// Looks `key` up in every cache, oldest first, and returns the first hit.
    async fn match_any(&self, key: &str) -> Result<Option<Response>>;

    /// Deletes the named cache. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Lists all cache names in creation order.
    async fn keys(&self) -> Result<Vec<String>>;
}

#[async_trait]
impl<T: CacheStorage + ?Sized> CacheStorage for Arc<T> {
    async fn open(&self, name: &str) -> Result<()> {
        (**self).open(name).await
    }

    async fn put(&self, name: &str, key: &str, response: Response) -> Result<()> {
        (**self).put(name, key, response).await
    }

    async fn match_in(&self, name: &str, key: &str) -> Result<Option<Response>> {
        (**self).match_in(name, key).await
    }

    async fn match_any(&self, key: &str) -> Result<Option<Response>> {
        (**self).match_any(key).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        (**self).delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        (**self).keys().await
    }
}

/// A single named cache.
#[derive(Debug, Default)]
struct NamedCache {
    name: String,
    entries: HashMap<String, Response>,
}

/// In-process cache store.
///
/// Caches are kept in creation order so [`CacheStorage::keys`] and
/// [`CacheStorage::match_any`] see them the way a browser host would.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<Vec<NamedCache>>,
}

impl MemoryCacheStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries in the named cache, if it exists.
    pub async fn len_of(&self, name: &str) -> Option<usize> {
        self.caches
            .read()
            .await
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.entries.len())
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let mut caches = self.caches.write().await;
        if !caches.iter().any(|c| c.name == name) {
            caches.push(NamedCache {
                name: name.to_string(),
                entries: HashMap::new(),
            });
        }
        Ok(())
    }

    async fn put(&self, name: &str, key: &str, response: Response) -> Result<()> {
        let mut caches = self.caches.write().await;
        let index = match caches.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                caches.push(NamedCache {
                    name: name.to_string(),
                    entries: HashMap::new(),
                });
                caches.len() - 1
            }
        };
        caches[index].entries.insert(key.to_string(), response);
        Ok(())
    }

    async fn match_in(&self, name: &str, key: &str) -> Result<Option<Response>> {
        Ok(self
            .caches
            .read()
            .await
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.entries.get(key).cloned()))
    }

    async fn match_any(&self, key: &str) -> Result<Option<Response>> {
        Ok(self
            .caches
            .read()
            .await
            .iter()
            .find_map(|c| c.entries.get(key).cloned()))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|c| c.name != name);
        Ok(caches.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .caches
            .read()
            .await
            .iter()
            .map(|c| c.name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_is_idempotent_and_ordered() {
        let store = MemoryCacheStorage::new();
        store.open("FlashAI-cache-v2").await.unwrap();
        store.open("FlashAI-cache-v3").await.unwrap();
        store.open("FlashAI-cache-v2").await.unwrap();

        assert_eq!(
            store.keys().await.unwrap(),
            vec!["FlashAI-cache-v2", "FlashAI-cache-v3"]
        );
        assert_eq!(store.len_of("FlashAI-cache-v3").await, Some(0));
    }

    #[tokio::test]
    async fn put_replaces_and_match_in_is_scoped() {
        let store = MemoryCacheStorage::new();
        store
            .put("v3", "http://localhost/", Response::new(200, "old"))
            .await
            .unwrap();
        store
            .put("v3", "http://localhost/", Response::new(200, "new"))
            .await
            .unwrap();

        let hit = store.match_in("v3", "http://localhost/").await.unwrap();
        assert_eq!(hit.unwrap().body, "new");
        assert!(store.match_in("v2", "http://localhost/").await.unwrap().is_none());
        assert_eq!(store.len_of("v3").await, Some(1));
    }

    #[tokio::test]
    async fn match_any_prefers_oldest_cache() {
        let store = MemoryCacheStorage::new();
        store
            .put("v2", "http://localhost/", Response::new(200, "v2"))
            .await
            .unwrap();
        store
            .put("v3", "http://localhost/", Response::new(200, "v3"))
            .await
            .unwrap();
        store
            .put("v3", "http://localhost/offline/", Response::new(200, "offline"))
            .await
            .unwrap();

        let hit = store.match_any("http://localhost/").await.unwrap().unwrap();
        assert_eq!(hit.body, "v2");
        let offline = store
            .match_any("http://localhost/offline/")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(offline.body, "offline");
        assert!(store.match_any("http://localhost/nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = MemoryCacheStorage::new();
        store.open("v2").await.unwrap();
        assert!(store.delete("v2").await.unwrap());
        assert!(!store.delete("v2").await.unwrap());
        assert!(store.keys().await.unwrap().is_empty());
    }
}
