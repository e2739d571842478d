//! Configuration types for the offline agent and its native host.

use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix of the FlashAI cache names.
pub const CACHE_PREFIX: &str = "FlashAI";

/// Cache version deployed with this build.
pub const CACHE_VERSION: u32 = 3;

/// Path of the page served when neither the network nor the cache can answer.
pub const OFFLINE_PATH: &str = "/offline/";

/// Builds a version-tagged cache name, e.g. `FlashAI-cache-v3`.
#[must_use]
pub fn cache_name_for(prefix: &str, version: u32) -> String {
    format!("{prefix}-cache-v{version}")
}

/// Configuration for the agent's three handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Origin that asset paths and the offline path are resolved against.
    pub origin: String,
    /// Name of the current cache. Every other cache name is stale.
    pub cache_name: String,
    /// Paths pre-loaded on install, in order.
    pub assets: Vec<String>,
    /// Path of the offline fallback page.
    pub offline_path: String,
    /// Maximum number of asset fetches in flight during install.
    pub concurrent_fetches: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8000".to_string(),
            cache_name: cache_name_for(CACHE_PREFIX, CACHE_VERSION),
            assets: ["/", "/flashcards/", "/flashcards/study/", OFFLINE_PATH]
                .into_iter()
                .map(String::from)
                .collect(),
            offline_path: OFFLINE_PATH.to_string(),
            concurrent_fetches: 4,
        }
    }
}

impl AgentConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Sets the current cache name.
    #[must_use]
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Replaces the asset list.
    #[must_use]
    pub fn with_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets = assets.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the offline fallback path.
    #[must_use]
    pub fn with_offline_path(mut self, path: impl Into<String>) -> Self {
        self.offline_path = path.into();
        self
    }

    /// Sets the number of concurrent asset fetches.
    #[must_use]
    pub const fn with_concurrent_fetches(mut self, concurrent: usize) -> Self {
        self.concurrent_fetches = concurrent;
        self
    }

    /// Returns true if `name` is the current cache name.
    #[must_use]
    pub fn is_current(&self, name: &str) -> bool {
        name == self.cache_name
    }

    fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin).map_err(|e| Error::Url {
            url: self.origin.clone(),
            reason: e.to_string(),
        })
    }

    /// Resolves a path (or absolute URL) against the origin and returns its cache key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the origin or the path cannot be parsed.
    pub fn resolve(&self, path: &str) -> Result<String> {
        let mut url = self.origin_url()?.join(path).map_err(|e| Error::Url {
            url: path.to_string(),
            reason: e.to_string(),
        })?;
        url.set_fragment(None);
        Ok(url.into())
    }

    /// Places a request target (path plus optional query) on the origin.
    ///
    /// Unlike [`resolve`](Self::resolve) the target is never joined as a
    /// reference, so `//host/path` stays a path on the origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the origin cannot be parsed.
    pub fn resolve_on_origin(&self, target: &str) -> Result<String> {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };
        let mut url = self.origin_url()?;
        url.set_path(path);
        url.set_query(query);
        url.set_fragment(None);
        Ok(url.into())
    }

    /// Checks the configuration for values the handlers cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty cache name or a zero fetch
    /// limit, and [`Error::Url`] for an unparsable origin or offline path.
    pub fn validate(&self) -> Result<()> {
        if self.cache_name.trim().is_empty() {
            return Err(Error::Config("cache_name must not be empty".to_string()));
        }
        if self.concurrent_fetches == 0 {
            return Err(Error::Config(
                "concurrent_fetches must be at least 1".to_string(),
            ));
        }
        self.resolve(&self.offline_path)?;
        Ok(())
    }
}

/// Where the native host keeps its caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the disk cache store.
    pub cache_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            cache_dir: cache_dir.join("flashai-offline"),
        }
    }
}

/// Offline proxy server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9724,
        }
    }
}

/// Complete application configuration, as read from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Agent configuration.
    pub agent: AgentConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Server configuration.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from TOML text and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.agent.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads configuration from `path` if given, otherwise returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a given file cannot be loaded.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}
