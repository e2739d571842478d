//! The offline agent: install, fetch and activate handlers.

use std::sync::Arc;

use futures::future::join_all;
use futures::{StreamExt, stream};

use crate::cache::{CacheStorage, MemoryCacheStorage};
use crate::config::AgentConfig;
use crate::control::{NativeControl, WorkerControl};
use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::network::{HttpNetwork, Network};
use crate::report::{ActivateReport, InstallReport, InstallReportBuilder};

/// Trait for receiving lifecycle progress updates.
///
/// All methods have default no-op implementations for convenience.
pub trait AgentProgress: Send + Sync {
    /// Called when install starts caching `total` assets into `cache_name`.
    fn on_install_start(&self, _cache_name: &str, _total: usize) {}

    /// Called when an asset has been stored.
    fn on_asset_cached(&self, _path: &str, _bytes: u64) {}

    /// Called when an asset could not be stored.
    fn on_asset_failed(&self, _path: &str, _error: &str) {}

    /// Called when activate deletes a stale cache.
    fn on_cache_deleted(&self, _cache_name: &str) {}

    /// Called when a request is answered without the network.
    fn on_fallback(&self, _url: &str, _source: ResponseSource) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl AgentProgress for NoProgress {}

/// Where a fetch handler response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Live network response.
    Network,
    /// Exact match from a cache.
    Cache,
    /// The cached offline fallback page.
    Offline,
}

impl ResponseSource {
    /// Short lowercase name, as used in the `x-offline-source` header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Cache => "cache",
            Self::Offline => "offline",
        }
    }
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the fetch handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The network answered (any status).
    Network(Response),
    /// The network failed; the exact request was found in a cache.
    Cached(Response),
    /// The network failed and nothing matched; the offline page was found.
    Offline(Response),
    /// The network failed and neither the request nor the offline page is cached.
    Unresolved,
}

impl FetchOutcome {
    /// Returns the response, if any.
    #[must_use]
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Network(r) | Self::Cached(r) | Self::Offline(r) => Some(r),
            Self::Unresolved => None,
        }
    }

    /// Returns where the response came from, if there is one.
    #[must_use]
    pub const fn source(&self) -> Option<ResponseSource> {
        match self {
            Self::Network(_) => Some(ResponseSource::Network),
            Self::Cached(_) => Some(ResponseSource::Cache),
            Self::Offline(_) => Some(ResponseSource::Offline),
            Self::Unresolved => None,
        }
    }
}

/// Offline-support agent wrapping the host's cache store, network and
/// lifecycle controls.
///
/// The agent holds no mutable state: every handler may run concurrently with
/// any other, and the agent can be shared behind an `Arc`.
pub struct OfflineAgent<S = MemoryCacheStorage, N = HttpNetwork, W = NativeControl>
where
    S: CacheStorage,
    N: Network,
    W: WorkerControl,
{
    config: AgentConfig,
    caches: S,
    network: N,
    control: W,
    progress: Arc<dyn AgentProgress>,
}

impl<S: CacheStorage, N: Network, W: WorkerControl> OfflineAgent<S, N, W> {
    /// Creates an agent over the given host capabilities.
    #[must_use]
    pub fn new(config: AgentConfig, caches: S, network: N, control: W) -> Self {
        Self {
            config,
            caches,
            network,
            control,
            progress: Arc::new(NoProgress),
        }
    }

    /// Sets the progress receiver.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn AgentProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Returns the agent configuration.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Returns the cache store.
    #[must_use]
    pub const fn caches(&self) -> &S {
        &self.caches
    }

    /// Returns the lifecycle controls.
    #[must_use]
    pub const fn control(&self) -> &W {
        &self.control
    }

    /// Install handler.
    ///
    /// Requests immediate activation, opens the current cache and stores every
    /// asset that can be fetched with a 2xx status. Assets are fetched
    /// concurrently; each failure is caught and recorded on its own.
    ///
    /// # Errors
    ///
    /// Returns an error only if the current cache cannot be opened. Asset
    /// failures never fail the install.
    pub async fn install(&self) -> Result<InstallReport> {
        let name = &self.config.cache_name;
        let mut builder = InstallReportBuilder::new(name.clone());

        if let Err(e) = self.control.skip_waiting().await {
            log::warn!("Skip-waiting request failed: {e}");
        }

        self.caches.open(name).await?;
        log::info!(
            "Installing {name}: caching {} assets",
            self.config.assets.len()
        );
        self.progress
            .on_install_start(name, self.config.assets.len());

        let results: Vec<_> = stream::iter(&self.config.assets)
            .map(|path| async move {
                let result = self.cache_asset(path).await.map_err(|e| {
                    log::warn!("Failed to cache {path}: {e}");
                    e.to_string()
                });
                match &result {
                    Ok(bytes) => self.progress.on_asset_cached(path, *bytes),
                    Err(message) => self.progress.on_asset_failed(path, message),
                }
                (path, result)
            })
            .buffer_unordered(self.config.concurrent_fetches.max(1))
            .collect()
            .await;

        for (path, result) in results {
            match result {
                Ok(bytes) => builder.add_cached(path.as_str(), bytes),
                Err(message) => builder.add_failed(path.as_str(), message),
            }
        }

        let report = builder.build();
        log::info!(
            "Installed {name}: {} of {} assets cached",
            report.cached_count(),
            self.config.assets.len()
        );
        Ok(report)
    }

    /// Fetches one asset and stores it in the current cache.
    ///
    /// Returns the number of body bytes stored.
    async fn cache_asset(&self, path: &str) -> Result<u64> {
        let url = self.config.resolve(path)?;
        let response = self.network.fetch(&Request::get(url.as_str())).await?;
        if !response.is_success() {
            return Err(Error::Status {
                url,
                status: response.status,
            });
        }
        let bytes = u64::try_from(response.body.len()).unwrap_or(u64::MAX);
        self.caches
            .put(&self.config.cache_name, &url, response)
            .await?;
        Ok(bytes)
    }

    /// Fetch handler: network first, then the cache, then the offline page.
    ///
    /// Never fails. A network response is returned whatever its status; only
    /// the absence of any response triggers the fallbacks.
    pub async fn fetch(&self, request: &Request) -> FetchOutcome {
        match self.network.fetch(request).await {
            Ok(response) => return FetchOutcome::Network(response),
            Err(e) => log::debug!("Network failed for {} {}: {e}", request.method, request.url),
        }

        if request.is_cacheable()
            && let Some(key) = request.cache_key()
            && let Some(response) = self.lookup(&key).await
        {
            self.progress.on_fallback(&request.url, ResponseSource::Cache);
            return FetchOutcome::Cached(response);
        }

        let offline_key = match self.config.resolve(&self.config.offline_path) {
            Ok(key) => key,
            Err(e) => {
                log::warn!("Offline page path is unusable: {e}");
                return FetchOutcome::Unresolved;
            }
        };
        if let Some(response) = self.lookup(&offline_key).await {
            self.progress.on_fallback(&request.url, ResponseSource::Offline);
            return FetchOutcome::Offline(response);
        }

        log::debug!("No cached response for {}", request.url);
        FetchOutcome::Unresolved
    }

    /// Looks a key up across all caches, treating store errors as a miss.
    async fn lookup(&self, key: &str) -> Option<Response> {
        match self.caches.match_any(key).await {
            Ok(hit) => hit,
            Err(e) => {
                log::warn!("Cache lookup for {key} failed: {e}");
                None
            }
        }
    }

    /// Activate handler.
    ///
    /// Deletes every cache except the current one, concurrently, then takes
    /// control of open pages. A failed deletion is logged and reported; it
    /// does not stop the other deletions or the claim.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache names cannot be listed or control of
    /// open pages cannot be taken.
    pub async fn activate(&self) -> Result<ActivateReport> {
        let names = self.caches.keys().await?;
        let (current, stale): (Vec<_>, Vec<_>) = names
            .into_iter()
            .partition(|name| self.config.is_current(name));

        let results = join_all(stale.into_iter().map(|name| async move {
            let result = self.caches.delete(&name).await;
            (name, result)
        }))
        .await;

        let mut report = ActivateReport {
            kept: current.into_iter().next(),
            ..ActivateReport::default()
        };
        for (name, result) in results {
            match result {
                Ok(true) => {
                    log::info!("Deleted stale cache {name}");
                    self.progress.on_cache_deleted(&name);
                    report.deleted.push(name);
                }
                Ok(false) => log::debug!("Stale cache {name} was already gone"),
                Err(e) => {
                    log::warn!("Failed to delete stale cache {name}: {e}");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        self.control.claim_clients().await?;
        report.claimed = true;
        log::info!(
            "Activated {}: {} stale caches deleted",
            self.config.cache_name,
            report.deleted.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::DiskCacheStorage;

    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use proptest::prelude::*;

    pub const ORIGIN: &str = "http://flash.test";

    /// Network answering from a fixed table; unknown URLs fail like an
    /// unreachable host.
    #[derive(Default)]
    pub struct MockNetwork {
        replies: HashMap<String, Response>,
        calls: AtomicUsize,
    }

    impl MockNetwork {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(mut self, path: &str, response: Response) -> Self {
            self.replies.insert(format!("{ORIGIN}{path}"), response);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Network for MockNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .get(&request.url)
                .cloned()
                .ok_or_else(|| Error::Network(format!("{} unreachable", request.url)))
        }
    }

    /// Memory store whose `delete` fails for selected names.
    #[derive(Default)]
    struct FlakyDeleteStorage {
        inner: MemoryCacheStorage,
        undeletable: HashSet<String>,
    }

    #[async_trait]
    impl CacheStorage for FlakyDeleteStorage {
        async fn open(&self, name: &str) -> Result<()> {
            self.inner.open(name).await
        }
        async fn put(&self, name: &str, key: &str, response: Response) -> Result<()> {
            self.inner.put(name, key, response).await
        }
        async fn match_in(&self, name: &str, key: &str) -> Result<Option<Response>> {
            self.inner.match_in(name, key).await
        }
        async fn match_any(&self, key: &str) -> Result<Option<Response>> {
            self.inner.match_any(key).await
        }
        async fn delete(&self, name: &str) -> Result<bool> {
            if self.undeletable.contains(name) {
                return Err(Error::Cache(format!("{name} is locked")));
            }
            self.inner.delete(name).await
        }
        async fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys().await
        }
    }

    /// Store where every lookup fails.
    struct BrokenLookupStorage;

    #[async_trait]
    impl CacheStorage for BrokenLookupStorage {
        async fn open(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn put(&self, _name: &str, _key: &str, _response: Response) -> Result<()> {
            Ok(())
        }
        async fn match_in(&self, _name: &str, _key: &str) -> Result<Option<Response>> {
            Err(Error::Cache("corrupt".into()))
        }
        async fn match_any(&self, _key: &str) -> Result<Option<Response>> {
            Err(Error::Cache("corrupt".into()))
        }
        async fn delete(&self, _name: &str) -> Result<bool> {
            Ok(false)
        }
        async fn keys(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    /// Records progress events as strings.
    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl AgentProgress for RecordingProgress {
        fn on_asset_cached(&self, path: &str, bytes: u64) {
            self.events.lock().unwrap().push(format!("cached {path} {bytes}"));
        }
        fn on_asset_failed(&self, path: &str, _error: &str) {
            self.events.lock().unwrap().push(format!("failed {path}"));
        }
        fn on_cache_deleted(&self, cache_name: &str) {
            self.events.lock().unwrap().push(format!("deleted {cache_name}"));
        }
        fn on_fallback(&self, url: &str, source: ResponseSource) {
            self.events.lock().unwrap().push(format!("{source} {url}"));
        }
    }

    pub fn config() -> AgentConfig {
        AgentConfig::new()
            .with_origin(ORIGIN)
            .with_cache_name("FlashAI-cache-v3")
    }

    fn url(path: &str) -> String {
        format!("{ORIGIN}{path}")
    }

    fn page(body: &str) -> Response {
        Response::new(200, body.to_string())
    }

    fn agent(network: MockNetwork) -> OfflineAgent<MemoryCacheStorage, MockNetwork> {
        OfflineAgent::new(
            config(),
            MemoryCacheStorage::new(),
            network,
            NativeControl::new(),
        )
    }

    // =========================================================================
    // Install
    // =========================================================================

    #[tokio::test]
    async fn install_caches_every_reachable_asset() {
        let network = MockNetwork::new()
            .reply("/", page("home"))
            .reply("/flashcards/", page("cards"))
            .reply("/flashcards/study/", page("study"))
            .reply("/offline/", page("offline"));
        let agent = agent(network);

        let report = agent.install().await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.cached_count(), 4);
        assert_eq!(report.total_bytes, 4 + 5 + 5 + 7);
        assert!(agent.control().skipped_waiting());

        let cached = agent
            .caches()
            .match_in("FlashAI-cache-v3", &url("/flashcards/study/"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.body, "study");
    }

    #[tokio::test]
    async fn install_skips_failed_and_non_success_assets() {
        let network = MockNetwork::new()
            .reply("/", page("home"))
            .reply("/flashcards/", Response::new(500, "boom"))
            .reply("/offline/", page("offline"));
        let progress = Arc::new(RecordingProgress::default());
        let agent = agent(network).with_progress(progress.clone());

        let report = agent.install().await.unwrap();
        assert_eq!(report.cached_count(), 2);
        let failed: HashSet<_> = report.failed.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(failed, HashSet::from(["/flashcards/", "/flashcards/study/"]));

        let caches = agent.caches();
        assert!(caches
            .match_in("FlashAI-cache-v3", &url("/flashcards/"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(caches.len_of("FlashAI-cache-v3").await, Some(2));

        let events = progress.events.lock().unwrap();
        assert!(events.contains(&"failed /flashcards/".to_string()));
        assert!(events.contains(&"cached / 4".to_string()));
    }

    #[tokio::test]
    async fn install_completes_when_nothing_is_reachable() {
        let agent = agent(MockNetwork::new());

        let report = agent.install().await.unwrap();
        assert_eq!(report.cached_count(), 0);
        assert_eq!(report.failed.len(), 4);
        assert_eq!(agent.caches().keys().await.unwrap(), vec!["FlashAI-cache-v3"]);
        assert_eq!(agent.caches().len_of("FlashAI-cache-v3").await, Some(0));
    }

    proptest! {
        #[test]
        fn install_stores_exactly_the_successful_subset(
            outcomes in proptest::collection::vec(any::<bool>(), 1..8),
        ) {
            let paths: Vec<String> = (0..outcomes.len()).map(|i| format!("/asset/{i}/")).collect();
            let mut network = MockNetwork::new();
            for (path, ok) in paths.iter().zip(&outcomes) {
                let status = if *ok { 200 } else { 404 };
                network = network.reply(path, Response::new(status, format!("body {path}")));
            }
            let agent = OfflineAgent::new(
                config().with_assets(paths.clone()).with_concurrent_fetches(3),
                MemoryCacheStorage::new(),
                network,
                NativeControl::new(),
            );

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let report = agent.install().await.unwrap();
                let expected = outcomes.iter().filter(|ok| **ok).count();
                prop_assert_eq!(report.cached_count(), expected);

                for (path, ok) in paths.iter().zip(&outcomes) {
                    let hit = agent
                        .caches()
                        .match_in("FlashAI-cache-v3", &url(path))
                        .await
                        .unwrap();
                    if *ok {
                        prop_assert_eq!(hit.map(|r| r.body), Some(bytes::Bytes::from(format!("body {path}"))));
                    } else {
                        prop_assert!(hit.is_none());
                    }
                }
                Ok(())
            })?;
        }
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    #[tokio::test]
    async fn fetch_prefers_live_network_over_cache() {
        let agent = agent(MockNetwork::new().reply("/", page("live")));
        agent
            .caches()
            .put("FlashAI-cache-v2", &url("/"), page("stale"))
            .await
            .unwrap();

        let outcome = agent.fetch(&Request::get(url("/"))).await;
        assert_eq!(outcome, FetchOutcome::Network(page("live")));
        assert_eq!(outcome.source(), Some(ResponseSource::Network));
    }

    #[tokio::test]
    async fn fetch_returns_non_success_responses_as_is() {
        let agent = agent(MockNetwork::new().reply("/missing/", Response::new(404, "nope")));
        agent
            .caches()
            .put("FlashAI-cache-v3", &url("/offline/"), page("offline"))
            .await
            .unwrap();

        let outcome = agent.fetch(&Request::get(url("/missing/"))).await;
        assert_eq!(outcome, FetchOutcome::Network(Response::new(404, "nope")));
    }

    #[tokio::test]
    async fn fetch_falls_back_to_exact_cache_match() {
        let progress = Arc::new(RecordingProgress::default());
        let agent = agent(MockNetwork::new()).with_progress(progress.clone());
        agent
            .caches()
            .put("FlashAI-cache-v3", &url("/flashcards/"), page("cached cards"))
            .await
            .unwrap();
        agent
            .caches()
            .put("FlashAI-cache-v3", &url("/offline/"), page("offline"))
            .await
            .unwrap();

        let outcome = agent
            .fetch(&Request::get(format!("{}#card-2", url("/flashcards/"))))
            .await;
        assert_eq!(outcome, FetchOutcome::Cached(page("cached cards")));
        assert_eq!(
            progress.events.lock().unwrap().as_slice(),
            [format!("cache {}#card-2", url("/flashcards/"))]
        );
    }

    #[tokio::test]
    async fn fetch_searches_stale_caches_too() {
        let agent = agent(MockNetwork::new());
        agent
            .caches()
            .put("FlashAI-cache-v2", &url("/flashcards/"), page("old cards"))
            .await
            .unwrap();

        let outcome = agent.fetch(&Request::get(url("/flashcards/"))).await;
        assert_eq!(outcome, FetchOutcome::Cached(page("old cards")));
    }

    #[tokio::test]
    async fn fetch_falls_back_to_offline_page() {
        let agent = agent(MockNetwork::new());
        agent
            .caches()
            .put("FlashAI-cache-v3", &url("/offline/"), page("offline"))
            .await
            .unwrap();

        let outcome = agent.fetch(&Request::get(url("/create/"))).await;
        assert_eq!(outcome.source(), Some(ResponseSource::Offline));
        assert_eq!(outcome.into_response(), Some(page("offline")));
    }

    #[tokio::test]
    async fn fetch_non_get_skips_exact_match_but_gets_offline_page() {
        let agent = agent(MockNetwork::new());
        let caches = agent.caches();
        caches
            .put("FlashAI-cache-v3", &url("/create/"), page("form"))
            .await
            .unwrap();
        caches
            .put("FlashAI-cache-v3", &url("/offline/"), page("offline"))
            .await
            .unwrap();

        let post = Request::new(reqwest::Method::POST, url("/create/")).with_body("q=1");
        let outcome = agent.fetch(&post).await;
        assert_eq!(outcome, FetchOutcome::Offline(page("offline")));
    }

    #[tokio::test]
    async fn fetch_is_unresolved_when_nothing_is_cached() {
        let agent = agent(MockNetwork::new());
        let outcome = agent.fetch(&Request::get(url("/flashcards/"))).await;
        assert_eq!(outcome, FetchOutcome::Unresolved);
        assert_eq!(outcome.source(), None);
        assert_eq!(outcome.into_response(), None);
    }

    #[tokio::test]
    async fn fetch_matches_installed_keys_in_any_spelling() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let online = OfflineAgent::new(
            config().with_assets(vec!["/".to_string()]),
            Arc::clone(&storage),
            MockNetwork::new().reply("/", page("home")),
            NativeControl::new(),
        );
        online.install().await.unwrap();

        let offline = OfflineAgent::new(
            config(),
            Arc::clone(&storage),
            MockNetwork::new(),
            NativeControl::new(),
        );
        for spelling in ["http://flash.test/", "http://flash.test", "HTTP://FLASH.test/"] {
            assert_eq!(
                offline.fetch(&Request::get(spelling)).await,
                FetchOutcome::Cached(page("home")),
                "{spelling}"
            );
        }
    }

    #[tokio::test]
    async fn fetch_treats_lookup_errors_as_misses() {
        let agent = OfflineAgent::new(
            config(),
            BrokenLookupStorage,
            MockNetwork::new(),
            NativeControl::new(),
        );
        let outcome = agent.fetch(&Request::get(url("/"))).await;
        assert_eq!(outcome, FetchOutcome::Unresolved);
    }

    #[tokio::test]
    async fn fetch_tries_the_network_exactly_once() {
        let agent = agent(MockNetwork::new());
        let _ = agent.fetch(&Request::get(url("/"))).await;
        let _ = agent.fetch(&Request::get(url("/flashcards/"))).await;
        assert_eq!(agent.network.calls(), 2);
    }

    // =========================================================================
    // Activate
    // =========================================================================

    #[tokio::test]
    async fn activate_deletes_stale_caches_and_claims() {
        let agent = agent(MockNetwork::new());
        agent.caches().open("FlashAI-cache-v2").await.unwrap();
        agent.caches().open("FlashAI-cache-v3").await.unwrap();

        let report = agent.activate().await.unwrap();
        assert_eq!(report.kept.as_deref(), Some("FlashAI-cache-v3"));
        assert_eq!(report.deleted, vec!["FlashAI-cache-v2"]);
        assert!(report.claimed);
        assert!(agent.control().is_controlling());
        assert_eq!(agent.caches().keys().await.unwrap(), vec!["FlashAI-cache-v3"]);
    }

    #[tokio::test]
    async fn activate_twice_deletes_nothing_the_second_time() {
        let agent = agent(MockNetwork::new());
        for name in ["FlashAI-cache-v1", "FlashAI-cache-v2", "FlashAI-cache-v3"] {
            agent.caches().open(name).await.unwrap();
        }

        let first = agent.activate().await.unwrap();
        assert_eq!(first.deleted.len(), 2);

        let second = agent.activate().await.unwrap();
        assert!(second.deleted.is_empty());
        assert!(second.is_clean());
        assert_eq!(agent.caches().keys().await.unwrap(), vec!["FlashAI-cache-v3"]);
    }

    #[tokio::test]
    async fn activate_without_current_cache_still_claims() {
        let agent = agent(MockNetwork::new());
        let report = agent.activate().await.unwrap();
        assert_eq!(report.kept, None);
        assert!(report.deleted.is_empty());
        assert!(report.claimed);
    }

    #[tokio::test]
    async fn activate_continues_past_failed_deletions() {
        let storage = FlakyDeleteStorage {
            undeletable: HashSet::from(["FlashAI-cache-v1".to_string()]),
            ..FlakyDeleteStorage::default()
        };
        for name in ["FlashAI-cache-v1", "FlashAI-cache-v2", "FlashAI-cache-v3"] {
            storage.open(name).await.unwrap();
        }
        let progress = Arc::new(RecordingProgress::default());
        let agent = OfflineAgent::new(config(), storage, MockNetwork::new(), NativeControl::new())
            .with_progress(progress.clone());

        let report = agent.activate().await.unwrap();
        assert_eq!(report.deleted, vec!["FlashAI-cache-v2"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "FlashAI-cache-v1");
        assert!(!report.is_clean());
        assert!(report.claimed);
        assert_eq!(
            agent.caches().keys().await.unwrap(),
            vec!["FlashAI-cache-v1", "FlashAI-cache-v3"]
        );
        assert_eq!(
            progress.events.lock().unwrap().as_slice(),
            ["deleted FlashAI-cache-v2".to_string()]
        );
    }

    // =========================================================================
    // Full lifecycle
    // =========================================================================

    #[tokio::test]
    async fn upgrade_from_previous_version_serves_offline() {
        let storage = Arc::new(MemoryCacheStorage::new());
        storage
            .put("FlashAI-cache-v2", &url("/offline/"), page("offline v2"))
            .await
            .unwrap();

        let online = OfflineAgent::new(
            config(),
            Arc::clone(&storage),
            MockNetwork::new()
                .reply("/", page("home v3"))
                .reply("/offline/", page("offline v3")),
            NativeControl::new(),
        );
        online.install().await.unwrap();
        online.activate().await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["FlashAI-cache-v3"]);

        // Same caches, network gone.
        let offline = OfflineAgent::new(
            config(),
            Arc::clone(&storage),
            MockNetwork::new(),
            NativeControl::new(),
        );
        assert_eq!(
            offline.fetch(&Request::get(url("/"))).await,
            FetchOutcome::Cached(page("home v3"))
        );
        assert_eq!(
            offline.fetch(&Request::get(url("/flashcards/"))).await,
            FetchOutcome::Offline(page("offline v3"))
        );
    }

    #[tokio::test]
    async fn lifecycle_on_disk_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = DiskCacheStorage::new(dir.path());
        storage
            .put("FlashAI-cache-v2", &url("/"), page("home v2"))
            .await
            .unwrap();

        let online = OfflineAgent::new(
            config(),
            storage.clone(),
            MockNetwork::new()
                .reply("/", page("home v3"))
                .reply("/flashcards/", Response::new(503, "busy"))
                .reply("/offline/", page("offline v3")),
            NativeControl::new(),
        );
        let installed = online.install().await.unwrap();
        assert_eq!(installed.cached_count(), 2);
        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["FlashAI-cache-v2", "FlashAI-cache-v3"]
        );

        for path in ["/", "/flashcards/", "/flashcards/study/", "/offline/"] {
            let hit = storage.match_in("FlashAI-cache-v3", &url(path)).await.unwrap();
            let expected = match path {
                "/" => Some(page("home v3")),
                "/offline/" => Some(page("offline v3")),
                _ => None,
            };
            assert_eq!(hit, expected, "{path}");
        }

        let activated = online.activate().await.unwrap();
        assert_eq!(activated.deleted, vec!["FlashAI-cache-v2"]);
        assert!(activated.is_clean());

        // A fresh handle on the same directory, network gone.
        let offline = OfflineAgent::new(
            config(),
            DiskCacheStorage::new(dir.path()),
            MockNetwork::new(),
            NativeControl::new(),
        );
        assert_eq!(offline.caches().keys().await.unwrap(), vec!["FlashAI-cache-v3"]);
        assert_eq!(
            offline.fetch(&Request::get(url("/"))).await,
            FetchOutcome::Cached(page("home v3"))
        );
        assert_eq!(
            offline.fetch(&Request::get(url("/flashcards/"))).await,
            FetchOutcome::Offline(page("offline v3"))
        );
    }
}
