//! Strategy execution.

use std::sync::Arc;

use reqwest::Url;
use tracing::{debug, instrument, warn};

use super::lifecycle::{Generation, Lifecycle, LifecycleState};
use super::network::{CacheDirective, FetchError, HttpNetwork, Network};
use super::request::InterceptedRequest;
use super::response::{InterceptedResponse, ResponseKind};
use super::storage::{CacheStorage, DiskCacheStorage};
use super::strategy::{RouteTable, Strategy};
use crate::config::ClientSettings;

/// What the worker decided to do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// Not handled; the caller performs the request itself.
    PassThrough,
    Respond(InterceptedResponse),
}

impl Interception {
    pub fn response(&self) -> Option<&InterceptedResponse> {
        match self {
            Self::PassThrough => None,
            Self::Respond(response) => Some(response),
        }
    }
}

pub struct InterceptorWorker {
    routes: RouteTable,
    network: Arc<dyn Network>,
    storage: Arc<dyn CacheStorage>,
    generation: Generation,
    precache: Vec<Url>,
    lifecycle: Lifecycle,
}

impl InterceptorWorker {
    pub fn new(
        routes: RouteTable,
        network: Arc<dyn Network>,
        storage: Arc<dyn CacheStorage>,
    ) -> Self {
        Self {
            routes,
            network,
            storage,
            generation: Generation::current(),
            precache: Vec::new(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Build a worker against the configured origin with disk storage.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self, FetchError> {
        let network = HttpNetwork::new(settings.origin.clone())?;
        let precache = settings
            .precache_routes
            .iter()
            .map(|route| {
                settings.origin.join(route).map_err(|err| {
                    FetchError::Client(format!("invalid precache route `{route}`: {err}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(
            RouteTable::from(settings),
            Arc::new(network),
            Arc::new(DiskCacheStorage::new(settings.cache_dir.clone())),
        )
        .with_precache(precache))
    }

    pub fn with_generation(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_precache(mut self, routes: Vec<Url>) -> Self {
        self.precache = routes;
        self
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn skip_waiting(&self) -> bool {
        self.lifecycle.skip_waiting()
    }

    pub fn clients_claimed(&self) -> bool {
        self.lifecycle.clients_claimed()
    }

    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub(crate) fn network(&self) -> &dyn Network {
        self.network.as_ref()
    }

    pub(crate) fn storage(&self) -> &dyn CacheStorage {
        self.storage.as_ref()
    }

    pub(crate) fn precache_routes(&self) -> &[Url] {
        &self.precache
    }

    /// Run `request` through the strategy its route selects.
    #[instrument(skip_all, fields(url = %request.url, method = %request.method))]
    pub async fn handle(&self, request: &InterceptedRequest) -> Interception {
        if !self.lifecycle.is_controlling() {
            return Interception::PassThrough;
        }

        let strategy = self.routes.strategy_for(request);
        debug!(strategy = strategy.as_str(), "classified request");
        let response = match strategy {
            Strategy::Bypass => return Interception::PassThrough,
            Strategy::NetworkOnlyNoStore => self.network_only(request).await,
            Strategy::NetworkFirstWithFallback => self.network_first(request).await,
            Strategy::CacheFirst => self.cache_first(request).await,
        };
        Interception::Respond(response)
    }

    async fn network_only(&self, request: &InterceptedRequest) -> InterceptedResponse {
        match self.network.fetch(request, CacheDirective::NoStore).await {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "icon fetch failed; answering 404");
                InterceptedResponse::empty_not_found()
            }
        }
    }

    async fn network_first(&self, request: &InterceptedRequest) -> InterceptedResponse {
        match self.network.fetch(request, CacheDirective::NoCache).await {
            Ok(response) => {
                if response.is_ok() && response.kind == ResponseKind::Basic {
                    self.store(request, &response).await;
                }
                response
            }
            Err(err) => {
                warn!(error = %err, "network unreachable; trying stored copy");
                match self.lookup(request).await {
                    Some(stored) => stored,
                    None => InterceptedResponse::offline("network unavailable and no cached copy"),
                }
            }
        }
    }

    async fn cache_first(&self, request: &InterceptedRequest) -> InterceptedResponse {
        if let Some(stored) = self.lookup(request).await {
            debug!(outcome = "hit", "serving stored response");
            return stored;
        }

        match self.network.fetch(request, CacheDirective::Default).await {
            Ok(response) => {
                if response.is_ok() && !response.is_opaque() {
                    self.store(request, &response).await;
                }
                response
            }
            Err(err) => {
                warn!(error = %err, "network unreachable on cache miss");
                InterceptedResponse::offline("network unavailable")
            }
        }
    }

    async fn lookup(&self, request: &InterceptedRequest) -> Option<InterceptedResponse> {
        match self
            .storage
            .lookup(self.generation.as_str(), &request.key())
            .await
        {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "client cache lookup failed; treating as miss");
                None
            }
        }
    }

    async fn store(&self, request: &InterceptedRequest, response: &InterceptedResponse) {
        if let Err(err) = self
            .storage
            .put(self.generation.as_str(), &request.key(), response)
            .await
        {
            warn!(error = %err, "client cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use reqwest::{Method, StatusCode};

    use super::*;
    use crate::interceptor::request::RequestMode;
    use crate::interceptor::storage::MemoryCacheStorage;

    struct Echo;

    #[async_trait]
    impl Network for Echo {
        async fn fetch(
            &self,
            request: &InterceptedRequest,
            _directive: CacheDirective,
        ) -> Result<InterceptedResponse, FetchError> {
            Ok(InterceptedResponse::new(
                StatusCode::OK,
                ResponseKind::Basic,
                request.url.to_string(),
            ))
        }
    }

    fn worker() -> InterceptorWorker {
        InterceptorWorker::new(
            RouteTable::default(),
            Arc::new(Echo),
            Arc::new(MemoryCacheStorage::new()),
        )
    }

    fn request(path: &str, mode: RequestMode) -> InterceptedRequest {
        let url = Url::parse("https://app.example/")
            .and_then(|base| base.join(path))
            .expect("url");
        InterceptedRequest::new(Method::GET, url, mode)
    }

    #[tokio::test]
    async fn passes_through_until_activated() {
        let worker = worker();
        let req = request("/assets/app.js", RequestMode::SameOrigin);
        assert_eq!(worker.handle(&req).await, Interception::PassThrough);

        worker.install().await.expect("install");
        assert!(worker.skip_waiting());
        assert_eq!(worker.handle(&req).await, Interception::PassThrough);

        worker.activate().await.expect("activate");
        assert!(worker.clients_claimed());
        assert!(worker.handle(&req).await.response().is_some());
    }

    #[tokio::test]
    async fn navigations_and_writes_pass_through_when_active() {
        let worker = worker();
        worker.install().await.expect("install");
        worker.activate().await.expect("activate");

        let nav = request("/dashboard", RequestMode::Navigate);
        assert_eq!(worker.handle(&nav).await, Interception::PassThrough);

        let mut post = request("/api/orders", RequestMode::Cors);
        post.method = Method::POST;
        assert_eq!(worker.handle(&post).await, Interception::PassThrough);
    }

    #[tokio::test]
    async fn activate_before_install_fails() {
        let worker = worker();
        assert!(worker.activate().await.is_err());
        assert_eq!(worker.state(), LifecycleState::Parsed);
    }
}
