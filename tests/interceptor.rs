//! Strategy behaviour of the interception cache against scripted networks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use inboxdesk::interceptor::{
    CacheDirective, CacheStorage, DiskCacheStorage, FetchError, Generation, InstallReport,
    InterceptedRequest, InterceptedResponse, Interception, InterceptorWorker, MemoryCacheStorage,
    Network, RequestKey, RequestMode, ResponseKind, RouteTable, StorageError,
};
use reqwest::{Method, StatusCode, Url};

const ORIGIN: &str = "https://app.example/";

fn url(path: &str) -> Url {
    Url::parse(ORIGIN)
        .and_then(|base| base.join(path))
        .expect("url")
}

fn request(path: &str, mode: RequestMode) -> InterceptedRequest {
    InterceptedRequest::new(Method::GET, url(path), mode)
}

/// Network that answers from a route table, or fails every call when offline.
#[derive(Default)]
struct ScriptedNetwork {
    offline: AtomicBool,
    calls: AtomicUsize,
    routes: Mutex<HashMap<String, InterceptedResponse>>,
    directives: Mutex<Vec<CacheDirective>>,
}

impl ScriptedNetwork {
    fn serve(&self, path: &str, response: InterceptedResponse) {
        self.routes
            .lock()
            .expect("routes")
            .insert(url(path).to_string(), response);
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn directives(&self) -> Vec<CacheDirective> {
        self.directives.lock().expect("directives").clone()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(
        &self,
        request: &InterceptedRequest,
        directive: CacheDirective,
    ) -> Result<InterceptedResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.directives.lock().expect("directives").push(directive);
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::transport(&request.url, "connection refused"));
        }
        let routes = self.routes.lock().expect("routes");
        Ok(routes.get(request.url.as_str()).cloned().unwrap_or_else(|| {
            InterceptedResponse::new(StatusCode::NOT_FOUND, ResponseKind::Basic, "missing")
        }))
    }
}

/// Storage wrapper that counts how often it is touched.
struct CountingStorage {
    inner: MemoryCacheStorage,
    lookups: AtomicUsize,
    puts: AtomicUsize,
}

impl CountingStorage {
    fn new() -> Self {
        Self {
            inner: MemoryCacheStorage::new(),
            lookups: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CacheStorage for CountingStorage {
    async fn namespaces(&self) -> Result<Vec<String>, StorageError> {
        self.inner.namespaces().await
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<bool, StorageError> {
        self.inner.delete_namespace(namespace).await
    }

    async fn lookup(
        &self,
        namespace: &str,
        key: &RequestKey,
    ) -> Result<Option<InterceptedResponse>, StorageError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup(namespace, key).await
    }

    async fn put(
        &self,
        namespace: &str,
        key: &RequestKey,
        response: &InterceptedResponse,
    ) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(namespace, key, response).await
    }
}

fn ok(body: &str) -> InterceptedResponse {
    InterceptedResponse::new(StatusCode::OK, ResponseKind::Basic, body.to_string())
}

async fn active_worker(
    network: Arc<ScriptedNetwork>,
    storage: Arc<dyn CacheStorage>,
) -> InterceptorWorker {
    let worker = InterceptorWorker::new(RouteTable::default(), network, storage);
    worker.install().await.expect("install");
    worker.activate().await.expect("activate");
    worker
}

fn respond(interception: Interception) -> InterceptedResponse {
    match interception {
        Interception::Respond(response) => response,
        Interception::PassThrough => panic!("expected the worker to respond"),
    }
}

#[tokio::test]
async fn icon_requests_never_touch_storage() {
    let network = Arc::new(ScriptedNetwork::default());
    network.serve("/favicon.ico", ok("icon"));
    let storage = Arc::new(CountingStorage::new());
    let worker = active_worker(network.clone(), storage.clone()).await;

    let online = respond(
        worker
            .handle(&request("/favicon.ico", RequestMode::NoCors))
            .await,
    );
    assert_eq!(online.status, StatusCode::OK);

    network.go_offline();
    let offline = respond(
        worker
            .handle(&request("/icons/APP-192.png", RequestMode::NoCors))
            .await,
    );
    assert_eq!(offline.status, StatusCode::NOT_FOUND);
    assert!(offline.body.is_empty());

    assert_eq!(storage.lookups.load(Ordering::SeqCst), 0);
    assert_eq!(storage.puts.load(Ordering::SeqCst), 0);
    assert_eq!(
        network.directives(),
        vec![CacheDirective::NoStore, CacheDirective::NoStore]
    );
}

#[tokio::test]
async fn api_requests_fall_back_to_the_last_good_copy() {
    let network = Arc::new(ScriptedNetwork::default());
    network.serve("/api/inboxes", ok("[1,2,3]"));
    let worker = active_worker(network.clone(), Arc::new(MemoryCacheStorage::new())).await;
    let req = request("/api/inboxes", RequestMode::SameOrigin);

    let fresh = respond(worker.handle(&req).await);
    assert_eq!(fresh.body.as_ref(), b"[1,2,3]");

    network.serve("/api/inboxes", ok("[1,2,3,4]"));
    let refreshed = respond(worker.handle(&req).await);
    assert_eq!(refreshed.body.as_ref(), b"[1,2,3,4]");

    network.go_offline();
    let fallback = respond(worker.handle(&req).await);
    assert_eq!(fallback.status, StatusCode::OK);
    assert_eq!(fallback.body.as_ref(), b"[1,2,3,4]");
    assert!(
        network
            .directives()
            .iter()
            .all(|directive| *directive == CacheDirective::NoCache)
    );
}

#[tokio::test]
async fn api_request_without_copy_is_a_service_unavailable() {
    let network = Arc::new(ScriptedNetwork::default());
    let worker = active_worker(network.clone(), Arc::new(MemoryCacheStorage::new())).await;
    network.go_offline();

    let response = respond(
        worker
            .handle(&request("/api/domains", RequestMode::SameOrigin))
            .await,
    );
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.is_synthesized());
}

#[tokio::test]
async fn api_error_responses_are_returned_and_not_stored() {
    let network = Arc::new(ScriptedNetwork::default());
    network.serve(
        "/api/orders",
        InterceptedResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ResponseKind::Basic,
            "boom",
        ),
    );
    let storage = Arc::new(CountingStorage::new());
    let worker = active_worker(network.clone(), storage.clone()).await;
    let req = request("/api/orders", RequestMode::SameOrigin);

    let response = respond(worker.handle(&req).await);
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(storage.puts.load(Ordering::SeqCst), 0);

    network.go_offline();
    let offline = respond(worker.handle(&req).await);
    assert_eq!(offline.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn static_assets_are_fetched_once() {
    let network = Arc::new(ScriptedNetwork::default());
    network.serve("/assets/app.js", ok("console.log(1)"));
    let worker = active_worker(network.clone(), Arc::new(MemoryCacheStorage::new())).await;
    let req = request("/assets/app.js", RequestMode::SameOrigin);

    let first = respond(worker.handle(&req).await);
    let second = respond(worker.handle(&req).await);
    network.go_offline();
    let third = respond(worker.handle(&req).await);

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(network.calls(), 1);
}

#[tokio::test]
async fn static_asset_miss_while_offline_is_a_service_unavailable() {
    let network = Arc::new(ScriptedNetwork::default());
    network.go_offline();
    let worker = active_worker(network, Arc::new(MemoryCacheStorage::new())).await;

    let response = respond(
        worker
            .handle(&request("/assets/app.css", RequestMode::SameOrigin))
            .await,
    );
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn opaque_and_failed_assets_are_not_stored() {
    let network = Arc::new(ScriptedNetwork::default());
    network.serve(
        "/fonts/inter.woff2",
        InterceptedResponse::new(StatusCode::OK, ResponseKind::Opaque, ""),
    );
    let storage = Arc::new(CountingStorage::new());
    let worker = active_worker(network.clone(), storage.clone()).await;

    for _ in 0..2 {
        worker
            .handle(&request("/fonts/inter.woff2", RequestMode::NoCors))
            .await;
        worker
            .handle(&request("/assets/missing.js", RequestMode::SameOrigin))
            .await;
    }

    assert_eq!(storage.puts.load(Ordering::SeqCst), 0);
    assert_eq!(network.calls(), 4);
}

#[tokio::test]
async fn activating_a_new_generation_deletes_the_old_one() {
    let network = Arc::new(ScriptedNetwork::default());
    network.serve("/", ok("<html>v1</html>"));
    let storage = Arc::new(MemoryCacheStorage::new());

    let old = InterceptorWorker::new(RouteTable::default(), network.clone(), storage.clone())
        .with_generation(Generation::new("inboxdesk-v1"))
        .with_precache(vec![url("/")]);
    let report = old.install().await.expect("install v1");
    assert_eq!(
        report,
        InstallReport {
            cached: vec![url("/").to_string()],
            failed: Vec::new(),
        }
    );
    old.activate().await.expect("activate v1");

    network.serve("/", ok("<html>v2</html>"));
    let new = InterceptorWorker::new(RouteTable::default(), network.clone(), storage.clone())
        .with_generation(Generation::new("inboxdesk-v2"))
        .with_precache(vec![url("/")]);
    new.install().await.expect("install v2");
    let activated = new.activate().await.expect("activate v2");

    assert_eq!(activated.retained, "inboxdesk-v2");
    assert_eq!(activated.deleted, vec!["inboxdesk-v1".to_string()]);
    assert_eq!(
        storage.namespaces().await.expect("namespaces"),
        vec!["inboxdesk-v2".to_string()]
    );
    assert_eq!(storage.entry_count("inboxdesk-v2"), 1);
}

#[tokio::test]
async fn install_reports_routes_that_could_not_be_cached() {
    let network = Arc::new(ScriptedNetwork::default());
    network.serve("/", ok("home"));
    let worker = InterceptorWorker::new(
        RouteTable::default(),
        network,
        Arc::new(MemoryCacheStorage::new()),
    )
    .with_precache(vec![url("/"), url("/gone")]);

    let report = worker.install().await.expect("install");
    assert!(!report.is_complete());
    assert_eq!(report.cached, vec![url("/").to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, url("/gone").to_string());
}

#[tokio::test]
async fn disk_storage_survives_a_worker_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let network = Arc::new(ScriptedNetwork::default());
    network.serve("/assets/app.js", ok("bundle"));
    let req = request("/assets/app.js", RequestMode::SameOrigin);

    let first = active_worker(network.clone(), Arc::new(DiskCacheStorage::new(dir.path()))).await;
    respond(first.handle(&req).await);
    drop(first);

    network.go_offline();
    let restarted = InterceptorWorker::new(
        RouteTable::default(),
        network.clone(),
        Arc::new(DiskCacheStorage::new(dir.path())),
    );
    assert!(restarted.resume().await.expect("resume"));

    let served = respond(restarted.handle(&req).await);
    assert_eq!(served.status, StatusCode::OK);
    assert_eq!(served.body.as_ref(), b"bundle");
    assert_eq!(network.calls(), 1);
}

#[tokio::test]
async fn activation_leaves_foreign_directories_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let notes = dir.path().join("my-notes");
    std::fs::create_dir(&notes).expect("mkdir");
    std::fs::write(notes.join("important.txt"), b"do not delete").expect("write");

    let network = Arc::new(ScriptedNetwork::default());
    network.serve("/", ok("home"));
    let storage = Arc::new(DiskCacheStorage::new(dir.path()));

    let old = InterceptorWorker::new(RouteTable::default(), network.clone(), storage.clone())
        .with_generation(Generation::new("inboxdesk-v1"))
        .with_precache(vec![url("/")]);
    old.install().await.expect("install v1");
    old.activate().await.expect("activate v1");

    let new = InterceptorWorker::new(RouteTable::default(), network, storage.clone())
        .with_generation(Generation::new("inboxdesk-v2"))
        .with_precache(vec![url("/")]);
    new.install().await.expect("install v2");
    let activated = new.activate().await.expect("activate v2");

    assert_eq!(activated.deleted, vec!["inboxdesk-v1".to_string()]);
    assert!(notes.join("important.txt").exists());
    assert_eq!(
        storage.namespaces().await.expect("namespaces"),
        vec!["inboxdesk-v2".to_string()]
    );
}
