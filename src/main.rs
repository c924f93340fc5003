use std::{future::IntoFuture, io::Write, process, sync::Arc};

use futures::channel::oneshot;
use inboxdesk::{
    application::{accounts::AccountService, error::AppError, repos::AccountsRepo},
    cache::{CacheConfig, ComputeCache, InvalidationRouter, MemoryStore, StoreAdapter},
    config::{self, ClientCommand, FetchArgs, FetchMode},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
    interceptor::{
        CacheDirective, HttpNetwork, InterceptedRequest, InterceptedResponse, Interception,
        InterceptorWorker, Network, RequestMode,
    },
};
use reqwest::Method;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Client(args) => match args.command {
            ClientCommand::Install => run_client_install(settings).await,
            ClientCommand::Fetch(fetch) => run_client_fetch(settings, fetch).await,
        },
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_http_state(repositories, &settings);
    serve_http(&settings, state).await
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(
        database_url,
        settings.database.max_connections.get(),
        settings.database.acquire_timeout,
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> HttpState {
    let cache_config = CacheConfig::from(&settings.cache);
    let store = StoreAdapter::new(Arc::new(MemoryStore::new(&cache_config)));
    let repo: Arc<dyn AccountsRepo> = repositories;

    info!(
        enabled = cache_config.enabled,
        ttl_seconds = cache_config.ttl_seconds,
        max_entries = cache_config.max_entries,
        "compute cache configured"
    );

    let accounts = AccountService::new(
        repo,
        ComputeCache::new(store.clone(), cache_config.clone()),
        InvalidationRouter::new(store, cache_config),
    );
    HttpState { accounts }
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let (drain_tx, drain_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = drain_tx.send(());
        })
        .into_future();
    tokio::pin!(server);

    let grace = settings.server.graceful_shutdown;
    let drain_deadline = async move {
        match drain_rx.await {
            Ok(()) => tokio::time::sleep(grace).await,
            Err(_) => futures::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        () = drain_deadline => {
            warn!(grace_seconds = grace.as_secs(), "graceful shutdown timed out");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        futures::future::pending::<()>().await;
    }
    info!("shutdown signal received; draining connections");
}

fn build_worker(settings: &config::Settings) -> Result<InterceptorWorker, AppError> {
    InterceptorWorker::from_settings(&settings.client)
        .map_err(|err| AppError::from(InfraError::client(err.to_string())))
}

async fn run_client_install(settings: config::Settings) -> Result<(), AppError> {
    let worker = build_worker(&settings)?;

    let installed = worker
        .install()
        .await
        .map_err(|err| AppError::from(InfraError::client(err.to_string())))?;
    let activated = worker
        .activate()
        .await
        .map_err(|err| AppError::from(InfraError::client(err.to_string())))?;

    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "generation {}", activated.retained);
    for route in &installed.cached {
        let _ = writeln!(out, "cached   {route}");
    }
    for (route, reason) in &installed.failed {
        let _ = writeln!(out, "failed   {route}: {reason}");
    }
    for namespace in &activated.deleted {
        let _ = writeln!(out, "deleted  {namespace}");
    }
    Ok(())
}

async fn run_client_fetch(settings: config::Settings, args: FetchArgs) -> Result<(), AppError> {
    let worker = build_worker(&settings)?;
    let client_err = |err: &dyn std::fmt::Display| AppError::from(InfraError::client(err.to_string()));

    let resumed = worker.resume().await.map_err(|err| client_err(&err))?;
    if !resumed {
        worker.install().await.map_err(|err| client_err(&err))?;
        worker.activate().await.map_err(|err| client_err(&err))?;
    }

    let url = settings
        .client
        .origin
        .join(&args.url)
        .map_err(|err| client_err(&err))?;
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .map_err(|err| client_err(&err))?;
    let request = InterceptedRequest::new(method, url, request_mode(args.mode));
    let strategy = worker.routes().strategy_for(&request);

    let response = match worker.handle(&request).await {
        Interception::Respond(response) => response,
        Interception::PassThrough => {
            let network =
                HttpNetwork::new(settings.client.origin.clone()).map_err(|err| client_err(&err))?;
            network
                .fetch(&request, CacheDirective::Default)
                .await
                .map_err(|err| client_err(&err))?
        }
    };

    print_response(strategy.as_str(), &response);
    Ok(())
}

fn request_mode(mode: FetchMode) -> RequestMode {
    match mode {
        FetchMode::Navigate => RequestMode::Navigate,
        FetchMode::SameOrigin => RequestMode::SameOrigin,
        FetchMode::Cors => RequestMode::Cors,
        FetchMode::NoCors => RequestMode::NoCors,
    }
}

fn print_response(strategy: &str, response: &InterceptedResponse) {
    let mut out = std::io::stdout().lock();
    let _ = writeln!(
        out,
        "{} ({:?}, strategy {strategy})",
        response.status, response.kind
    );
    for (name, value) in &response.headers {
        let _ = writeln!(out, "{name}: {value}");
    }
    let _ = writeln!(out);
    let _ = out.write_all(&response.body);
    let _ = writeln!(out);
}
