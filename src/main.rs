use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use pagecache::{
    application::{
        content::{ContentRepository, ContentService},
        error::AppError,
        render::PageRenderer,
    },
    cache::{
        CacheBackend, CacheFlusher, EntryStore, EventQueue, FragmentCache, InvalidationTrigger,
        MemoryBackend, PageCacheState, RequestCachePipeline, SystemClock,
    },
    config,
    infra::{
        error::InfraError,
        http::{self, AdminState, PublicState},
        telemetry,
    },
};
use tokio::{net::TcpListener, sync::watch, task::JoinHandle, try_join};
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
    }
}

struct ApplicationContext {
    public_state: PublicState,
    admin_state: AdminState,
    cache_state: Option<PageCacheState>,
    flusher: Arc<CacheFlusher>,
}

fn build_application_context(settings: &config::Settings) -> ApplicationContext {
    let cache_config = settings.cache.clone();

    let backend: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new(&cache_config));
    let store = Arc::new(EntryStore::new(
        backend,
        cache_config.context,
        Arc::new(SystemClock),
    ));
    let flusher = Arc::new(CacheFlusher::new(
        store.clone(),
        Arc::new(EventQueue::new()),
        cache_config.flush_batch_limit_non_zero(),
    ));
    let trigger = Arc::new(InvalidationTrigger::new(
        cache_config.clone(),
        flusher.clone(),
    ));

    let repo = Arc::new(ContentRepository::seeded());
    let content = Arc::new(ContentService::new(repo.clone(), trigger.clone()));
    let renderer = Arc::new(PageRenderer::new(repo, FragmentCache::new(store.clone())));

    let cache_state = cache_config.enabled.then(|| {
        PageCacheState::new(Arc::new(RequestCachePipeline::new(
            cache_config.clone(),
            store,
        )))
    });

    ApplicationContext {
        public_state: PublicState { renderer },
        admin_state: AdminState { content, trigger },
        cache_state,
        flusher,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings);

    info!(
        enabled = settings.cache.enabled,
        max_public_cache_time = settings.cache.max_public_cache_time,
        flush_mode = ?settings.cache.flush_mode,
        "Page cache configured"
    );

    let flush_handle = settings
        .cache
        .enabled
        .then(|| spawn_auto_flush(app.flusher.clone(), settings.cache.auto_flush_interval_ms));

    let result = serve_http(&settings, app.public_state, app.admin_state, app.cache_state).await;

    if let Some(handle) = flush_handle {
        handle.abort();
        let _ = handle.await;
    }
    // Changes queued after the last tick.
    app.flusher.flush_pending().await;

    result
}

fn spawn_auto_flush(flusher: Arc<CacheFlusher>, interval_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            flusher.flush_pending().await;
        }
    })
}

async fn serve_http(
    settings: &config::Settings,
    public_state: PublicState,
    admin_state: AdminState,
    cache_state: Option<PageCacheState>,
) -> Result<(), AppError> {
    let public_router = http::build_public_router(public_state, cache_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = bind("public", settings.server.public_addr).await?;
    let admin_listener = bind("admin", settings.server.admin_addr).await?;
    info!(
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "Listeners bound"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(shutdown_requested(shutdown_rx.clone()));
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(shutdown_requested(shutdown_rx));

    let servers = async { try_join!(public_server.into_future(), admin_server.into_future()) };
    tokio::pin!(servers);

    let result = tokio::select! {
        result = &mut servers => result,
        () = ctrl_c() => {
            info!("Shutdown requested, draining connections");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(settings.server.graceful_shutdown, &mut servers).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        timeout_secs = settings.server.graceful_shutdown.as_secs(),
                        "Graceful shutdown timed out"
                    );
                    Ok(((), ()))
                }
            }
        }
    };

    result
        .map(|_| ())
        .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn bind(listener: &'static str, addr: std::net::SocketAddr) -> Result<TcpListener, AppError> {
    TcpListener::bind(addr).await.map_err(|source| {
        AppError::from(InfraError::Bind {
            listener,
            addr,
            source,
        })
    })
}

async fn shutdown_requested(mut rx: watch::Receiver<()>) {
    let _ = rx.changed().await;
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
