use std::{future::IntoFuture, process, sync::Arc};

use edgepress::{
    application::{
        content::CachedContentReader,
        error::AppError,
        repos::{ContentStore, FullTextBackend},
        search::{
            EmbeddingProvider, FullTextSearchEngine, LexicalIndexBuilder, SearchService,
            SemanticSearchEngine, VectorIndex,
        },
    },
    cache::{
        CacheConfig, CacheOrchestrator, EdgeCacheState, EdgeResponseCache, KvStore,
        MemoryKvStore, MemoryResponseStore, TagVersionedCache,
    },
    config::{self, StoreBackend},
    infra::{
        db::{SqliteKvStore, SqliteRepositories, SqliteVectorIndex},
        embeddings::HttpEmbeddingClient,
        error::InfraError,
        http::{self, ContentEventsHook, HttpState},
        telemetry,
        vectors::MemoryVectorIndex,
    },
};
use tokio::sync::Notify;
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
        config::Command::Reindex(_) => run_reindex(settings).await,
        config::Command::Invalidate(args) => run_invalidate(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings)?;

    if settings.semantic.reindex_on_startup {
        match app.semantic.as_ref() {
            Some(semantic) => reindex_all(app.store.as_ref(), semantic).await?,
            None => warn!(
                target = "edgepress::reindex",
                "reindex_on_startup is set but semantic search is disabled"
            ),
        }
    }

    serve_http(&settings, app.http_state).await
}

async fn run_reindex(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    if settings.semantic.vector_backend == StoreBackend::Memory {
        warn!(
            target = "edgepress::reindex",
            "vector backend is in-memory; the backfill is lost when this process exits"
        );
    }

    let app = build_application_context(repositories, &settings)?;
    let semantic = app.semantic.as_ref().ok_or_else(|| {
        AppError::validation("reindex requires semantic search to be configured")
    })?;

    reindex_all(app.store.as_ref(), semantic).await
}

async fn run_invalidate(
    settings: config::Settings,
    args: config::InvalidateArgs,
) -> Result<(), AppError> {
    let tag = args.tag.trim();
    if tag.is_empty() {
        return Err(AppError::validation("tag must not be empty"));
    }
    if settings.cache.kv_backend == StoreBackend::Memory {
        return Err(AppError::validation(
            "invalidate needs the database KV backend; the in-memory store is per process",
        ));
    }

    let repositories = init_repositories(&settings).await?;
    let cache_config = CacheConfig::from(&settings.cache);
    let store: Arc<dyn KvStore> = Arc::new(SqliteKvStore::new(repositories.pool().clone()));
    let cache = TagVersionedCache::new(store, &cache_config);

    cache.invalidate(tag).await;
    let version = cache
        .current_version(tag)
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    info!(target = "edgepress::invalidate", tag, version = %version, "Tag invalidated");
    Ok(())
}

async fn reindex_all(
    store: &dyn ContentStore,
    semantic: &SemanticSearchEngine,
) -> Result<(), AppError> {
    let records = store.all_content().await?;
    info!(
        target = "edgepress::reindex",
        records = records.len(),
        "Starting vector backfill"
    );

    let summary = semantic.reindex(&records).await;
    if summary.failed > 0 {
        warn!(
            target = "edgepress::reindex",
            indexed = summary.indexed,
            failed = summary.failed,
            "Vector backfill finished with failures"
        );
    }
    Ok(())
}

struct ApplicationContext {
    http_state: HttpState,
    store: Arc<dyn ContentStore>,
    semantic: Option<SemanticSearchEngine>,
}

async fn init_repositories(settings: &config::Settings) -> Result<Arc<SqliteRepositories>, AppError> {
    let pool = SqliteRepositories::connect(
        &settings.database.url,
        settings.database.max_connections.get(),
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    SqliteRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(SqliteRepositories::new(pool)))
}

fn build_application_context(
    repositories: Arc<SqliteRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let cache_config = CacheConfig::from(&settings.cache);

    let kv_store: Arc<dyn KvStore> = match settings.cache.kv_backend {
        StoreBackend::Memory => Arc::new(MemoryKvStore::new()),
        StoreBackend::Database => Arc::new(SqliteKvStore::new(repositories.pool().clone())),
    };
    let kv_cache = TagVersionedCache::new(kv_store, &cache_config);

    let store: Arc<dyn ContentStore> = repositories.clone();
    let fulltext_backend: Arc<dyn FullTextBackend> = repositories.clone();

    let semantic = build_semantic_engine(&repositories, settings)?;

    let lexical = LexicalIndexBuilder::new(
        store.clone(),
        kv_cache.clone(),
        &cache_config,
        settings.search.backend_timeout,
    );
    let fulltext = FullTextSearchEngine::new(
        fulltext_backend,
        kv_cache.clone(),
        &cache_config,
        settings.search.backend_timeout,
    );
    let search = SearchService::new(
        lexical,
        fulltext,
        semantic.clone(),
        settings.search.index_limit,
    );

    let edge = cache_config.enable_edge_cache.then(|| {
        let response_store = Arc::new(MemoryResponseStore::new(
            cache_config.edge_capacity_non_zero(),
        ));
        EdgeCacheState {
            enabled: true,
            ttl: std::time::Duration::from_secs(cache_config.edge_ttl_seconds),
            cache: EdgeResponseCache::new(response_store, &cache_config),
        }
    });

    let content = CachedContentReader::new(store.clone(), kv_cache.clone(), &cache_config);

    let content_events = match settings.server.internal_token.as_deref() {
        Some(token) => Some(ContentEventsHook::new(
            CacheOrchestrator::new(
                kv_cache,
                edge.as_ref().map(|state| state.cache.clone()),
                semantic.clone(),
                &settings.server.public_base_url,
                &cache_config,
            ),
            token,
        )),
        None => {
            info!(
                target = "edgepress::startup",
                "server.internal_token is unset; content events are not accepted and \
                 cached views refresh only by TTL"
            );
            None
        }
    };

    let listing_page_size = cache_config
        .listing_page_sizes
        .first()
        .copied()
        .unwrap_or(10);

    info!(
        target = "edgepress::startup",
        kv_backend = %settings.cache.kv_backend,
        kv_cache = cache_config.enable_kv_cache,
        edge_cache = cache_config.enable_edge_cache,
        semantic = semantic.is_some(),
        content_events = content_events.is_some(),
        "Application context ready"
    );

    Ok(ApplicationContext {
        http_state: HttpState {
            content: Arc::new(content),
            search: Arc::new(search),
            db: repositories,
            edge,
            listing_page_size,
            content_events,
        },
        store,
        semantic,
    })
}

fn build_semantic_engine(
    repositories: &SqliteRepositories,
    settings: &config::Settings,
) -> Result<Option<SemanticSearchEngine>, AppError> {
    let semantic = &settings.semantic;
    let Some(endpoint) = semantic.endpoint.as_ref().filter(|_| semantic.enabled) else {
        return Ok(None);
    };

    let client = HttpEmbeddingClient::new(
        endpoint.as_str(),
        semantic.model.clone(),
        semantic.api_token.clone(),
        semantic.timeout,
    )?;
    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(client);
    let index: Arc<dyn VectorIndex> = match semantic.vector_backend {
        StoreBackend::Memory => Arc::new(MemoryVectorIndex::new()),
        StoreBackend::Database => Arc::new(SqliteVectorIndex::new(repositories.pool().clone())),
    };

    Ok(Some(SemanticSearchEngine::new(
        embeddings,
        index,
        semantic.timeout,
    )))
}

async fn serve_http(settings: &config::Settings, http_state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(http_state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "edgepress::serve",
        addr = %settings.server.addr,
        public_base_url = %settings.server.public_base_url,
        "Listening"
    );

    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.notified().await }
    });
    let mut server = tokio::spawn(server.into_future());

    tokio::select! {
        joined = &mut server => return flatten_server_result(joined),
        _ = shutdown_signal() => {}
    }

    info!(
        target = "edgepress::serve",
        grace_seconds = settings.server.graceful_shutdown.as_secs(),
        "Shutdown signal received, draining connections"
    );
    shutdown.notify_one();

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(joined) => flatten_server_result(joined),
        Err(_) => {
            warn!(
                target = "edgepress::serve",
                "Graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

fn flatten_server_result(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    joined
        .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target = "edgepress::serve", error = %err, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
