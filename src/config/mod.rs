//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    CliArgs, Command, DatabaseOverride, InvalidateArgs, ReindexArgs, ServeArgs, ServeOverrides,
};

use std::{fmt, net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::search::{DEFAULT_INDEX_LIMIT, EMBEDDING_MODEL};
use crate::cache::CacheConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "edgepress";
const ENV_PREFIX: &str = "EDGEPRESS";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DATABASE_URL: &str = "sqlite://edgepress.db";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const MAX_INDEX_LIMIT: u32 = 5_000;
const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_SEMANTIC_TIMEOUT_MS: u64 = 5_000;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub search: SearchSettings,
    pub semantic: SemanticSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    /// Origin of public URLs, without a trailing slash.
    pub public_base_url: String,
    /// Bearer token for the content-events hook. Unset leaves the hook unmounted.
    pub internal_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: NonZeroU32,
}

/// Where the tag-versioned cache keeps its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local; tag versions are not shared with other processes.
    Memory,
    /// SQLite tables next to the content.
    Database,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "database" | "db" | "sqlite" => Ok(Self::Database),
            other => Err(format!("unknown backend `{other}` (expected memory|database)")),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Database => "database",
        })
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enable_kv_cache: bool,
    pub kv_backend: StoreBackend,
    pub enable_edge_cache: bool,
    pub edge_capacity: usize,
    pub edge_ttl_seconds: u64,
    pub edge_body_limit_bytes: usize,
    pub store_timeout_ms: u64,
    pub search_index_ttl_seconds: u64,
    pub fulltext_ttl_seconds: u64,
    pub detail_ttl_seconds: u64,
    pub listing_ttl_seconds: u64,
    pub listing_page_sizes: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub index_limit: u32,
    pub backend_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SemanticSettings {
    pub enabled: bool,
    pub endpoint: Option<Url>,
    pub api_token: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub reindex_on_startup: bool,
    pub vector_backend: StoreBackend,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cache.listing_page_sizes")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Reindex(args)) => {
            raw.apply_database_override(&args.database);
            if let Some(endpoint) = args.semantic_endpoint.as_ref() {
                raw.semantic.endpoint = Some(endpoint.clone());
            }
        }
        Some(Command::Invalidate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    search: RawSearchSettings,
    semantic: RawSemanticSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(url) = overrides.public_base_url.as_ref() {
            self.server.public_base_url = Some(url.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(backend) = overrides.cache_kv_backend.as_ref() {
            self.cache.kv_backend = Some(backend.clone());
        }
        if let Some(enabled) = overrides.cache_enable_kv {
            self.cache.enable_kv_cache = Some(enabled);
        }
        if let Some(enabled) = overrides.cache_enable_edge {
            self.cache.enable_edge_cache = Some(enabled);
        }
        if let Some(enabled) = overrides.semantic_enabled {
            self.semantic.enabled = Some(enabled);
        }
        if let Some(endpoint) = overrides.semantic_endpoint.as_ref() {
            self.semantic.endpoint = Some(endpoint.clone());
        }
        if let Some(reindex) = overrides.semantic_reindex_on_startup {
            self.semantic.reindex_on_startup = Some(reindex);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            search,
            semantic,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            search: build_search_settings(search)?,
            semantic: build_semantic_settings(semantic)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let public_base_url = match non_empty(server.public_base_url) {
        Some(value) => parse_http_url(&value, "server.public_base_url")?
            .as_str()
            .trim_end_matches('/')
            .to_string(),
        None => format!("http://{addr}"),
    };

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        public_base_url,
        internal_token: non_empty(server.internal_token),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_empty(database.url).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
    if !url.starts_with("sqlite:") {
        return Err(LoadError::invalid(
            "database.url",
            format!("`{url}` is not a sqlite URL"),
        ));
    }

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();

    let kv_backend = match non_empty(cache.kv_backend) {
        Some(value) => StoreBackend::from_str(&value)
            .map_err(|reason| LoadError::invalid("cache.kv_backend", reason))?,
        None => StoreBackend::Database,
    };

    let edge_capacity = cache.edge_capacity.unwrap_or(defaults.edge_capacity);
    if edge_capacity == 0 {
        return Err(LoadError::invalid(
            "cache.edge_capacity",
            "must be greater than zero",
        ));
    }

    let listing_page_sizes = cache
        .listing_page_sizes
        .unwrap_or_else(|| defaults.listing_page_sizes.clone());
    if listing_page_sizes.is_empty() || listing_page_sizes.contains(&0) {
        return Err(LoadError::invalid(
            "cache.listing_page_sizes",
            "must list at least one page size, each greater than zero",
        ));
    }

    Ok(CacheSettings {
        enable_kv_cache: cache.enable_kv_cache.unwrap_or(defaults.enable_kv_cache),
        kv_backend,
        enable_edge_cache: cache.enable_edge_cache.unwrap_or(defaults.enable_edge_cache),
        edge_capacity,
        edge_ttl_seconds: cache.edge_ttl_seconds.unwrap_or(defaults.edge_ttl_seconds),
        edge_body_limit_bytes: cache
            .edge_body_limit_bytes
            .unwrap_or(defaults.edge_body_limit_bytes),
        store_timeout_ms: cache.store_timeout_ms.unwrap_or(defaults.store_timeout_ms),
        search_index_ttl_seconds: cache
            .search_index_ttl_seconds
            .unwrap_or(defaults.search_index_ttl_seconds),
        fulltext_ttl_seconds: cache
            .fulltext_ttl_seconds
            .unwrap_or(defaults.fulltext_ttl_seconds),
        detail_ttl_seconds: cache
            .detail_ttl_seconds
            .unwrap_or(defaults.detail_ttl_seconds),
        listing_ttl_seconds: cache
            .listing_ttl_seconds
            .unwrap_or(defaults.listing_ttl_seconds),
        listing_page_sizes,
    })
}

fn build_search_settings(search: RawSearchSettings) -> Result<SearchSettings, LoadError> {
    let index_limit = search.index_limit.unwrap_or(DEFAULT_INDEX_LIMIT);
    if index_limit == 0 || index_limit > MAX_INDEX_LIMIT {
        return Err(LoadError::invalid(
            "search.index_limit",
            format!("must be between 1 and {MAX_INDEX_LIMIT}"),
        ));
    }

    let timeout_ms = search
        .backend_timeout_ms
        .unwrap_or(DEFAULT_BACKEND_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "search.backend_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(SearchSettings {
        index_limit,
        backend_timeout: Duration::from_millis(timeout_ms),
    })
}

fn build_semantic_settings(semantic: RawSemanticSettings) -> Result<SemanticSettings, LoadError> {
    let enabled = semantic.enabled.unwrap_or(false);
    let endpoint = non_empty(semantic.endpoint)
        .map(|value| parse_http_url(&value, "semantic.endpoint"))
        .transpose()?;
    if enabled && endpoint.is_none() {
        return Err(LoadError::invalid(
            "semantic.endpoint",
            "required when semantic search is enabled",
        ));
    }

    let timeout_ms = semantic.timeout_ms.unwrap_or(DEFAULT_SEMANTIC_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "semantic.timeout_ms",
            "must be greater than zero",
        ));
    }

    let vector_backend = match non_empty(semantic.vector_backend) {
        Some(value) => StoreBackend::from_str(&value)
            .map_err(|reason| LoadError::invalid("semantic.vector_backend", reason))?,
        None => StoreBackend::Database,
    };

    Ok(SemanticSettings {
        enabled,
        endpoint,
        api_token: non_empty(semantic.api_token),
        model: non_empty(semantic.model).unwrap_or_else(|| EMBEDDING_MODEL.to_string()),
        timeout: Duration::from_millis(timeout_ms),
        reindex_on_startup: semantic.reindex_on_startup.unwrap_or(false),
        vector_backend,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    public_base_url: Option<String>,
    internal_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_kv_cache: Option<bool>,
    kv_backend: Option<String>,
    enable_edge_cache: Option<bool>,
    edge_capacity: Option<usize>,
    edge_ttl_seconds: Option<u64>,
    edge_body_limit_bytes: Option<usize>,
    store_timeout_ms: Option<u64>,
    search_index_ttl_seconds: Option<u64>,
    fulltext_ttl_seconds: Option<u64>,
    detail_ttl_seconds: Option<u64>,
    listing_ttl_seconds: Option<u64>,
    listing_page_sizes: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSearchSettings {
    index_limit: Option<u32>,
    backend_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSemanticSettings {
    enabled: Option<bool>,
    endpoint: Option<String>,
    api_token: Option<String>,
    model: Option<String>,
    timeout_ms: Option<u64>,
    reindex_on_startup: Option<bool>,
    vector_backend: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_http_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(value).map_err(|err| LoadError::invalid(key, err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LoadError::invalid(
            key,
            format!("unsupported scheme `{other}`"),
        )),
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
