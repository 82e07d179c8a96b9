use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the edgepress binary.
#[derive(Debug, Parser)]
#[command(
    name = "edgepress",
    version,
    about = "Content cache and search service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "EDGEPRESS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Re-embed every stored post into the vector index.
    Reindex(ReindexArgs),
    /// Bump a cache tag version in the shared KV store.
    Invalidate(InvalidateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the public origin used to build purge URLs.
    #[arg(long = "public-base-url", value_name = "URL")]
    pub public_base_url: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Select the KV backend (memory|database).
    #[arg(long = "cache-kv-backend", value_name = "BACKEND")]
    pub cache_kv_backend: Option<String>,

    /// Toggle the tag-versioned KV cache.
    #[arg(
        long = "cache-enable-kv",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enable_kv: Option<bool>,

    /// Toggle the edge response cache.
    #[arg(
        long = "cache-enable-edge",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enable_edge: Option<bool>,

    /// Toggle semantic search.
    #[arg(
        long = "semantic-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub semantic_enabled: Option<bool>,

    /// Override the embedding endpoint.
    #[arg(long = "semantic-endpoint", value_name = "URL")]
    pub semantic_endpoint: Option<String>,

    /// Backfill the vector index before serving.
    #[arg(
        long = "semantic-reindex-on-startup",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub semantic_reindex_on_startup: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ReindexArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the embedding endpoint.
    #[arg(long = "semantic-endpoint", value_name = "URL")]
    pub semantic_endpoint: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Tag whose version is bumped, e.g. `search`.
    #[arg(value_name = "TAG")]
    pub tag: String,
}
