use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the inboxdesk binary.
#[derive(Debug, Parser)]
#[command(
    name = "inboxdesk",
    version,
    about = "Inbox dashboard API with response caching"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "INBOXDESK_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API.
    Serve(Box<ServeArgs>),
    /// Operate the client-side interception cache.
    Client(ClientArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
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
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Enable or disable the compute cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the compute cache TTL.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the If-Modified-Since freshness window.
    #[arg(long = "cache-freshness-window-seconds", value_name = "SECONDS")]
    pub cache_freshness_window_seconds: Option<u64>,

    /// Override the in-process store capacity.
    #[arg(long = "cache-max-entries", value_name = "COUNT")]
    pub cache_max_entries: Option<usize>,
}

#[derive(Debug, Args, Clone)]
pub struct ClientArgs {
    #[command(flatten)]
    pub overrides: ClientOverrides,

    #[command(subcommand)]
    pub command: ClientCommand,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ClientOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the origin the client talks to.
    #[arg(long = "client-origin", value_name = "URL")]
    pub origin: Option<String>,

    /// Override the directory holding cache generations.
    #[arg(long = "client-cache-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ClientCommand {
    /// Precache routes for this build's generation and delete older ones.
    Install,
    /// Run one request through the interception cache.
    Fetch(FetchArgs),
}

#[derive(Debug, Args, Clone)]
pub struct FetchArgs {
    /// Absolute URL, or a path resolved against the origin.
    #[arg(value_name = "URL")]
    pub url: String,

    /// HTTP method.
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Request mode, as a browser would report it.
    #[arg(long, value_enum, default_value_t = FetchMode::SameOrigin)]
    pub mode: FetchMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FetchMode {
    Navigate,
    SameOrigin,
    Cors,
    NoCors,
}
