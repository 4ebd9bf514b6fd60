use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the plaudit binary.
#[derive(Debug, Parser)]
#[command(
    name = "plaudit",
    version,
    about = "Like counters served from a cache and reconciled against Postgres"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PLAUDIT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run migrations and the periodic reconciler until interrupted.
    Serve(Box<ServeArgs>),
    /// Run one reconciliation pass and exit.
    Reconcile(ReconcileArgs),
    /// Print like counts for the given items.
    Count(CountArgs),
    /// Print the most liked items.
    Top(TopArgs),
    /// Flip the like state of an (item, actor) pair.
    Toggle(ToggleArgs),
    /// Drop the cached counter and ranking entry of an item.
    Invalidate(InvalidateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ConnectionOverrides {
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

    /// Override the cache backend (redis|memory).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the Redis connection URL.
    #[arg(long = "redis-url", value_name = "URL")]
    pub redis_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub connection: ConnectionOverrides,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the per-call cache timeout.
    #[arg(long = "cache-timeout-ms", value_name = "MILLISECONDS")]
    pub cache_timeout_ms: Option<u64>,

    /// Override the reconciliation period.
    #[arg(long = "reconcile-interval-seconds", value_name = "SECONDS")]
    pub reconcile_interval_seconds: Option<u64>,

    /// Enable or disable the periodic reconciler.
    #[arg(
        long = "reconciler-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub reconciler_enabled: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub connection: ConnectionOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct CountArgs {
    #[command(flatten)]
    pub connection: ConnectionOverrides,

    /// Item ids to look up.
    #[arg(value_name = "ITEM", required = true, allow_negative_numbers = true)]
    pub items: Vec<i64>,
}

#[derive(Debug, Args, Clone)]
pub struct TopArgs {
    #[command(flatten)]
    pub connection: ConnectionOverrides,

    /// Number of items to print.
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Args, Clone)]
pub struct ToggleArgs {
    #[command(flatten)]
    pub connection: ConnectionOverrides,

    #[arg(long, value_name = "ITEM", allow_negative_numbers = true)]
    pub item: i64,

    #[arg(long, value_name = "ACTOR", allow_negative_numbers = true)]
    pub actor: i64,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidateArgs {
    #[command(flatten)]
    pub connection: ConnectionOverrides,

    #[arg(value_name = "ITEM", allow_negative_numbers = true)]
    pub item: i64,
}

impl Command {
    /// Connection overrides shared by every command.
    pub fn connection(&self) -> &ConnectionOverrides {
        match self {
            Command::Serve(args) => &args.overrides.connection,
            Command::Reconcile(args) => &args.connection,
            Command::Count(args) => &args.connection,
            Command::Top(args) => &args.connection,
            Command::Toggle(args) => &args.connection,
            Command::Invalidate(args) => &args.connection,
        }
    }
}
