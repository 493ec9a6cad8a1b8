use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the Inkpost binary.
#[derive(Debug, Parser)]
#[command(name = "inkpost", version, about = "Inkpost blog server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "INKPOST_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public and administrative HTTP services.
    Serve(Box<ServeArgs>),
    /// Create or refresh the built-in roles and their permissions.
    #[command(name = "seed-roles")]
    SeedRoles(SeedRolesArgs),
    /// Seed roles and create (or update) the administrator account.
    #[command(name = "setup-admin")]
    SetupAdmin(SetupAdminArgs),
    /// Notify the search-engine indexing API about published posts.
    #[command(name = "submit-indexing")]
    SubmitIndexing(SubmitIndexingArgs),
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
    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the administrative listener host.
    #[arg(long = "server-admin-host", value_name = "HOST")]
    pub server_admin_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the administrative listener port.
    #[arg(long = "server-admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

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

    /// Override the default cache TTL.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the request deduplication window.
    #[arg(long = "cache-dedup-timeout-ms", value_name = "MILLIS")]
    pub cache_dedup_timeout_ms: Option<u64>,

    /// Override the public base URL used for sitemaps and indexing.
    #[arg(long = "site-public-url", value_name = "URL")]
    pub site_public_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SeedRolesArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SetupAdminArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Administrator email address.
    #[arg(long, env = "ADMIN_EMAIL", value_name = "EMAIL")]
    pub email: Option<String>,

    /// Administrator display name.
    #[arg(long, env = "ADMIN_NAME", value_name = "NAME")]
    pub name: Option<String>,

    /// Administrator password (at least 6 characters).
    #[arg(long, env = "ADMIN_PASSWORD", value_name = "PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Reset the password and role when the administrator already exists.
    #[arg(long = "update-password", action = clap::ArgAction::SetTrue)]
    pub update_password: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SubmitIndexingArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Maximum number of posts to submit.
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<u32>,

    /// Only submit posts updated at or after this RFC 3339 instant (or YYYY-MM-DD date).
    #[arg(long = "updated-since", value_name = "TIMESTAMP")]
    pub updated_since: Option<String>,

    /// List the URLs without calling the indexing API.
    #[arg(long = "dry-run", action = clap::ArgAction::SetTrue)]
    pub dry_run: bool,
}
