//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::*;

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "inkpost";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_ADMIN_PORT: u16 = 3001;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_DB_IDLE_TIMEOUT_MS: u64 = 45_000;
pub(crate) const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
pub(crate) const DEFAULT_DEDUP_TIMEOUT_MS: u64 = 5000;
pub(crate) const DEFAULT_OBJECT_LIMIT: usize = 512;
pub(crate) const DEFAULT_RESPONSE_LIMIT: usize = 256;
pub(crate) const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";
const DEFAULT_INDEXING_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_INDEXING_ENDPOINT: &str =
    "https://indexing.googleapis.com/v3/urlNotifications:publish";
const DEFAULT_INDEXING_SUBMIT_DELAY_MS: u64 = 100;
const DEFAULT_INDEXING_REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub site: PublicSiteSettings,
    pub indexing: IndexingSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
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
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub retry_reads: bool,
    pub retry_writes: bool,
    pub prefer_ipv4: bool,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enable_object_cache: bool,
    pub enable_response_cache: bool,
    pub default_ttl: Duration,
    pub dedup_timeout: Duration,
    pub object_limit: NonZeroUsize,
    pub response_limit: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct PublicSiteSettings {
    /// Base URL without a trailing slash.
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct IndexingSettings {
    pub credentials: Option<ServiceAccountCredentials>,
    pub token_url: String,
    pub endpoint: String,
    pub submit_delay: Duration,
    pub request_timeout: Duration,
}

#[derive(Clone)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key_pem: String,
}

impl std::fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("client_email", &self.client_email)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
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

    builder = builder.add_source(Environment::with_prefix("INKPOST").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::SeedRoles(args)) => raw.apply_database_override(&args.database),
        Some(Command::SetupAdmin(args)) => raw.apply_database_override(&args.database),
        Some(Command::SubmitIndexing(args)) => raw.apply_database_override(&args.database),
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
    site: RawSiteSettings,
    indexing: RawIndexingSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
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
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.default_ttl_seconds = Some(ttl);
        }
        if let Some(timeout) = overrides.cache_dedup_timeout_ms {
            self.cache.dedup_timeout_ms = Some(timeout);
        }
        if let Some(url) = overrides.site_public_url.as_ref() {
            self.site.public_url = Some(url.clone());
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
            site,
            indexing,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let cache = build_cache_settings(cache)?;
        let site = build_site_settings(site)?;
        let indexing = build_indexing_settings(indexing)?;

        Ok(Self {
            server,
            logging,
            database,
            cache,
            site,
            indexing,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;

    if public_addr == admin_addr {
        return Err(LoadError::invalid(
            "server.admin_port",
            "public and admin listeners must not share an address",
        ));
    }

    Ok(ServerSettings {
        public_addr,
        admin_addr,
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
    let url = non_blank(database.url);

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    let connect_timeout = positive_millis(
        database
            .connect_timeout_ms
            .unwrap_or(DEFAULT_DB_CONNECT_TIMEOUT_MS),
        "database.connect_timeout_ms",
    )?;
    let idle_timeout = positive_millis(
        database.idle_timeout_ms.unwrap_or(DEFAULT_DB_IDLE_TIMEOUT_MS),
        "database.idle_timeout_ms",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
        connect_timeout,
        idle_timeout,
        retry_reads: database.retry_reads.unwrap_or(true),
        retry_writes: database.retry_writes.unwrap_or(true),
        prefer_ipv4: database.prefer_ipv4.unwrap_or(true),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl_secs = cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.default_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let dedup_timeout = positive_millis(
        cache.dedup_timeout_ms.unwrap_or(DEFAULT_DEDUP_TIMEOUT_MS),
        "cache.dedup_timeout_ms",
    )?;

    let object_limit = NonZeroUsize::new(cache.object_limit.unwrap_or(DEFAULT_OBJECT_LIMIT))
        .ok_or_else(|| LoadError::invalid("cache.object_limit", "must be greater than zero"))?;
    let response_limit = NonZeroUsize::new(cache.response_limit.unwrap_or(DEFAULT_RESPONSE_LIMIT))
        .ok_or_else(|| LoadError::invalid("cache.response_limit", "must be greater than zero"))?;

    Ok(CacheSettings {
        enable_object_cache: cache.enable_object_cache.unwrap_or(true),
        enable_response_cache: cache.enable_response_cache.unwrap_or(true),
        default_ttl: Duration::from_secs(ttl_secs),
        dedup_timeout,
        object_limit,
        response_limit,
    })
}

fn build_site_settings(site: RawSiteSettings) -> Result<PublicSiteSettings, LoadError> {
    let public_url = match non_blank(site.public_url) {
        Some(url) => {
            validate_http_url(&url).map_err(|reason| LoadError::invalid("site.public_url", reason))?;
            url.trim_end_matches('/').to_string()
        }
        None => DEFAULT_PUBLIC_URL.to_string(),
    };

    Ok(PublicSiteSettings { public_url })
}

fn build_indexing_settings(indexing: RawIndexingSettings) -> Result<IndexingSettings, LoadError> {
    let client_email = non_blank(indexing.client_email);
    // Keys pasted into env vars usually carry literal `\n` sequences.
    let private_key = non_blank(indexing.private_key).map(|key| key.replace("\\n", "\n"));

    let credentials = match (client_email, private_key) {
        (Some(client_email), Some(private_key_pem)) => Some(ServiceAccountCredentials {
            client_email,
            private_key_pem,
        }),
        (None, None) => None,
        (Some(_), None) => {
            return Err(LoadError::invalid(
                "indexing.private_key",
                "required when indexing.client_email is set",
            ));
        }
        (None, Some(_)) => {
            return Err(LoadError::invalid(
                "indexing.client_email",
                "required when indexing.private_key is set",
            ));
        }
    };

    let token_url = non_blank(indexing.token_url)
        .unwrap_or_else(|| DEFAULT_INDEXING_TOKEN_URL.to_string());
    validate_http_url(&token_url)
        .map_err(|reason| LoadError::invalid("indexing.token_url", reason))?;

    let endpoint = non_blank(indexing.endpoint)
        .unwrap_or_else(|| DEFAULT_INDEXING_ENDPOINT.to_string());
    validate_http_url(&endpoint)
        .map_err(|reason| LoadError::invalid("indexing.endpoint", reason))?;

    let request_timeout = positive_millis(
        indexing
            .request_timeout_ms
            .unwrap_or(DEFAULT_INDEXING_REQUEST_TIMEOUT_MS),
        "indexing.request_timeout_ms",
    )?;

    Ok(IndexingSettings {
        credentials,
        token_url,
        endpoint,
        submit_delay: Duration::from_millis(
            indexing
                .submit_delay_ms
                .unwrap_or(DEFAULT_INDEXING_SUBMIT_DELAY_MS),
        ),
        request_timeout,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
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
    connect_timeout_ms: Option<u64>,
    idle_timeout_ms: Option<u64>,
    retry_reads: Option<bool>,
    retry_writes: Option<bool>,
    prefer_ipv4: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_object_cache: Option<bool>,
    enable_response_cache: Option<bool>,
    default_ttl_seconds: Option<u64>,
    dedup_timeout_ms: Option<u64>,
    object_limit: Option<usize>,
    response_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    public_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIndexingSettings {
    client_email: Option<String>,
    private_key: Option<String>,
    token_url: Option<String>,
    endpoint: Option<String>,
    submit_delay_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
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

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

fn validate_http_url(value: &str) -> Result<(), String> {
    let parsed = Url::parse(value).map_err(|err| format!("invalid URL `{value}`: {err}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported URL scheme `{other}`")),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
