//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "scrigno";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_STORE_PATH: &str = "db/content.redb";
const DEFAULT_FILES_DIR: &str = "files";
const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_PURGE_SECS: u64 = 600;

/// Command-line arguments for the Scrigno binary.
#[derive(Debug, Parser)]
#[command(name = "scrigno", version, about = "Scrigno content server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SCRIGNO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

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

    /// Override the store database file path.
    #[arg(long = "store-path", value_name = "PATH")]
    pub store_path: Option<PathBuf>,

    /// Override the attachment files directory.
    #[arg(long = "files-directory", value_name = "PATH")]
    pub files_directory: Option<PathBuf>,

    /// Override the served content types (comma-separated).
    #[arg(long = "content-types", value_name = "TYPES")]
    pub content_types: Option<String>,

    /// Override the served languages (comma-separated).
    #[arg(long = "content-languages", value_name = "LANGS")]
    pub content_languages: Option<String>,

    /// Override the response cache entry lifetime.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the response cache purge cadence.
    #[arg(long = "cache-purge-seconds", value_name = "SECONDS")]
    pub cache_purge_seconds: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub store: StoreSettings,
    pub attachments: AttachmentSettings,
    pub content: ContentSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
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
pub struct StoreSettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AttachmentSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub types: Vec<String>,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub purge_interval: Duration,
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

    builder = builder.add_source(Environment::with_prefix("SCRIGNO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    store: RawStoreSettings,
    attachments: RawAttachmentSettings,
    content: RawContentSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(path) = overrides.store_path.as_ref() {
            self.store.path = Some(path.clone());
        }
        if let Some(directory) = overrides.files_directory.as_ref() {
            self.attachments.directory = Some(directory.clone());
        }
        if let Some(types) = overrides.content_types.as_ref() {
            self.content.types = Some(split_csv(types));
        }
        if let Some(languages) = overrides.content_languages.as_ref() {
            self.content.languages = Some(split_csv(languages));
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(purge) = overrides.cache_purge_seconds {
            self.cache.purge_seconds = Some(purge);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            store,
            attachments,
            content,
            cache,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let store = build_store_settings(store)?;
        let attachments = build_attachment_settings(attachments)?;
        let content = build_content_settings(content)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self {
            server,
            logging,
            store,
            attachments,
            content,
            cache,
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

    Ok(ServerSettings { addr })
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

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let path = store
        .path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid("store.path", "path must not be empty"));
    }

    Ok(StoreSettings { path })
}

fn build_attachment_settings(
    attachments: RawAttachmentSettings,
) -> Result<AttachmentSettings, LoadError> {
    let directory = attachments
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FILES_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "attachments.directory",
            "path must not be empty",
        ));
    }

    Ok(AttachmentSettings { directory })
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let types = content.types.unwrap_or_default();
    let types: Vec<String> = types
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if types.is_empty() {
        return Err(LoadError::invalid(
            "content.types",
            "at least one content type must be configured",
        ));
    }

    let languages = content
        .languages
        .unwrap_or_else(|| vec![DEFAULT_LANGUAGE.to_string()]);
    let languages: Vec<String> = languages
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if languages.is_empty() {
        return Err(LoadError::invalid(
            "content.languages",
            "at least one language must be configured",
        ));
    }

    Ok(ContentSettings { types, languages })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl_seconds = cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            "must be greater than zero",
        ));
    }

    let purge_seconds = cache.purge_seconds.unwrap_or(DEFAULT_CACHE_PURGE_SECS);
    if purge_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.purge_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        ttl: Duration::from_secs(ttl_seconds),
        purge_interval: Duration::from_secs(purge_seconds),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAttachmentSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    types: Option<Vec<String>>,
    languages: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    ttl_seconds: Option<u64>,
    purge_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_types() -> RawSettings {
        let mut raw = RawSettings::default();
        raw.content.types = Some(vec!["article".to_string()]);
        raw
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = raw_with_types();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = Overrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn content_types_are_required() {
        let raw = RawSettings::default();
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid {
                key: "content.types",
                ..
            })
        ));
    }

    #[test]
    fn languages_default_to_english() {
        let raw = raw_with_types();
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.content.languages, vec!["en".to_string()]);
    }

    #[test]
    fn csv_overrides_split_and_trim() {
        let mut raw = raw_with_types();
        let overrides = Overrides {
            content_types: Some("article, page ,".to_string()),
            content_languages: Some("en,it".to_string()),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(
            settings.content.types,
            vec!["article".to_string(), "page".to_string()]
        );
        assert_eq!(
            settings.content.languages,
            vec!["en".to_string(), "it".to_string()]
        );
    }

    #[test]
    fn cache_defaults_apply() {
        let raw = raw_with_types();
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.cache.ttl, Duration::from_secs(300));
        assert_eq!(settings.cache.purge_interval, Duration::from_secs(600));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let mut raw = raw_with_types();
        raw.cache.ttl_seconds = Some(0);
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid {
                key: "cache.ttl_seconds",
                ..
            })
        ));
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = raw_with_types();
        let overrides = Overrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }
}
