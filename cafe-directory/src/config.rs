use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

pub const SECRET_ENV: &str = "CAFE_DIRECTORY_SECRET_KEY";
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Parser)]
#[command(
    name = "cafe-directory",
    version,
    about = "Cafe directory web service with accounts and session login"
)]
pub struct Cli {
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    #[arg(long, short = 'd', value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// Session lifetime, e.g. `24h` or `30m`.
    #[arg(long, value_name = "DURATION")]
    pub session_ttl: Option<String>,

    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Routes that can be put behind the admin-only guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardedRoute {
    Add,
    UpdatePrice,
    ReportClosed,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub database: PathBuf,
    pub secret_key: Option<String>,
    pub session_ttl: Duration,
    pub admin_only_routes: BTreeSet<GuardedRoute>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config in {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid session ttl {value:?}: {source}")]
    SessionTtl {
        value: String,
        source: humantime::DurationError,
    },
    #[error("secret key must be at least {MIN_SECRET_LEN} bytes, got {0}")]
    ShortSecret(usize),
    #[error("env var {0} is not valid unicode")]
    NonUnicodeEnv(&'static str),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind: Option<SocketAddr>,
    database: Option<PathBuf>,
    secret_key: Option<String>,
    session_ttl: Option<String>,
    #[serde(default)]
    admin_only_routes: BTreeSet<GuardedRoute>,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let from_file = read_file_config(cli.config.as_deref())?;
        let env_secret = read_env(SECRET_ENV)?;

        let bind = cli
            .bind
            .or(from_file.bind)
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 5000)));
        let database = cli
            .database
            .or(from_file.database)
            .unwrap_or_else(|| PathBuf::from("cafes.db"));
        let secret_key = env_secret.or(from_file.secret_key);
        if let Some(secret) = &secret_key {
            if secret.len() < MIN_SECRET_LEN {
                return Err(ConfigError::ShortSecret(secret.len()));
            }
        }
        let session_ttl = match cli.session_ttl.or(from_file.session_ttl) {
            Some(raw) => parse_ttl(&raw)?,
            None => Duration::from_secs(24 * 3600),
        };

        Ok(Self {
            bind,
            database,
            secret_key,
            session_ttl,
            admin_only_routes: from_file.admin_only_routes,
        })
    }
}

fn read_file_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn read_env(key: &'static str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::NonUnicodeEnv(key)),
    }
}

/// Zero-length lifetimes are bumped to one second.
fn parse_ttl(raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim())
        .map(|ttl| ttl.max(Duration::from_secs(1)))
        .map_err(|source| ConfigError::SessionTtl {
            value: String::from(raw),
            source,
        })
}
