//! Precedence resolution for settings.
//!
//! Per key, highest first:
//! 1. CLI flags (and their environment variables)
//! 2. config.kdl (`--config <path>` or `~/.config/lookout/config.kdl`)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::schema::LookoutConfig;
use crate::Result;

pub const DEFAULT_BUILD_CACHE_SIZE: usize = 15;
pub const DEFAULT_CACHE_SECONDS: u32 = 60;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8010;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    CliFlag,
    /// config.kdl at the given path
    File(PathBuf),
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::File(path) => write!(f, "file:{}", path.display()),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// CLI overrides for settings resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub build_cache_size: Option<usize>,
    pub cache_seconds: Option<u32>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub snapshot: Option<PathBuf>,
}

/// Every setting with its source.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSettings {
    pub build_cache_size: Resolved<usize>,
    pub cache_seconds: Resolved<u32>,
    pub host: Resolved<String>,
    pub port: Resolved<u16>,
    pub snapshot: Option<Resolved<PathBuf>>,
    pub log_level: Resolved<String>,
    /// The config file consulted, whether or not it existed
    pub config_path: Option<PathBuf>,
}

/// `~/.config/lookout/config.kdl`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lookout").join("config.kdl"))
}

/// Load config.kdl. A missing file yields an empty config.
pub fn load_config(path: &Path) -> Result<LookoutConfig> {
    if !path.exists() {
        return Ok(LookoutConfig::default());
    }
    let text = std::fs::read_to_string(path)?;
    LookoutConfig::parse(&text)
}

fn pick<T>(cli: Option<T>, file: Option<T>, default: T, path: Option<&Path>) -> Resolved<T> {
    match (cli, file) {
        (Some(value), _) => Resolved::new(value, ValueSource::CliFlag),
        (None, Some(value)) => Resolved::new(value, file_source(path)),
        (None, None) => Resolved::new(default, ValueSource::Default),
    }
}

fn file_source(path: Option<&Path>) -> ValueSource {
    ValueSource::File(path.map(Path::to_path_buf).unwrap_or_default())
}

/// Resolve settings from `overrides`, the config file at `config_path`
/// (falling back to the default location) and built-in defaults.
pub fn resolve_settings(
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ResolvedSettings> {
    let path = config_path.map(Path::to_path_buf).or_else(default_config_path);
    let file = match path {
        Some(ref path) => load_config(path)?,
        None => LookoutConfig::default(),
    };
    let source_path = path.as_deref();

    let snapshot = match (overrides.snapshot.clone(), file.snapshot) {
        (Some(path), _) => Some(Resolved::new(path, ValueSource::CliFlag)),
        (None, Some(path)) => Some(Resolved::new(path, file_source(source_path))),
        (None, None) => None,
    };

    Ok(ResolvedSettings {
        build_cache_size: pick(
            overrides.build_cache_size,
            file.build_cache_size,
            DEFAULT_BUILD_CACHE_SIZE,
            source_path,
        ),
        cache_seconds: pick(
            overrides.cache_seconds,
            file.cache_seconds,
            DEFAULT_CACHE_SECONDS,
            source_path,
        ),
        host: pick(
            overrides.host.clone(),
            file.host,
            DEFAULT_HOST.to_string(),
            source_path,
        ),
        port: pick(overrides.port, file.port, DEFAULT_PORT, source_path),
        snapshot,
        log_level: pick(
            None,
            file.log_level,
            DEFAULT_LOG_LEVEL.to_string(),
            source_path,
        ),
        config_path: path,
    })
}
