//! KDL schema for config.kdl.
//!
//! ```kdl
//! build-cache-size 15
//! cache-seconds 60
//! host "127.0.0.1"
//! port 8010
//! snapshot "/var/lib/lookout/status.json"
//! log-level "info"
//! ```

use std::path::PathBuf;

use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Settings read from config.kdl. Unset keys fall back to CLI flags or
/// built-in defaults during resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookoutConfig {
    /// Builds kept in memory per builder
    pub build_cache_size: Option<usize>,

    /// Default freshness of responses, in seconds
    pub cache_seconds: Option<u32>,

    pub host: Option<String>,

    pub port: Option<u16>,

    /// JSON status snapshot served by the in-memory store
    pub snapshot: Option<PathBuf>,

    pub log_level: Option<String>,
}

fn first_integer(node: &KdlNode) -> Option<i128> {
    node.entries().first().and_then(|entry| entry.value().as_integer())
}

fn first_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .first()
        .and_then(|entry| entry.value().as_string())
        .map(str::to_string)
}

impl LookoutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config.kdl text.
    pub fn parse(text: &str) -> Result<Self> {
        let doc: KdlDocument = text
            .parse()
            .map_err(|e| Error::Config(format!("invalid KDL: {}", e)))?;
        Self::from_kdl(&doc)
    }

    /// Read the known keys of a KDL document.
    ///
    /// Unknown nodes are ignored; known nodes with a value of the wrong type
    /// or out of range are errors.
    pub fn from_kdl(doc: &KdlDocument) -> Result<Self> {
        let mut config = Self::new();

        if let Some(node) = doc.get("build-cache-size") {
            let size = first_integer(node)
                .and_then(|i| usize::try_from(i).ok())
                .ok_or_else(|| Error::Config("build-cache-size must be a positive integer".into()))?;
            config.build_cache_size = Some(size);
        }

        if let Some(node) = doc.get("cache-seconds") {
            let seconds = first_integer(node)
                .and_then(|i| u32::try_from(i).ok())
                .ok_or_else(|| Error::Config("cache-seconds must be a non-negative integer".into()))?;
            config.cache_seconds = Some(seconds);
        }

        if let Some(node) = doc.get("host") {
            config.host = Some(
                first_string(node).ok_or_else(|| Error::Config("host must be a string".into()))?,
            );
        }

        if let Some(node) = doc.get("port") {
            let port = first_integer(node)
                .and_then(|i| u16::try_from(i).ok())
                .ok_or_else(|| Error::Config("port must be an integer in 1-65535".into()))?;
            config.port = Some(port);
        }

        if let Some(node) = doc.get("snapshot") {
            let path =
                first_string(node).ok_or_else(|| Error::Config("snapshot must be a path".into()))?;
            config.snapshot = Some(PathBuf::from(path));
        }

        if let Some(node) = doc.get("log-level") {
            config.log_level = Some(
                first_string(node)
                    .ok_or_else(|| Error::Config("log-level must be a string".into()))?,
            );
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.build_cache_size == Some(0) {
            return Err(Error::Config("build-cache-size must be at least 1".into()));
        }
        if self.port == Some(0) {
            return Err(Error::Config("port must be an integer in 1-65535".into()));
        }
        if let Some(ref level) = self.log_level {
            if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
                return Err(Error::Config(format!(
                    "log-level must be one of {}, got {}",
                    LOG_LEVELS.join(", "),
                    level
                )));
            }
        }
        Ok(())
    }
}
