//! CLI argument definitions for Lookout.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ConfigOverrides;

/// Version string with the commit and build time baked in by build.rs.
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("LOOKOUT_GIT_COMMIT"),
    " ",
    env!("LOOKOUT_BUILD_TIMESTAMP"),
    ")"
);

/// Lookout - path-addressable JSON status for a build master.
///
/// Serve the status tree over HTTP with `lookout serve`, or run a single
/// query against a snapshot with `lookout query builders/demo/builds/-1`.
#[derive(Parser, Debug)]
#[command(name = "lookout")]
#[command(author, version = VERSION, about = "Path-addressable JSON status for a build master", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/lookout/config.kdl
    #[arg(short = 'c', long = "config", global = true, env = "LOOKOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long = "log-json", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the status comes from and how it is cached.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// JSON status snapshot to load
    #[arg(long, env = "LOOKOUT_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Builds kept in memory per builder
    #[arg(long)]
    pub build_cache_size: Option<usize>,

    /// Default response freshness in seconds
    #[arg(long)]
    pub cache_seconds: Option<u32>,
}

impl StoreArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            build_cache_size: self.build_cache_size,
            cache_seconds: self.cache_seconds,
            snapshot: self.snapshot.clone(),
            ..Default::default()
        }
    }
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the status tree over HTTP under /json
    #[cfg(feature = "server")]
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Run one query in-process and print the response body
    Query {
        /// Path below /json, e.g. builders/demo/builds/-1
        path: String,

        /// Query parameter as key=value (repeatable), e.g. -P select=slaves
        #[arg(short = 'P', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Print the resolved configuration and where each value came from
    Config {
        #[command(flatten)]
        store: StoreArgs,
    },
}

/// Parse a `key=value` query parameter. The value may be empty.
pub fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("missing parameter name in '{}'", raw)),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected key=value, got '{}'", raw)),
    }
}
