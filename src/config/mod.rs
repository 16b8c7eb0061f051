//! Configuration for Lookout.
//!
//! Settings live in a KDL file, `~/.config/lookout/config.kdl` by default:
//! - `build-cache-size` - Builds kept in memory per builder
//! - `cache-seconds` - Default response freshness
//! - `host` / `port` - HTTP listen address
//! - `snapshot` - JSON status snapshot to serve
//! - `log-level` - Default tracing level
//!
//! ## Precedence
//!
//! CLI flag > config file > defaults. Use [`resolve_settings`] to resolve
//! all of them with their sources.

pub mod resolver;
pub mod schema;

pub use resolver::{
    ConfigOverrides, DEFAULT_BUILD_CACHE_SIZE, DEFAULT_CACHE_SECONDS, DEFAULT_HOST,
    DEFAULT_LOG_LEVEL, DEFAULT_PORT, Resolved, ResolvedSettings, ValueSource,
    default_config_path, load_config, resolve_settings,
};
pub use schema::LookoutConfig;
