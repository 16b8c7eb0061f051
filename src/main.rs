//! Lookout CLI - path-addressable JSON status for a build master.

use std::process;
use std::sync::Arc;

use clap::Parser;
use lookout::cli::{Cli, Commands};
use lookout::config::{ConfigOverrides, ResolvedSettings, resolve_settings};
use lookout::query::{self, QueryConfig};
use lookout::storage::{MemoryStore, Snapshot};
use lookout::tree::{StatusTree, TreeSettings};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable overriding the configured log filter.
const LOG_ENV: &str = "LOOKOUT_LOG";

fn main() {
    let cli = Cli::parse();

    let overrides = match cli.command {
        #[cfg(feature = "server")]
        Commands::Serve {
            ref host,
            port,
            ref store,
        } => ConfigOverrides {
            host: host.clone(),
            port,
            ..store.overrides()
        },
        Commands::Query { ref store, .. } | Commands::Config { ref store } => store.overrides(),
    };

    let settings = match resolve_settings(cli.config.as_deref(), &overrides) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
            process::exit(1);
        }
    };
    init_tracing(&settings.log_level.value, cli.log_json);
    // Logged here: settings are resolved before the subscriber exists.
    tracing::debug!(
        config = ?settings.config_path,
        config_found = settings.config_path.as_deref().is_some_and(|p| p.exists()),
        log_level = %settings.log_level.value,
        "settings resolved"
    );

    if let Err(e) = run_command(cli.command, &settings) {
        eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        process::exit(1);
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn run_command(command: Commands, settings: &ResolvedSettings) -> Result<(), lookout::Error> {
    match command {
        #[cfg(feature = "server")]
        Commands::Serve { .. } => run_server(settings),
        Commands::Query { path, params, .. } => run_query(&path, &params, settings),
        Commands::Config { .. } => {
            println!("{}", serde_json::to_string_pretty(settings)?);
            Ok(())
        }
    }
}

fn load_store(settings: &ResolvedSettings) -> Result<MemoryStore, lookout::Error> {
    let cache_size = settings.build_cache_size.value;
    match settings.snapshot {
        Some(ref snapshot) => MemoryStore::from_path(&snapshot.value, cache_size),
        None => {
            tracing::warn!("no snapshot configured, serving an empty master");
            Ok(MemoryStore::new(Snapshot::default(), cache_size))
        }
    }
}

fn tree_settings(settings: &ResolvedSettings) -> TreeSettings {
    TreeSettings {
        cache_seconds: settings.cache_seconds.value,
    }
}

/// Run one request in-process and print the body.
fn run_query(
    path: &str,
    params: &[(String, String)],
    settings: &ResolvedSettings,
) -> Result<(), lookout::Error> {
    let store = load_store(settings)?;
    let config = QueryConfig::from_pairs(params);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let response = runtime.block_on(async {
        let tree = StatusTree::build(Arc::new(store), tree_settings(settings)).await?;
        query::execute(&tree, path, &config).await
    })?;

    println!("{}", response.body);
    Ok(())
}

#[cfg(feature = "server")]
fn run_server(settings: &ResolvedSettings) -> Result<(), lookout::Error> {
    let store = load_store(settings)?;
    let host = settings.host.value.clone();
    let port = settings.port.value;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let tree = StatusTree::build(Arc::new(store), tree_settings(settings)).await?;
            lookout::server::start_server(tree, &host, port)
                .await
                .map_err(|e| lookout::Error::Other(format!("server error: {}", e)))
        })
}
