//! Request handling: query parameters, selections, the pending queue and
//! output formatting.
//!
//! [`execute`] runs one request end to end against a [`StatusTree`].

pub mod output;
pub mod queue;
pub mod select;

use std::collections::HashMap;

use crate::Result;
use crate::storage::{HistoryFilter, StatusStore};
use crate::tree::{NodeKind, StatusTree, resolve};

pub use output::{CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT, OutputOptions};
pub use queue::{PendingBuildEntry, QueueScope, pending_builds};
pub use select::compose;

/// Everything a request asked for through its query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Sub-paths to compose; `None` renders the addressed node directly
    pub select: Option<Vec<String>>,
    pub as_text: bool,
    pub compact: bool,
    pub filter: bool,
    pub callback: Option<String>,
    /// Cap on historical build listings (`numbuilds` / `max`)
    pub max_builds: Option<usize>,
    pub history: HistoryFilter,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            select: None,
            as_text: false,
            compact: true,
            filter: false,
            callback: None,
            max_builds: None,
            history: HistoryFilter::default(),
        }
    }
}

/// `1`/`true` and `0`/`false`, case-insensitively; anything else is `None`.
fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

impl QueryConfig {
    /// Parse raw query pairs. Malformed values fall back to defaults.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut args: HashMap<&str, Vec<&str>> = HashMap::new();
        for (key, value) in pairs {
            args.entry(key.as_str()).or_default().push(value.as_str());
        }
        let first = |key: &str| args.get(key).and_then(|values| values.first().copied());
        let flag = |key: &str, default: bool| first(key).and_then(parse_flag).unwrap_or(default);

        let as_text = flag("as_text", false);
        let mut config = Self {
            select: args
                .get("select")
                .map(|values| values.iter().map(|v| v.to_string()).collect()),
            as_text,
            compact: flag("compact", !as_text),
            filter: flag("filter", as_text),
            callback: first("callback").map(str::to_string),
            max_builds: ["numbuilds", "max"]
                .iter()
                .filter_map(|key| args.get(key))
                .flatten()
                .find_map(|value| value.parse().ok()),
            history: HistoryFilter::default(),
        };

        for (key, value) in pairs {
            if value.is_empty() {
                continue;
            }
            if key == "branch" {
                config.history.branches.push(value.clone());
            } else if let Some(codebase) = key.strip_suffix("_branch") {
                if !codebase.is_empty() && !config.history.codebases.contains_key(codebase) {
                    config
                        .history
                        .codebases
                        .insert(codebase.to_string(), value.clone());
                }
            }
        }

        if let Some(values) = args.get("results") {
            let results: Vec<i32> = values.iter().filter_map(|v| v.parse().ok()).collect();
            if !results.is_empty() {
                config.history.results = Some(results);
            }
        }
        config
    }

    pub fn output_options(&self) -> OutputOptions {
        OutputOptions {
            as_text: self.as_text,
            compact: self.compact,
            filter: self.filter,
            callback: self.callback.clone(),
        }
    }
}

/// What a single request can see while resolving and rendering.
#[derive(Clone, Copy)]
pub struct RequestContext<'a> {
    pub store: &'a dyn StatusStore,
    pub config: &'a QueryConfig,
}

impl<'a> RequestContext<'a> {
    pub fn new(store: &'a dyn StatusStore, config: &'a QueryConfig) -> Self {
        Self { store, config }
    }
}

/// A formatted response body with its transport metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub body: String,
    pub content_type: &'static str,
    /// How long the response may be considered fresh
    pub cache_seconds: u32,
}

/// Resolve `path`, render or compose it, and format the result.
///
/// A path ending in a `help` segment yields the plain-text help page of
/// the node above it.
pub async fn execute(tree: &StatusTree, path: &str, config: &QueryConfig) -> Result<Response> {
    let ctx = RequestContext::new(tree.store(), config);
    let resolution = resolve(tree.root(), path.trim_start_matches('/'), &ctx).await?;
    let node = &resolution.node;

    if let NodeKind::Documentation { text, children } = node.kind() {
        return Ok(Response {
            body: tree.help().page(text, children),
            content_type: CONTENT_TYPE_TEXT,
            cache_seconds: tree.cache_seconds_for(node),
        });
    }

    let document = match config.select {
        Some(ref selections) => compose(node, selections, &ctx).await?,
        None => node.render(&ctx).await?,
    };
    let formatted = output::format(document, &config.output_options())?;
    Ok(Response {
        body: formatted.body,
        content_type: formatted.content_type,
        cache_seconds: tree.cache_seconds_for(node),
    })
}
