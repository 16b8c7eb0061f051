//! The status resource tree.
//!
//! Every addressable piece of master state is a [`StatusNode`]. A node is one
//! of three kinds:
//! - a static container with a fixed set of named children,
//! - a dynamic container that can additionally materialize children on
//!   demand from a path segment (build numbers, `<N` listings, step names),
//! - a leaf that only produces a value.
//!
//! What a node renders is described by its [`View`]; containers without a
//! view render every child concurrently into one mapping. Dynamic children
//! are memoized into the container's registry, so resolving the same segment
//! twice hands back the same node.

mod addressing;
mod build;
mod help;
mod render;
mod resolve;

pub use addressing::{BuildRef, DEFAULT_LAST_N, MAX_LAST_N_NODES};
pub use build::{StatusTree, TreeSettings};
pub use help::{EXAMPLES, FLAGS, HelpCatalog};
pub use resolve::{Resolution, resolve};

use std::sync::{Arc, PoisonError, RwLock};

use crate::models::Change;

/// Path segment that short-circuits to a node's documentation.
pub const HELP_SEGMENT: &str = "help";

/// Which history a `<N` listing scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryScope {
    Builder(String),
    Slave(String),
}

/// What a node renders.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    /// Builder summary with current, cached and pending build counts
    Builder { builder: String },
    /// The bounded in-memory build cache of a builder
    CachedBuilds { builder: String },
    /// Full build history of a builder, keyed by build number
    AllBuilds { builder: String },
    Build { builder: String, number: u64 },
    /// The N most recent finished builds matching the request filters
    PastBuilds { scope: HistoryScope, count: usize },
    Steps { builder: String, number: u64 },
    Step { builder: String, number: u64, index: usize },
    SourceStamp { builder: String, number: u64 },
    Change(Box<Change>),
    ChangeSources,
    /// Master-wide settings
    Project,
    Metrics,
    Slave { slave: String },
    /// Builds currently running on a worker
    SlaveBuilds { slave: String },
    BuildQueue,
    PendingBuilds { builder: String },
    GlobalStatus,
    SingleProject { project: String },
    ProjectBuilder { builder: String },
}

/// How a dynamic container materializes children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Build numbers, negative offsets and `<N` listings of one builder
    BuildHistory { builder: String },
    /// Delegate every unknown segment to the named static child
    ForwardTo(&'static str),
    /// Steps of one build, by position or by name
    Steps { builder: String, number: u64 },
    /// `<N` listings of one worker's finished builds
    SlaveHistory { slave: String },
}

#[derive(Debug)]
pub enum NodeKind {
    StaticContainer(Option<View>),
    DynamicContainer(Rule, Option<View>),
    Leaf(View),
    /// Help page of another node; not part of the data graph
    Documentation {
        text: &'static str,
        children: Vec<String>,
    },
}

/// An addressable node of the status tree.
#[derive(Debug)]
pub struct StatusNode {
    name: String,
    help: Option<&'static str>,
    cache_seconds: Option<u32>,
    kind: NodeKind,
    children: RwLock<Vec<(String, Arc<StatusNode>)>>,
}

impl StatusNode {
    fn with_kind(name: impl Into<String>, help: Option<&'static str>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            help,
            cache_seconds: None,
            kind,
            children: RwLock::new(Vec::new()),
        }
    }

    /// A container that renders by fanning out over its children.
    pub fn container(name: impl Into<String>, help: Option<&'static str>) -> Self {
        Self::with_kind(name, help, NodeKind::StaticContainer(None))
    }

    /// A container with its own rendering.
    pub fn container_with_view(
        name: impl Into<String>,
        help: Option<&'static str>,
        view: View,
    ) -> Self {
        Self::with_kind(name, help, NodeKind::StaticContainer(Some(view)))
    }

    pub fn dynamic(
        name: impl Into<String>,
        help: Option<&'static str>,
        rule: Rule,
        view: Option<View>,
    ) -> Self {
        Self::with_kind(name, help, NodeKind::DynamicContainer(rule, view))
    }

    pub fn leaf(name: impl Into<String>, help: Option<&'static str>, view: View) -> Self {
        Self::with_kind(name, help, NodeKind::Leaf(view))
    }

    /// The help page of `parent`.
    pub fn documentation(parent: &StatusNode, text: &'static str) -> Self {
        let children = parent
            .child_names()
            .into_iter()
            .filter(|name| name != HELP_SEGMENT)
            .collect();
        Self::with_kind(
            HELP_SEGMENT,
            None,
            NodeKind::Documentation { text, children },
        )
    }

    /// Attach a child at construction time.
    pub fn with_child(mut self, child: StatusNode) -> Self {
        let registry = self
            .children
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        registry.push((child.name.clone(), Arc::new(child)));
        self
    }

    pub fn with_cache_seconds(mut self, seconds: u32) -> Self {
        self.cache_seconds = Some(seconds);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> Option<&'static str> {
        self.help
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Freshness override for this node, if any.
    pub fn cache_seconds(&self) -> Option<u32> {
        self.cache_seconds
    }

    /// Whether path walking may continue below this node.
    pub fn is_descendable(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::StaticContainer(_) | NodeKind::DynamicContainer(..)
        )
    }

    /// Whether this node belongs to the data graph.
    pub fn is_data(&self) -> bool {
        !matches!(self.kind, NodeKind::Documentation { .. })
    }

    /// Look up an already registered child.
    pub fn child(&self, name: &str) -> Option<Arc<StatusNode>> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, node)| Arc::clone(node))
    }

    /// Registered children in registry order.
    pub fn children(&self) -> Vec<(String, Arc<StatusNode>)> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn child_names(&self) -> Vec<String> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Drop the child registered under `key`, if any.
    pub fn forget(&self, key: &str) -> Option<Arc<StatusNode>> {
        let mut registry = self
            .children
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let position = registry.iter().position(|(k, _)| k == key)?;
        tracing::debug!(parent = %self.name, child = %key, "forgot dynamic child");
        Some(registry.remove(position).1)
    }

    /// Register a materialized child under `key`.
    ///
    /// When another resolution already registered `key`, that node is kept
    /// and returned instead of `node`.
    pub fn memoize(&self, key: impl Into<String>, node: Arc<StatusNode>) -> Arc<StatusNode> {
        self.memoize_bounded(key, node, usize::MAX, |_| true)
    }

    /// Like [`memoize`](Self::memoize), but registers `node` only while fewer
    /// than `limit` registered keys satisfy `counted`. Past the limit `node`
    /// is handed back without being registered.
    pub fn memoize_bounded(
        &self,
        key: impl Into<String>,
        node: Arc<StatusNode>,
        limit: usize,
        counted: impl Fn(&str) -> bool,
    ) -> Arc<StatusNode> {
        let key = key.into();
        let mut registry = self
            .children
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some((_, existing)) = registry.iter().find(|(k, _)| *k == key) {
            return Arc::clone(existing);
        }
        if registry.iter().filter(|(k, _)| counted(k.as_str())).count() >= limit {
            return node;
        }
        tracing::debug!(parent = %self.name, child = %key, "memoized dynamic child");
        registry.push((key, Arc::clone(&node)));
        node
    }
}
