//! Tree construction.

use std::sync::Arc;

use futures::future::try_join_all;

use super::help::HelpCatalog;
use super::{Rule, StatusNode, View};
use crate::models::{BuildStatus, BuilderStatus, SourceStamp};
use crate::storage::StatusStore;
use crate::{Error, Result};

const ROOT_HELP: &str = "JSON status

Root page to give a fair amount of information in the current build master
status. You may want to use a child instead to reduce the load on the server.

For help on any sub directory, use url /child/help";
const BUILDERS_HELP: &str = "List of all the builders defined on a master.";
const BUILDER_HELP: &str = "Describe a single builder.";
const BUILDS_HELP: &str = "Builds that were run on a builder.";
const ALL_BUILDS_HELP: &str = "All the builds that were run on a builder.";
const BUILDER_SLAVES_HELP: &str = "Describe the slaves attached to a single builder.";
const BUILDER_PENDING_HELP: &str = "Describe pending builds for a builder.";
const BUILD_HELP: &str = "Describe a single build.";
const STEPS_HELP: &str = "A list of build steps that occurred during a build.";
const SOURCE_STAMP_HELP: &str = "Describe the sources for a SourceStamp.";
const CHANGES_HELP: &str = "List of changes.";
const CHANGE_HELP: &str = "Describe a single change that originates from a change source.";
const CHANGE_SOURCES_HELP: &str = "Describe a change source.";
const PROJECT_HELP: &str = "Project-wide settings.";
const PROJECTS_HELP: &str = "List the registered projects.";
const SINGLE_PROJECT_HELP: &str = "Describe a project and the latest build of each of its builders.";
const SLAVES_HELP: &str = "List the registered slaves.";
const SLAVE_HELP: &str = "Describe a slave.";
const SLAVE_BUILDS_HELP: &str = "List builds related with a slave.";
const METRICS_HELP: &str = "Master metrics.";
const QUEUE_HELP: &str = "List the builds in the queue.";
const PENDING_HELP: &str = "List the builds in the queue for a particular builder.";
const SINGLE_PENDING_HELP: &str = "List the pending builds for a specific builder.";
const GLOBAL_HELP: &str = "Gives information that can be used on all realtime pages.";

/// Freshness used by the realtime global status page.
const GLOBAL_STATUS_CACHE_SECONDS: u32 = 5;

/// Settings fixed at tree construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSettings {
    /// Default freshness for every node without its own override
    pub cache_seconds: u32,
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self { cache_seconds: 60 }
    }
}

/// The process-wide status tree and the store it renders from.
pub struct StatusTree {
    root: Arc<StatusNode>,
    store: Arc<dyn StatusStore>,
    help: HelpCatalog,
    settings: TreeSettings,
}

impl StatusTree {
    /// Build the tree from the store's current builders, workers and projects.
    pub async fn build(store: Arc<dyn StatusStore>, settings: TreeSettings) -> Result<Self> {
        let names = store.builder_names().await?;
        let builders = try_join_all(names.iter().map(|name| store.builder(name)))
            .await
            .map_err(|e| Error::aggregate("tree construction", e))?;
        let slave_names = store.slave_names().await?;
        let projects = store.projects().await?;

        let mut builders_node = StatusNode::container("builders", Some(BUILDERS_HELP));
        let mut pending_node = StatusNode::container("pending", Some(PENDING_HELP));
        for builder in &builders {
            builders_node = builders_node.with_child(builder_node(builder, &slave_names));
            pending_node = pending_node.with_child(StatusNode::leaf(
                builder.name.clone(),
                Some(SINGLE_PENDING_HELP),
                View::PendingBuilds {
                    builder: builder.name.clone(),
                },
            ));
        }

        let mut slaves_node = StatusNode::container("slaves", Some(SLAVES_HELP));
        for name in &slave_names {
            slaves_node = slaves_node.with_child(slave_node(name));
        }

        let mut projects_node = StatusNode::container("projects", Some(PROJECTS_HELP));
        for project in &projects {
            let mut node = StatusNode::container_with_view(
                project.name.clone(),
                Some(SINGLE_PROJECT_HELP),
                View::SingleProject {
                    project: project.name.clone(),
                },
            );
            for builder in builders
                .iter()
                .filter(|b| b.project.as_deref() == Some(project.name.as_str()))
            {
                node = node.with_child(StatusNode::leaf(
                    builder.name.clone(),
                    Some(BUILDER_HELP),
                    View::ProjectBuilder {
                        builder: builder.name.clone(),
                    },
                ));
            }
            projects_node = projects_node.with_child(node);
        }

        let root = StatusNode::container("", Some(ROOT_HELP))
            .with_child(builders_node)
            .with_child(StatusNode::leaf(
                "change_sources",
                Some(CHANGE_SOURCES_HELP),
                View::ChangeSources,
            ))
            .with_child(StatusNode::leaf("project", Some(PROJECT_HELP), View::Project))
            .with_child(projects_node)
            .with_child(slaves_node)
            .with_child(StatusNode::leaf("metrics", Some(METRICS_HELP), View::Metrics))
            .with_child(StatusNode::leaf("buildqueue", Some(QUEUE_HELP), View::BuildQueue))
            .with_child(pending_node)
            .with_child(
                StatusNode::leaf("globalstatus", Some(GLOBAL_HELP), View::GlobalStatus)
                    .with_cache_seconds(GLOBAL_STATUS_CACHE_SECONDS),
            );

        let help = HelpCatalog::discover(store.as_ref(), &builders, &projects).await?;
        tracing::info!(
            builders = builders.len(),
            slaves = slave_names.len(),
            projects = projects.len(),
            "status tree constructed"
        );

        Ok(Self {
            root: Arc::new(root),
            store,
            help,
            settings,
        })
    }

    pub fn root(&self) -> &Arc<StatusNode> {
        &self.root
    }

    pub fn store(&self) -> &dyn StatusStore {
        self.store.as_ref()
    }

    pub fn help(&self) -> &HelpCatalog {
        &self.help
    }

    /// Freshness of a node, falling back to the tree default.
    pub fn cache_seconds_for(&self, node: &StatusNode) -> u32 {
        node.cache_seconds().unwrap_or(self.settings.cache_seconds)
    }
}

fn builder_node(builder: &BuilderStatus, known_slaves: &[String]) -> StatusNode {
    let name = builder.name.clone();
    let all_builds = StatusNode::dynamic(
        "_all",
        Some(ALL_BUILDS_HELP),
        Rule::BuildHistory {
            builder: name.clone(),
        },
        Some(View::AllBuilds {
            builder: name.clone(),
        }),
    );
    let builds = StatusNode::dynamic(
        "builds",
        Some(BUILDS_HELP),
        Rule::ForwardTo("_all"),
        Some(View::CachedBuilds {
            builder: name.clone(),
        }),
    )
    .with_child(all_builds);

    let mut slaves = StatusNode::container("slaves", Some(BUILDER_SLAVES_HELP));
    for slave in builder.slaves.iter().filter(|s| known_slaves.contains(s)) {
        slaves = slaves.with_child(slave_node(slave));
    }

    StatusNode::container_with_view(
        name.clone(),
        Some(BUILDER_HELP),
        View::Builder {
            builder: name.clone(),
        },
    )
    .with_child(builds)
    .with_child(slaves)
    .with_child(StatusNode::leaf(
        "pendingBuilds",
        Some(BUILDER_PENDING_HELP),
        View::PendingBuilds { builder: name },
    ))
}

fn slave_node(name: &str) -> StatusNode {
    StatusNode::container_with_view(
        name,
        Some(SLAVE_HELP),
        View::Slave {
            slave: name.to_string(),
        },
    )
    .with_child(StatusNode::dynamic(
        "builds",
        Some(SLAVE_BUILDS_HELP),
        Rule::SlaveHistory {
            slave: name.to_string(),
        },
        Some(View::SlaveBuilds {
            slave: name.to_string(),
        }),
    ))
}

/// The node for one build, materialized on demand.
pub(super) fn build_node(build: &BuildStatus) -> StatusNode {
    let builder = build.builder_name.clone();
    let number = build.number;
    let mut node = StatusNode::container_with_view(
        number.to_string(),
        Some(BUILD_HELP),
        View::Build {
            builder: builder.clone(),
            number,
        },
    );
    if let Some(stamp) = build.primary_source_stamp() {
        node = node.with_child(source_stamp_node(stamp, &builder, number));
    }
    node.with_child(StatusNode::dynamic(
        "steps",
        Some(STEPS_HELP),
        Rule::Steps {
            builder: builder.clone(),
            number,
        },
        Some(View::Steps { builder, number }),
    ))
}

fn source_stamp_node(stamp: &SourceStamp, builder: &str, number: u64) -> StatusNode {
    let mut changes = StatusNode::container("changes", Some(CHANGES_HELP));
    let mut keys: Vec<String> = Vec::new();
    for (position, change) in stamp.changes.iter().enumerate() {
        let key = match change.number {
            Some(n) if !keys.contains(&n.to_string()) => n.to_string(),
            _ => format!("~{}", position),
        };
        keys.push(key.clone());
        changes = changes.with_child(StatusNode::leaf(
            key,
            Some(CHANGE_HELP),
            View::Change(Box::new(change.clone())),
        ));
    }
    StatusNode::container_with_view(
        "source_stamp",
        Some(SOURCE_STAMP_HELP),
        View::SourceStamp {
            builder: builder.to_string(),
            number,
        },
    )
    .with_child(changes)
}
