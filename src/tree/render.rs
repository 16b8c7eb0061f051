//! Rendering nodes into JSON values.

use std::collections::HashSet;

use chrono::Utc;
use futures::future::{BoxFuture, try_join_all};
use futures::{FutureExt, try_join};
use serde::Serialize;
use serde_json::{Map, Value, json};

use super::{HistoryScope, NodeKind, StatusNode, View};
use crate::models::{BuildStatus, BuilderStatus};
use crate::query::RequestContext;
use crate::query::queue::{QueueScope, pending_builds};
use crate::storage::{HistoryFilter, StatusStore};
use crate::{Error, Result};

impl StatusNode {
    /// Render this node and everything below it.
    ///
    /// Containers without a view render every data child concurrently and
    /// only complete once all of them have; the first failure fails the
    /// whole rendering.
    pub fn render<'a>(&'a self, ctx: &'a RequestContext<'a>) -> BoxFuture<'a, Result<Value>> {
        async move {
            match self.kind() {
                NodeKind::StaticContainer(Some(view))
                | NodeKind::DynamicContainer(_, Some(view))
                | NodeKind::Leaf(view) => view.render(self, ctx).await,
                NodeKind::StaticContainer(None) | NodeKind::DynamicContainer(_, None) => {
                    self.render_children(ctx).await
                }
                NodeKind::Documentation { .. } => Err(Error::Unimplemented(format!(
                    "documentation node {}",
                    self.name()
                ))),
            }
        }
        .boxed()
    }

    async fn render_children(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let children: Vec<_> = self
            .children()
            .into_iter()
            .filter(|(_, child)| child.is_data())
            .collect();
        let values = try_join_all(children.iter().map(|(_, child)| child.render(ctx)))
            .await
            .map_err(|e| Error::aggregate("container render", e))?;
        Ok(Value::Object(
            children
                .into_iter()
                .map(|(name, _)| name)
                .zip(values)
                .collect(),
        ))
    }
}

impl View {
    async fn render(&self, node: &StatusNode, ctx: &RequestContext<'_>) -> Result<Value> {
        let store = ctx.store;
        let config = ctx.config;
        match self {
            View::Builder { builder } => Ok(Value::Object(builder_document(store, builder).await?)),

            View::CachedBuilds { builder } => {
                let builds = match config.max_builds {
                    Some(max) => {
                        store
                            .finished_builds(&[builder.clone()], &config.history, Some(max))
                            .await?
                    }
                    None => {
                        store
                            .cached_builds(builder, &config.history.codebases_only())
                            .await?
                    }
                };
                to_json(&builds)
            }

            View::AllBuilds { builder } => {
                if config.history.is_empty() && config.max_builds.is_none() {
                    tracing::warn!(builder, "unfiltered full history scan");
                }
                let builds = store
                    .finished_builds(&[builder.clone()], &config.history, config.max_builds)
                    .await?;
                let mut by_number = Map::new();
                for build in builds {
                    by_number.insert(build.number.to_string(), to_json(&build)?);
                }
                Ok(Value::Object(by_number))
            }

            View::Build { builder, number } => to_json(&store.build(builder, *number).await?),

            View::PastBuilds { scope, count } => {
                let (builders, filter) = match scope {
                    HistoryScope::Builder(builder) => (vec![builder.clone()], config.history.clone()),
                    HistoryScope::Slave(slave) => {
                        let served = builders_for_slave(store, slave).await?;
                        let names = served.into_iter().map(|b| b.name).collect();
                        (names, config.history.clone().with_slave(slave.clone()))
                    }
                };
                let builds = store.finished_builds(&builders, &filter, Some(*count)).await?;
                to_json(&builds)
            }

            View::Steps { builder, number } => {
                let build = store.build(builder, *number).await?;
                let mut steps = Map::new();
                for (index, step) in build.steps.iter().enumerate() {
                    steps.insert(index.to_string(), to_json(step)?);
                }
                Ok(Value::Object(steps))
            }

            View::Step {
                builder,
                number,
                index,
            } => {
                let build = store.build(builder, *number).await?;
                let step = build.steps.get(*index).ok_or_else(|| {
                    Error::NotFound(format!("step {} of build {} of {}", index, number, builder))
                })?;
                to_json(step)
            }

            View::SourceStamp { builder, number } => {
                let build = store.build(builder, *number).await?;
                let stamp = build.primary_source_stamp().ok_or_else(|| {
                    Error::NotFound(format!("source stamp of build {} of {}", number, builder))
                })?;
                to_json(stamp)
            }

            View::Change(change) => to_json(change.as_ref()),

            View::ChangeSources => {
                let mut sources = Map::new();
                for (index, description) in store.change_sources().await?.into_iter().enumerate() {
                    sources.insert(index.to_string(), json!({ "description": description }));
                }
                Ok(Value::Object(sources))
            }

            View::Project => to_json(&store.master_info().await?),

            View::Metrics => Ok(store.metrics().await?.unwrap_or(Value::Null)),

            View::Slave { slave } => {
                let (status, served) =
                    try_join!(store.slave(slave), builders_for_slave(store, slave))?;
                let mut doc = to_object(&status)?;
                let builders: Vec<Value> = served
                    .iter()
                    .map(|b| json!({ "name": b.name, "friendlyName": b.friendly_name() }))
                    .collect();
                doc.insert("builders".to_string(), Value::Array(builders));
                Ok(Value::Object(doc))
            }

            View::SlaveBuilds { slave } => {
                let served = builders_for_slave(store, slave).await?;
                let current = try_join_all(served.iter().map(|b| store.current_builds(&b.name)))
                    .await
                    .map_err(|e| Error::aggregate("current builds", e))?;
                let on_slave: Vec<BuildStatus> = current
                    .into_iter()
                    .flatten()
                    .filter(|b| b.slave.as_deref() == Some(slave.as_str()))
                    .collect();
                to_json(&on_slave)
            }

            View::BuildQueue => {
                to_json(&pending_builds(store, &QueueScope::Global, &config.history).await?)
            }

            View::PendingBuilds { builder } => {
                let scope = QueueScope::Builder(builder.clone());
                to_json(&pending_builds(store, &scope, &config.history).await?)
            }

            View::GlobalStatus => global_status(store).await,

            View::SingleProject { .. } => {
                let children = node.children();
                let builders = try_join_all(children.iter().map(|(_, child)| child.render(ctx)))
                    .await
                    .map_err(|e| Error::aggregate("project render", e))?;
                Ok(json!({ "builders": builders }))
            }

            View::ProjectBuilder { builder } => {
                let filter = HistoryFilter {
                    codebases: config.history.codebases.clone(),
                    branches: config.history.branches.clone(),
                    ..Default::default()
                };
                let names = [builder.clone()];
                let (mut doc, latest) = try_join!(
                    builder_document(store, builder),
                    store.finished_builds(&names, &filter, Some(1)),
                )?;
                if let Some(build) = latest.first() {
                    doc.insert("latestBuild".to_string(), to_json(build)?);
                }
                Ok(Value::Object(doc))
            }
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match to_json(value)? {
        Value::Object(map) => Ok(map),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}

/// Builder record plus its current, cached and pending build counts.
async fn builder_document(store: &dyn StatusStore, builder: &str) -> Result<Map<String, Value>> {
    let no_filter = HistoryFilter::default();
    let (status, current, cached, pending) = try_join!(
        store.builder(builder),
        store.current_builds(builder),
        store.cached_builds(builder, &no_filter),
        store.unclaimed_requests(Some(builder)),
    )?;
    let mut doc = to_object(&status)?;
    doc.insert("friendlyName".to_string(), json!(status.friendly_name()));
    let current: Vec<u64> = current.iter().map(|b| b.number).collect();
    let mut cached: Vec<u64> = cached.iter().map(|b| b.number).collect();
    cached.sort_unstable();
    doc.insert("currentBuilds".to_string(), json!(current));
    doc.insert("cachedBuilds".to_string(), json!(cached));
    doc.insert("pendingBuilds".to_string(), json!(pending.len()));
    Ok(doc)
}

/// Builders a worker is attached to, in registry order.
async fn builders_for_slave(store: &dyn StatusStore, slave: &str) -> Result<Vec<BuilderStatus>> {
    let names = store.builder_names().await?;
    let builders = try_join_all(names.iter().map(|name| store.builder(name)))
        .await
        .map_err(|e| Error::aggregate("builder lookup", e))?;
    Ok(builders
        .into_iter()
        .filter(|b| b.slaves.iter().any(|s| s == slave))
        .collect())
}

async fn global_status(store: &dyn StatusStore) -> Result<Value> {
    let (slave_names, builder_names, queue) = try_join!(
        store.slave_names(),
        store.builder_names(),
        store.unclaimed_requests(None),
    )?;
    let (slaves, running) = try_join!(
        try_join_all(slave_names.iter().map(|name| store.slave(name))),
        try_join_all(builder_names.iter().map(|name| store.current_builds(name))),
    )
    .map_err(|e| Error::aggregate("global status", e))?;

    let running: Vec<BuildStatus> = running.into_iter().flatten().collect();
    let busy: HashSet<&str> = running.iter().filter_map(|b| b.slave.as_deref()).collect();
    let connected = slaves.iter().filter(|s| s.connected).count();
    let slaves_busy = slaves
        .iter()
        .filter(|s| busy.contains(s.name.as_str()))
        .count();

    Ok(json!({
        "slaves_count": connected,
        "slaves_busy": slaves_busy,
        "running_builds": running.len(),
        "build_load": queue.len() + running.len(),
        "utc": Utc::now().timestamp_millis(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuildRequest, SlaveStatus, StepStatus, results};
    use crate::query::QueryConfig;
    use crate::storage::{BuilderRecord, MemoryStore, PendingRecord, Snapshot};

    fn store() -> MemoryStore {
        let mut builder = BuilderStatus::new("demo");
        builder.slaves = vec!["w1".to_string(), "w2".to_string()];
        let mut finished = BuildStatus::new("demo", 1, 0.0).finish(results::SUCCESS, 10.0);
        finished.steps = vec![StepStatus::new("checkout"), StepStatus::new("compile")];
        let mut running = BuildStatus::new("demo", 2, 20.0);
        running.slave = Some("w1".to_string());
        MemoryStore::new(
            Snapshot {
                builders: vec![BuilderRecord {
                    status: builder,
                    builds: vec![finished, running],
                }],
                slaves: vec![SlaveStatus::new("w1", true), SlaveStatus::new("w2", false)],
                pending: vec![PendingRecord {
                    request: BuildRequest::new(1, "demo"),
                    submitted_at: Some(30.0),
                }],
                ..Default::default()
            },
            10,
        )
    }

    #[tokio::test]
    async fn test_container_renders_children_in_registry_order() {
        let store = store();
        let config = QueryConfig::default();
        let ctx = RequestContext::new(&store, &config);
        let node = StatusNode::container("root", None)
            .with_child(StatusNode::leaf("metrics", None, View::Metrics))
            .with_child(StatusNode::leaf("change_sources", None, View::ChangeSources));

        let value = node.render(&ctx).await.unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["metrics", "change_sources"]);
        assert_eq!(value["metrics"], Value::Null);
    }

    #[tokio::test]
    async fn test_documentation_node_is_unimplemented() {
        let store = store();
        let config = QueryConfig::default();
        let ctx = RequestContext::new(&store, &config);
        let parent = StatusNode::container("p", Some("Parent."));
        let docs = StatusNode::documentation(&parent, "Parent.");
        let err = docs.render(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::Unimplemented(_)));
    }

    #[tokio::test]
    async fn test_failing_child_fails_container() {
        let store = store();
        let config = QueryConfig::default();
        let ctx = RequestContext::new(&store, &config);
        let node = StatusNode::container("root", None)
            .with_child(StatusNode::leaf("ok", None, View::Metrics))
            .with_child(StatusNode::leaf(
                "gone",
                None,
                View::Slave {
                    slave: "ghost".to_string(),
                },
            ));
        let err = node.render(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::Aggregate { .. }));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_builder_document_counts() {
        let store = store();
        let doc = builder_document(&store, "demo").await.unwrap();
        assert_eq!(doc["name"], "demo");
        assert_eq!(doc["friendlyName"], "demo");
        assert_eq!(doc["currentBuilds"], json!([2]));
        assert_eq!(doc["cachedBuilds"], json!([1, 2]));
        assert_eq!(doc["pendingBuilds"], 1);
    }

    #[tokio::test]
    async fn test_steps_view_keyed_by_position() {
        let store = store();
        let config = QueryConfig::default();
        let ctx = RequestContext::new(&store, &config);
        let node = StatusNode::leaf(
            "steps",
            None,
            View::Steps {
                builder: "demo".to_string(),
                number: 1,
            },
        );
        let value = node.render(&ctx).await.unwrap();
        assert_eq!(value["0"]["name"], "checkout");
        assert_eq!(value["1"]["name"], "compile");
    }

    #[tokio::test]
    async fn test_slave_views() {
        let store = store();
        let config = QueryConfig::default();
        let ctx = RequestContext::new(&store, &config);

        let slave = View::Slave {
            slave: "w1".to_string(),
        };
        let value = slave.render(&StatusNode::container("w1", None), &ctx).await.unwrap();
        assert_eq!(value["connected"], true);
        assert_eq!(value["builders"][0]["name"], "demo");

        let builds = View::SlaveBuilds {
            slave: "w1".to_string(),
        };
        let value = builds.render(&StatusNode::container("builds", None), &ctx).await.unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["number"], 2);
    }

    #[tokio::test]
    async fn test_project_builder_carries_latest_finished_build() {
        let store = store();
        let config = QueryConfig::default();
        let ctx = RequestContext::new(&store, &config);
        let view = View::ProjectBuilder {
            builder: "demo".to_string(),
        };
        let value = view.render(&StatusNode::leaf("demo", None, view.clone()), &ctx).await.unwrap();
        assert_eq!(value["name"], "demo");
        assert_eq!(value["latestBuild"]["number"], 1);
        assert_eq!(value["pendingBuilds"], 1);
    }

    #[tokio::test]
    async fn test_global_status_counts() {
        let store = store();
        let value = global_status(&store).await.unwrap();
        assert_eq!(value["slaves_count"], 1);
        assert_eq!(value["slaves_busy"], 1);
        assert_eq!(value["running_builds"], 1);
        assert_eq!(value["build_load"], 2);
        assert!(value["utc"].as_i64().unwrap() > 0);
    }
}
