//! End-to-end query tests against the fixture master.
//!
//! These run requests through `query::execute` the way the HTTP layer does:
//! - Build addressing (absolute, relative, `<N`) and memoization
//! - Selections composed over a base path
//! - Queue projection, global status, projects and help pages
//! - Output options (filtering, indentation, JSONP)

mod common;

use std::sync::Arc;

use lookout::models::{BuildStatus, results};
use lookout::query::{self, CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT, QueryConfig, RequestContext};
use lookout::storage::MemoryStore;
use lookout::tree::{StatusTree, TreeSettings, resolve};
use serde_json::{Value, json};

async fn get(tree: &StatusTree, path: &str, raw: &[(&str, &str)]) -> Value {
    let config = QueryConfig::from_pairs(&common::params(raw));
    let response = query::execute(tree, path, &config).await.unwrap();
    serde_json::from_str(&response.body).unwrap()
}

fn numbers(list: &Value) -> Vec<u64> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|build| build["number"].as_u64().unwrap())
        .collect()
}

// === Build addressing ===

#[tokio::test]
async fn test_latest_build_by_relative_index() {
    let tree = common::tree().await;
    let build = get(&tree, "builders/demo/builds/-1", &[]).await;
    assert_eq!(build["number"], 42);
    assert_eq!(build["builderName"], "demo");

    let build = get(&tree, "builders/demo/builds/-3", &[]).await;
    assert_eq!(build["number"], 40);

    let build = get(&tree, "builders/demo/builds/35", &[]).await;
    assert_eq!(build["number"], 35);
}

#[tokio::test]
async fn test_build_outside_cache_is_not_found() {
    let tree = common::tree().await;
    let config = QueryConfig::default();
    let err = query::execute(&tree, "builders/demo/builds/-20", &config)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_relative_and_absolute_share_one_node() {
    let tree = common::tree().await;
    let config = QueryConfig::default();
    let ctx = RequestContext::new(tree.store(), &config);

    let relative = resolve(tree.root(), "builders/demo/builds/-1", &ctx)
        .await
        .unwrap();
    let absolute = resolve(tree.root(), "builders/demo/builds/_all/42", &ctx)
        .await
        .unwrap();
    let forwarded = resolve(tree.root(), "builders/demo/builds/42", &ctx)
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&relative.node, &absolute.node));
    assert!(Arc::ptr_eq(&relative.node, &forwarded.node));
}

#[tokio::test]
async fn test_evicted_build_is_no_longer_addressable() {
    let store = Arc::new(MemoryStore::new(common::snapshot(), 3));
    let tree = StatusTree::build(store.clone(), TreeSettings::default())
        .await
        .unwrap();
    let config = QueryConfig::default();

    let build = get(&tree, "builders/demo/builds/40", &[]).await;
    assert_eq!(build["number"], 40);

    store
        .add_build(BuildStatus::new("demo", 43, 4300.0).finish(results::SUCCESS, 4350.0))
        .unwrap();

    for path in ["builders/demo/builds/40", "builders/demo/builds/_all/40"] {
        let err = query::execute(&tree, path, &config).await.unwrap_err();
        assert!(err.is_not_found(), "{path} should be out of cache");
    }
    let latest = get(&tree, "builders/demo/builds/-1", &[]).await;
    assert_eq!(latest["number"], 43);
    let oldest = get(&tree, "builders/demo/builds/-3", &[]).await;
    assert_eq!(oldest["number"], 41);
}

#[tokio::test]
async fn test_last_n_builds() {
    let tree = common::tree().await;

    let builds = get(&tree, "builders/demo/builds/<5", &[]).await;
    assert_eq!(numbers(&builds), vec![42, 41, 40, 39, 38]);

    let builds = get(&tree, "builders/demo/builds/<5", &[("branch", "trunk")]).await;
    assert_eq!(numbers(&builds), vec![42, 40, 39, 38, 37]);

    let builds = get(&tree, "builders/demo/builds/<5", &[("results", "0")]).await;
    assert_eq!(numbers(&builds), vec![42, 41, 39, 38, 37]);

    let builds = get(&tree, "builders/demo/builds/<50", &[]).await;
    assert_eq!(builds.as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_malformed_last_n_defaults_to_fifteen() {
    let tree = common::tree().await;
    // Only ten builds exist, so the default of 15 returns all of them.
    let builds = get(&tree, "builders/demo/builds/<abc", &[]).await;
    assert_eq!(builds.as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_cached_builds_and_numbuilds() {
    let tree = common::tree().await;

    let cached = get(&tree, "builders/demo/builds", &[]).await;
    assert_eq!(cached.as_array().unwrap().len(), 10);

    let capped = get(&tree, "builders/demo/builds", &[("numbuilds", "2")]).await;
    assert_eq!(numbers(&capped), vec![42, 41]);
}

#[tokio::test]
async fn test_all_builds_honour_codebase_filter() {
    let tree = common::tree().await;
    let all = get(&tree, "builders/demo/builds/_all", &[("app_branch", "stable")]).await;
    let keys: Vec<&String> = all.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["41"]);
}

#[tokio::test]
async fn test_steps_by_position_and_name() {
    let tree = common::tree().await;

    let step = get(&tree, "builders/demo/builds/42/steps/compile", &[]).await;
    assert_eq!(step["name"], "compile");

    let step = get(&tree, "builders/demo/builds/42/steps/-1", &[]).await;
    assert_eq!(step["name"], "compile");

    let steps = get(&tree, "builders/demo/builds/42/steps", &[]).await;
    assert_eq!(steps["0"]["name"], "checkout");
}

#[tokio::test]
async fn test_build_changes() {
    let tree = common::tree().await;
    let changes = get(&tree, "builders/demo/builds/-1/source_stamp/changes", &[]).await;
    assert_eq!(changes["101"]["who"], "alice");

    let changes = get(&tree, "builders/demo/builds/-2/source_stamp/changes", &[]).await;
    assert_eq!(changes, json!({}));
}

// === Selections ===

#[tokio::test]
async fn test_selection_composed_with_base_path() {
    let tree = common::tree().await;

    let plain = get(&tree, "builders/demo/builds/-1", &[]).await;
    let composed = get(
        &tree,
        "builders/demo/builds/-1",
        &[("select", ""), ("select", "source_stamp/changes")],
    )
    .await;

    assert_eq!(composed["number"], 42);
    assert_eq!(composed["source_stamp"]["changes"]["101"]["who"], "alice");

    let mut without_changes = composed.clone();
    without_changes.as_object_mut().unwrap().remove("source_stamp");
    assert_eq!(without_changes, plain);
}

#[tokio::test]
async fn test_selection_of_two_builds() {
    let tree = common::tree().await;
    let doc = get(
        &tree,
        "builders/demo/builds",
        &[("select", "-1"), ("select", "-2")],
    )
    .await;
    assert_eq!(doc["-1"]["number"], 42);
    assert_eq!(doc["-2"]["number"], 41);
}

#[tokio::test]
async fn test_selection_of_unrelated_paths() {
    let tree = common::tree().await;
    let doc = get(
        &tree,
        "",
        &[
            ("select", "slaves/w1/"),
            ("select", "project"),
            ("select", "builders/demo/builds/42"),
            ("select", "slaves/w9"),
        ],
    )
    .await;

    assert_eq!(doc["slaves"]["w1"]["connected"], true);
    assert_eq!(doc["slaves"]["w9"], json!({"error": "Not available"}));
    assert_eq!(doc["project"]["title"], "Katana");
    assert_eq!(doc["builders"]["demo"]["builds"]["42"]["number"], 42);
}

#[tokio::test]
async fn test_selection_order_independence() {
    let tree = common::tree().await;
    let forward = get(
        &tree,
        "",
        &[("select", "builders/demo"), ("select", "builders")],
    )
    .await;
    let backward = get(
        &tree,
        "",
        &[("select", "builders"), ("select", "builders/demo")],
    )
    .await;
    let alone = get(&tree, "", &[("select", "builders")]).await;
    assert_eq!(forward, backward);
    assert_eq!(forward, alone);
}

// === Queue and global views ===

#[tokio::test]
async fn test_build_queue_is_time_ordered() {
    let tree = common::tree().await;

    let queue = get(&tree, "buildqueue", &[]).await;
    let brids: Vec<u64> = queue
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["brid"].as_u64().unwrap())
        .collect();
    assert_eq!(brids, vec![2, 3, 1]);
    assert_eq!(queue[0]["submitTime"], 10.0);

    let pending = get(&tree, "pending/demo", &[]).await;
    assert_eq!(pending.as_array().unwrap().len(), 2);
    assert_eq!(pending[0]["brid"], 3);
}

#[tokio::test]
async fn test_builder_summary() {
    let tree = common::tree().await;
    let builder = get(&tree, "builders/docs", &[]).await;
    assert_eq!(builder["currentBuilds"], json!([7]));
    assert_eq!(builder["pendingBuilds"], 1);
}

#[tokio::test]
async fn test_global_status() {
    let tree = common::tree().await;
    let status = get(&tree, "globalstatus", &[]).await;
    assert_eq!(status["slaves_count"], 2);
    assert_eq!(status["slaves_busy"], 1);
    assert_eq!(status["running_builds"], 1);
    assert_eq!(status["build_load"], 4);
}

#[tokio::test]
async fn test_global_status_is_fresher_than_default() {
    let tree = common::tree().await;
    let config = QueryConfig::default();
    let status = query::execute(&tree, "globalstatus", &config).await.unwrap();
    let builders = query::execute(&tree, "builders", &config).await.unwrap();
    assert_eq!(status.cache_seconds, 5);
    assert_eq!(builders.cache_seconds, 60);
}

#[tokio::test]
async fn test_slave_history_last_n() {
    let tree = common::tree().await;
    let builds = get(&tree, "slaves/w2/builds/<3", &[]).await;
    assert_eq!(numbers(&builds), vec![41, 39, 37]);

    let current = get(&tree, "slaves/w2/builds", &[]).await;
    assert_eq!(numbers(&current), vec![7]);
}

#[tokio::test]
async fn test_project_latest_builds() {
    let tree = common::tree().await;
    let project = get(&tree, "projects/katana", &[]).await;
    assert_eq!(project["builders"][0]["name"], "demo");
    assert_eq!(project["builders"][0]["latestBuild"]["number"], 42);

    let builder = get(&tree, "projects/katana/demo", &[("app_branch", "stable")]).await;
    assert_eq!(builder["latestBuild"]["number"], 41);
}

// === Help and output ===

#[tokio::test]
async fn test_help_page() {
    let tree = common::tree().await;
    let response = query::execute(&tree, "builders/help", &QueryConfig::default())
        .await
        .unwrap();
    assert_eq!(response.content_type, CONTENT_TYPE_TEXT);
    assert!(response.body.starts_with("List of all the builders"));
    assert!(response.body.contains("Children: demo, docs"));
    assert!(response.body.contains("/json/builders/demo/builds/42"));
}

#[tokio::test]
async fn test_as_text_filters_and_indents() {
    let tree = common::tree().await;
    let config = QueryConfig::from_pairs(&common::params(&[("as_text", "1")]));
    let response = query::execute(&tree, "builders/demo/builds/42", &config)
        .await
        .unwrap();
    assert_eq!(response.content_type, CONTENT_TYPE_TEXT);
    assert!(response.body.contains("\n  \"builderName\": \"demo\""));
    assert!(response.body.contains("\"results\": 0"));
    assert!(!response.body.contains("\"properties\""));
}

#[tokio::test]
async fn test_jsonp_callback() {
    let tree = common::tree().await;
    let config = QueryConfig::from_pairs(&common::params(&[("callback", "cb")]));
    let response = query::execute(&tree, "project", &config).await.unwrap();
    assert_eq!(response.content_type, CONTENT_TYPE_JSON);
    assert!(response.body.starts_with("cb({"));
    assert!(response.body.ends_with("});"));
}
