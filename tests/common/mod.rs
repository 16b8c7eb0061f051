//! Common test utilities for lookout integration tests.
//!
//! Provides a fixture master (`snapshot()`), ready-made stores and trees built
//! from it, and `TestEnv` for CLI tests that need the fixture on disk.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_cmd::Command;
use lookout::models::{
    BuildRequest, BuildStatus, BuilderStatus, Change, MasterInfo, ProjectStatus, SlaveStatus,
    SourceStamp, StepStatus, results,
};
use lookout::storage::{BuilderRecord, MemoryStore, PendingRecord, Snapshot};
use lookout::tree::{StatusTree, TreeSettings};
pub use tempfile::TempDir;

pub const CACHE_SIZE: usize = 15;

fn finished_build(number: u64) -> BuildStatus {
    let started = number as f64 * 100.0;
    let result = if number == 40 {
        results::FAILURE
    } else {
        results::SUCCESS
    };
    let mut build = BuildStatus::new("demo", number, started).finish(result, started + 50.0);
    build.slave = Some(if number % 2 == 0 { "w1" } else { "w2" }.to_string());
    build.reason = "scheduler".to_string();
    let branch = if number == 41 { "stable" } else { "trunk" };
    build.source_stamps = vec![SourceStamp::new("app", Some(branch))];
    build.steps = vec![StepStatus::new("checkout"), StepStatus::new("compile")];
    build
}

/// The fixture master.
///
/// - builder `demo` (project `katana`, workers w1 and w2): finished builds
///   33..=42, all on `trunk` except 41 (`stable`), all successful except 40;
///   build 42 carries change 101
/// - builder `docs` (worker w2): one build, 7, still running on w2
/// - workers w1 and w2 connected, w3 disconnected
/// - pending requests 1 (demo, t=30), 2 (docs, t=10), 3 (demo, t=20)
pub fn snapshot() -> Snapshot {
    let mut demo = BuilderStatus::new("demo");
    demo.project = Some("katana".to_string());
    demo.slaves = vec!["w1".to_string(), "w2".to_string()];

    let mut builds: Vec<BuildStatus> = (33..=42).map(finished_build).collect();
    if let Some(latest) = builds.last_mut() {
        latest.source_stamps[0].changes = vec![Change {
            number: Some(101),
            who: "alice".to_string(),
            comments: "Fix the flaky compile step".to_string(),
            revision: Some("abc123".to_string()),
            branch: Some("trunk".to_string()),
            ..Default::default()
        }];
    }

    let mut docs = BuilderStatus::new("docs");
    docs.slaves = vec!["w2".to_string()];
    let mut running = BuildStatus::new("docs", 7, 4300.0);
    running.slave = Some("w2".to_string());

    Snapshot {
        master: MasterInfo {
            title: "Katana".to_string(),
            title_url: "https://example.org".to_string(),
            buildbot_url: "http://localhost:8010/".to_string(),
        },
        builders: vec![
            BuilderRecord {
                status: demo,
                builds,
            },
            BuilderRecord {
                status: docs,
                builds: vec![running],
            },
        ],
        slaves: vec![
            SlaveStatus::new("w1", true),
            SlaveStatus::new("w2", true),
            SlaveStatus::new("w3", false),
        ],
        pending: vec![
            PendingRecord {
                request: BuildRequest::new(1, "demo"),
                submitted_at: Some(30.0),
            },
            PendingRecord {
                request: BuildRequest::new(2, "docs"),
                submitted_at: Some(10.0),
            },
            PendingRecord {
                request: BuildRequest::new(3, "demo"),
                submitted_at: Some(20.0),
            },
        ],
        projects: vec![ProjectStatus {
            name: "katana".to_string(),
            description: Some("The katana project".to_string()),
        }],
        change_sources: vec!["GitPoller watching app".to_string()],
        metrics: None,
    }
}

pub fn store() -> MemoryStore {
    MemoryStore::new(snapshot(), CACHE_SIZE)
}

pub async fn tree() -> StatusTree {
    tree_with(store()).await
}

pub async fn tree_with(store: MemoryStore) -> StatusTree {
    StatusTree::build(Arc::new(store), TreeSettings::default())
        .await
        .unwrap()
}

/// Query parameters from `key=value` literals.
pub fn params(raw: &[(&str, &str)]) -> Vec<(String, String)> {
    raw.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A temp directory holding the fixture snapshot and an empty config file.
///
/// `lookout()` returns a `Command` pointed at both, so tests never read the
/// user's `~/.config/lookout/config.kdl`.
pub struct TestEnv {
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let snapshot = serde_json::to_string_pretty(&snapshot()).unwrap();
        std::fs::write(dir.path().join("status.json"), snapshot).unwrap();
        std::fs::write(dir.path().join("config.kdl"), "").unwrap();
        Self { dir }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.path().join("status.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.kdl")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Overwrite the config file.
    pub fn write_config(&self, text: &str) {
        std::fs::write(self.config_path(), text).unwrap();
    }

    /// A `Command` for the lookout binary using this environment's files.
    pub fn lookout(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_lookout"));
        cmd.current_dir(self.dir.path());
        cmd.env("LOOKOUT_CONFIG", self.config_path());
        cmd.env("LOOKOUT_SNAPSHOT", self.snapshot_path());
        cmd.env_remove("LOOKOUT_LOG");
        cmd
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
