//! Data models for the entities a build master reports on.
//!
//! This module defines the status records handed out by a
//! [`StatusStore`](crate::storage::StatusStore):
//! - `BuilderStatus` - A named build configuration
//! - `BuildStatus` / `StepStatus` - One execution of a builder and its steps
//! - `SourceStamp` / `Change` - The revisions a build ran against
//! - `SlaveStatus` - A remote worker
//! - `BuildRequest` - A queued, unclaimed build
//! - `ProjectStatus` / `MasterInfo` - Project-level settings
//!
//! All records serialize with camelCase keys; that is the document format
//! clients receive.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Build result codes as reported by the master.
pub mod results {
    pub const SUCCESS: i32 = 0;
    pub const WARNINGS: i32 = 1;
    pub const FAILURE: i32 = 2;
    pub const SKIPPED: i32 = 3;
    pub const EXCEPTION: i32 = 4;
    pub const RETRY: i32 = 5;
    pub const CANCELED: i32 = 6;
}

/// Activity state of a builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuilderState {
    #[default]
    Idle,
    Building,
    Offline,
}

impl fmt::Display for BuilderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuilderState::Idle => write!(f, "idle"),
            BuilderState::Building => write!(f, "building"),
            BuilderState::Offline => write!(f, "offline"),
        }
    }
}

/// A named, persistent build configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderStatus {
    pub name: String,

    /// Display name; falls back to `name` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// Project this builder belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Names of the workers allowed to run this builder
    #[serde(default)]
    pub slaves: Vec<String>,

    #[serde(default)]
    pub state: BuilderState,
}

impl BuilderStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            friendly_name: None,
            project: None,
            category: None,
            slaves: Vec::new(),
            state: BuilderState::default(),
        }
    }

    pub fn friendly_name(&self) -> &str {
        self.friendly_name.as_deref().unwrap_or(&self.name)
    }
}

/// A single source-control change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    /// Change number; may be missing or clash for changes generated inside
    /// the master or coming from several pollers
    #[serde(default)]
    pub number: Option<u64>,

    #[serde(default)]
    pub who: String,

    #[serde(default)]
    pub comments: String,

    #[serde(default)]
    pub revision: Option<String>,

    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default)]
    pub repository: String,

    #[serde(default)]
    pub codebase: String,

    #[serde(default)]
    pub files: Vec<String>,

    /// Seconds since the epoch
    #[serde(default)]
    pub at: f64,
}

/// The revisions of one codebase a build ran against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStamp {
    #[serde(default)]
    pub codebase: String,

    #[serde(default)]
    pub repository: String,

    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default)]
    pub revision: Option<String>,

    #[serde(default)]
    pub project: String,

    #[serde(default)]
    pub changes: Vec<Change>,
}

impl SourceStamp {
    pub fn new(codebase: impl Into<String>, branch: Option<&str>) -> Self {
        Self {
            codebase: codebase.into(),
            branch: branch.map(str::to_string),
            ..Default::default()
        }
    }
}

/// One step of a build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    pub name: String,

    #[serde(default)]
    pub text: Vec<String>,

    #[serde(default)]
    pub results: Option<i32>,

    #[serde(default)]
    pub is_started: bool,

    #[serde(default)]
    pub is_finished: bool,

    /// Start and end, seconds since the epoch
    #[serde(default)]
    pub times: (Option<f64>, Option<f64>),
}

impl StepStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// One execution of a builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    #[serde(default)]
    pub builder_name: String,

    pub number: u64,

    /// Result code; `None` while the build is still running
    #[serde(default)]
    pub results: Option<i32>,

    #[serde(default)]
    pub reason: String,

    /// Worker that ran (or is running) the build
    #[serde(default)]
    pub slave: Option<String>,

    /// Start and end, seconds since the epoch
    pub times: (f64, Option<f64>),

    #[serde(default)]
    pub text: Vec<String>,

    #[serde(default)]
    pub steps: Vec<StepStatus>,

    #[serde(default)]
    pub source_stamps: Vec<SourceStamp>,

    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl BuildStatus {
    pub fn new(builder_name: impl Into<String>, number: u64, started: f64) -> Self {
        Self {
            builder_name: builder_name.into(),
            number,
            results: None,
            reason: String::new(),
            slave: None,
            times: (started, None),
            text: Vec::new(),
            steps: Vec::new(),
            source_stamps: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Mark the build finished with the given result code.
    pub fn finish(mut self, results: i32, ended: f64) -> Self {
        self.results = Some(results);
        self.times.1 = Some(ended);
        self
    }

    pub fn is_finished(&self) -> bool {
        self.times.1.is_some()
    }

    /// The build's primary source stamp.
    pub fn primary_source_stamp(&self) -> Option<&SourceStamp> {
        self.source_stamps.first()
    }

    /// Locate a step by position; negative positions count from the end.
    pub fn step_index(&self, position: i64) -> Option<usize> {
        let len = self.steps.len() as i64;
        let index = if position < 0 { len + position } else { position };
        (0..len).contains(&index).then_some(index as usize)
    }
}

/// A remote worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaveStatus {
    pub name: String,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub admin: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub connected: bool,
}

impl SlaveStatus {
    pub fn new(name: impl Into<String>, connected: bool) -> Self {
        Self {
            name: name.into(),
            connected,
            ..Default::default()
        }
    }
}

/// A queued build request that no worker has claimed yet.
///
/// The submission time is deliberately not part of the listing record; it is
/// fetched per request through
/// [`StatusStore::submit_time`](crate::storage::StatusStore::submit_time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub brid: u64,

    pub builder_name: String,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub source_stamps: Vec<SourceStamp>,
}

impl BuildRequest {
    pub fn new(brid: u64, builder_name: impl Into<String>) -> Self {
        Self {
            brid,
            builder_name: builder_name.into(),
            reason: String::new(),
            priority: 0,
            source_stamps: Vec::new(),
        }
    }
}

/// A registered project grouping several builders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,
}

/// Master-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterInfo {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub title_url: String,

    #[serde(default)]
    pub buildbot_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_serializes_camel_case() {
        let build = BuildStatus::new("demo", 7, 100.0).finish(results::SUCCESS, 160.0);
        let value = serde_json::to_value(&build).unwrap();
        assert_eq!(value["builderName"], "demo");
        assert_eq!(value["number"], 7);
        assert_eq!(value["results"], 0);
        assert_eq!(value["times"], serde_json::json!([100.0, 160.0]));
        assert!(value.get("sourceStamps").is_some());
    }

    #[test]
    fn test_build_finished_flag() {
        let build = BuildStatus::new("demo", 1, 0.0);
        assert!(!build.is_finished());
        assert!(build.finish(results::FAILURE, 1.0).is_finished());
    }

    #[test]
    fn test_step_index_supports_negative_positions() {
        let mut build = BuildStatus::new("demo", 1, 0.0);
        build.steps = vec![StepStatus::new("checkout"), StepStatus::new("compile")];
        assert_eq!(build.step_index(0), Some(0));
        assert_eq!(build.step_index(-1), Some(1));
        assert_eq!(build.step_index(2), None);
        assert_eq!(build.step_index(-3), None);
    }

    #[test]
    fn test_friendly_name_falls_back_to_name() {
        let mut builder = BuilderStatus::new("linux");
        assert_eq!(builder.friendly_name(), "linux");
        builder.friendly_name = Some("Linux x64".to_string());
        assert_eq!(builder.friendly_name(), "Linux x64");
    }

    #[test]
    fn test_snapshot_records_deserialize_with_defaults() {
        let json = r#"{"builderName": "demo", "number": 3, "times": [1.0, null]}"#;
        let build: BuildStatus = serde_json::from_str(json).unwrap();
        assert_eq!(build.number, 3);
        assert!(build.steps.is_empty());
        assert_eq!(build.results, None);
    }
}
