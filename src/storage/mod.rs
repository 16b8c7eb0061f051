//! Backing status store interface.
//!
//! The status tree never owns builder, build or worker records; it asks a
//! [`StatusStore`] for them at query time. This module provides:
//! - `StatusStore` - Async accessors the tree renders from
//! - `HistoryFilter` - Codebase / branch / result / worker filters for history scans
//! - `MemoryStore` - An in-memory store loaded from a JSON snapshot

pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::Result;
use crate::models::{
    BuildRequest, BuildStatus, BuilderStatus, MasterInfo, ProjectStatus, SlaveStatus, SourceStamp,
};

pub use memory::{BuilderRecord, MemoryStore, PendingRecord, Snapshot};

/// Async accessors over the master's live and historical state.
///
/// Build lookups come in two flavours: `cached_*` methods only consult the
/// bounded in-memory build cache, while `finished_builds` scans full history.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Names of every configured builder, in registry order.
    async fn builder_names(&self) -> Result<Vec<String>>;

    /// A builder by name. Fails with `NotFound` for unknown builders.
    async fn builder(&self, name: &str) -> Result<BuilderStatus>;

    /// A build from the bounded cache.
    ///
    /// `index >= 0` is an absolute build number; `index < 0` counts back from
    /// the most recent build (`-1` is the latest). Returns `None` when the
    /// build is not in the cache.
    async fn cached_build(&self, builder: &str, index: i64) -> Result<Option<BuildStatus>>;

    /// Every cached build matching the filter's codebases, newest first.
    async fn cached_builds(&self, builder: &str, filter: &HistoryFilter) -> Result<Vec<BuildStatus>>;

    /// A build by number from full history.
    async fn build(&self, builder: &str, number: u64) -> Result<BuildStatus>;

    /// Finished builds of the given builders matching `filter`, newest first,
    /// scanning full history. `limit` caps how many matching builds are returned.
    async fn finished_builds(
        &self,
        builders: &[String],
        filter: &HistoryFilter,
        limit: Option<usize>,
    ) -> Result<Vec<BuildStatus>>;

    /// Builds currently running on a builder.
    async fn current_builds(&self, builder: &str) -> Result<Vec<BuildStatus>>;

    async fn slave_names(&self) -> Result<Vec<String>>;

    async fn slave(&self, name: &str) -> Result<SlaveStatus>;

    /// Unclaimed build requests, for one builder or (with `None`) all of them.
    async fn unclaimed_requests(&self, builder: Option<&str>) -> Result<Vec<BuildRequest>>;

    /// When a build request was submitted, seconds since the epoch.
    async fn submit_time(&self, brid: u64) -> Result<f64>;

    async fn projects(&self) -> Result<Vec<ProjectStatus>>;

    async fn master_info(&self) -> Result<MasterInfo>;

    /// Descriptions of the configured change sources.
    async fn change_sources(&self) -> Result<Vec<String>>;

    /// Master metrics, or `None` when metrics are disabled.
    async fn metrics(&self) -> Result<Option<serde_json::Value>>;
}

/// Filters applied to build history listings.
///
/// A build passes only when it satisfies every filter that is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    /// Codebase name → branch or revision the build must have used
    pub codebases: BTreeMap<String, String>,
    /// Branch names; a build passes when any of its stamps is on one of them
    pub branches: Vec<String>,
    /// Accepted result codes
    pub results: Option<Vec<i32>>,
    /// Only builds that ran on this worker
    pub slave: Option<String>,
}

impl HistoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codebase(mut self, codebase: impl Into<String>, wanted: impl Into<String>) -> Self {
        self.codebases.insert(codebase.into(), wanted.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branches.push(branch.into());
        self
    }

    pub fn with_results(mut self, results: Vec<i32>) -> Self {
        self.results = Some(results);
        self
    }

    pub fn with_slave(mut self, slave: impl Into<String>) -> Self {
        self.slave = Some(slave.into());
        self
    }

    /// True when no filter is set at all.
    pub fn is_empty(&self) -> bool {
        self.codebases.is_empty()
            && self.branches.is_empty()
            && self.results.is_none()
            && self.slave.is_none()
    }

    /// Only the codebase constraints of this filter.
    pub fn codebases_only(&self) -> Self {
        Self {
            codebases: self.codebases.clone(),
            ..Default::default()
        }
    }

    /// Check source stamps against every codebase constraint.
    pub fn matches_codebases(&self, stamps: &[SourceStamp]) -> bool {
        self.codebases.iter().all(|(codebase, wanted)| {
            stamps.iter().any(|stamp| {
                stamp.codebase == *codebase
                    && (stamp.branch.as_deref() == Some(wanted.as_str())
                        || stamp.revision.as_deref() == Some(wanted.as_str()))
            })
        })
    }

    pub fn matches(&self, build: &BuildStatus) -> bool {
        if !self.matches_codebases(&build.source_stamps) {
            return false;
        }
        if !self.branches.is_empty()
            && !build.source_stamps.iter().any(|stamp| {
                stamp
                    .branch
                    .as_ref()
                    .is_some_and(|branch| self.branches.contains(branch))
            })
        {
            return false;
        }
        if let Some(ref results) = self.results {
            match build.results {
                Some(code) if results.contains(&code) => {}
                _ => return false,
            }
        }
        if let Some(ref slave) = self.slave {
            if build.slave.as_ref() != Some(slave) {
                return false;
            }
        }
        true
    }
}
