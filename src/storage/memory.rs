//! In-memory status store.
//!
//! [`MemoryStore`] serves a master's state from a [`Snapshot`] held in memory,
//! typically loaded from a JSON file. It models the bounded build cache the
//! way a live master does: only the most recent `cache_size` builds of each
//! builder are reachable through the `cached_*` accessors, while history
//! scans see every build.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{HistoryFilter, StatusStore};
use crate::models::{
    BuildRequest, BuildStatus, BuilderStatus, MasterInfo, ProjectStatus, SlaveStatus,
};
use crate::{Error, Result};

/// A builder together with its build history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderRecord {
    #[serde(flatten)]
    pub status: BuilderStatus,

    #[serde(default)]
    pub builds: Vec<BuildStatus>,
}

/// A pending build request and its submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRecord {
    #[serde(flatten)]
    pub request: BuildRequest,

    /// Missing submission times surface as store failures
    #[serde(default)]
    pub submitted_at: Option<f64>,
}

/// Everything a [`MemoryStore`] knows about a master.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub master: MasterInfo,

    #[serde(default)]
    pub builders: Vec<BuilderRecord>,

    #[serde(default)]
    pub slaves: Vec<SlaveStatus>,

    #[serde(default)]
    pub pending: Vec<PendingRecord>,

    #[serde(default)]
    pub projects: Vec<ProjectStatus>,

    #[serde(default)]
    pub change_sources: Vec<String>,

    #[serde(default)]
    pub metrics: Option<serde_json::Value>,
}

/// In-memory store for development, tests and offline snapshots.
#[derive(Debug)]
pub struct MemoryStore {
    snapshot: RwLock<Snapshot>,
    cache_size: usize,
    submit_delays: HashMap<u64, Duration>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::BackingStore("status snapshot lock poisoned".to_string())
}

impl MemoryStore {
    /// Create a store whose build cache holds `cache_size` builds per builder.
    pub fn new(mut snapshot: Snapshot, cache_size: usize) -> Self {
        for record in &mut snapshot.builders {
            normalize(record);
        }
        Self {
            snapshot: RwLock::new(snapshot),
            cache_size,
            submit_delays: HashMap::new(),
        }
    }

    /// Load a JSON snapshot from disk.
    pub fn from_path(path: &Path, cache_size: usize) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            builders = snapshot.builders.len(),
            slaves = snapshot.slaves.len(),
            pending = snapshot.pending.len(),
            "loaded status snapshot"
        );
        Ok(Self::new(snapshot, cache_size))
    }

    /// Delay the submit-time lookup of one request.
    pub fn with_submit_delay(mut self, brid: u64, delay: Duration) -> Self {
        self.submit_delays.insert(brid, delay);
        self
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    /// Record a new or updated build.
    pub fn add_build(&self, build: BuildStatus) -> Result<()> {
        let mut snapshot = self.snapshot.write().map_err(poison_err)?;
        let record = snapshot
            .builders
            .iter_mut()
            .find(|r| r.status.name == build.builder_name)
            .ok_or_else(|| Error::NotFound(format!("builder {}", build.builder_name)))?;
        record.builds.retain(|b| b.number != build.number);
        record.builds.push(build);
        normalize(record);
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Snapshot>> {
        self.snapshot.read().map_err(poison_err)
    }

    fn with_record<T>(&self, builder: &str, f: impl FnOnce(&BuilderRecord) -> T) -> Result<T> {
        let snapshot = self.read()?;
        snapshot
            .builders
            .iter()
            .find(|r| r.status.name == builder)
            .map(f)
            .ok_or_else(|| Error::NotFound(format!("builder {}", builder)))
    }

    fn cached<'a>(&self, record: &'a BuilderRecord) -> &'a [BuildStatus] {
        let start = record.builds.len().saturating_sub(self.cache_size);
        &record.builds[start..]
    }
}

/// Keep a builder's history sorted by build number and tagged with its name.
fn normalize(record: &mut BuilderRecord) {
    for build in &mut record.builds {
        if build.builder_name.is_empty() {
            build.builder_name = record.status.name.clone();
        }
    }
    record.builds.sort_by_key(|b| b.number);
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn builder_names(&self) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .builders
            .iter()
            .map(|r| r.status.name.clone())
            .collect())
    }

    async fn builder(&self, name: &str) -> Result<BuilderStatus> {
        self.with_record(name, |r| r.status.clone())
    }

    async fn cached_build(&self, builder: &str, index: i64) -> Result<Option<BuildStatus>> {
        self.with_record(builder, |record| {
            let cached = self.cached(record);
            if index >= 0 {
                cached.iter().find(|b| b.number == index as u64).cloned()
            } else {
                let back = index.unsigned_abs() as usize;
                cached
                    .len()
                    .checked_sub(back)
                    .and_then(|i| cached.get(i))
                    .cloned()
            }
        })
    }

    async fn cached_builds(&self, builder: &str, filter: &HistoryFilter) -> Result<Vec<BuildStatus>> {
        self.with_record(builder, |record| {
            self.cached(record)
                .iter()
                .rev()
                .filter(|b| filter.matches_codebases(&b.source_stamps))
                .cloned()
                .collect()
        })
    }

    async fn build(&self, builder: &str, number: u64) -> Result<BuildStatus> {
        self.with_record(builder, |record| {
            record.builds.iter().find(|b| b.number == number).cloned()
        })?
        .ok_or_else(|| Error::NotFound(format!("build {} of {}", number, builder)))
    }

    async fn finished_builds(
        &self,
        builders: &[String],
        filter: &HistoryFilter,
        limit: Option<usize>,
    ) -> Result<Vec<BuildStatus>> {
        let snapshot = self.read()?;
        let mut matching: Vec<BuildStatus> = snapshot
            .builders
            .iter()
            .filter(|r| builders.contains(&r.status.name))
            .flat_map(|r| r.builds.iter())
            .filter(|b| b.is_finished() && filter.matches(b))
            .cloned()
            .collect();
        // Newest first: by end time across builders, by number within one.
        matching.sort_by(|a, b| {
            let ends = b.times.1.unwrap_or(0.0).total_cmp(&a.times.1.unwrap_or(0.0));
            ends.then_with(|| b.number.cmp(&a.number))
        });
        if let Some(limit) = limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn current_builds(&self, builder: &str) -> Result<Vec<BuildStatus>> {
        self.with_record(builder, |record| {
            record
                .builds
                .iter()
                .filter(|b| !b.is_finished())
                .cloned()
                .collect()
        })
    }

    async fn slave_names(&self) -> Result<Vec<String>> {
        Ok(self.read()?.slaves.iter().map(|s| s.name.clone()).collect())
    }

    async fn slave(&self, name: &str) -> Result<SlaveStatus> {
        self.read()?
            .slaves
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("slave {}", name)))
    }

    async fn unclaimed_requests(&self, builder: Option<&str>) -> Result<Vec<BuildRequest>> {
        Ok(self
            .read()?
            .pending
            .iter()
            .filter(|p| builder.is_none_or(|name| p.request.builder_name == name))
            .map(|p| p.request.clone())
            .collect())
    }

    async fn submit_time(&self, brid: u64) -> Result<f64> {
        if let Some(delay) = self.submit_delays.get(&brid) {
            tokio::time::sleep(*delay).await;
        }
        self.read()?
            .pending
            .iter()
            .find(|p| p.request.brid == brid)
            .and_then(|p| p.submitted_at)
            .ok_or_else(|| {
                Error::BackingStore(format!("submit time unavailable for request {}", brid))
            })
    }

    async fn projects(&self) -> Result<Vec<ProjectStatus>> {
        Ok(self.read()?.projects.clone())
    }

    async fn master_info(&self) -> Result<MasterInfo> {
        Ok(self.read()?.master.clone())
    }

    async fn change_sources(&self) -> Result<Vec<String>> {
        Ok(self.read()?.change_sources.clone())
    }

    async fn metrics(&self) -> Result<Option<serde_json::Value>> {
        Ok(self.read()?.metrics.clone())
    }
}
