//! Pending build queue projection.

use futures::future::try_join_all;
use serde::Serialize;

use crate::models::BuildRequest;
use crate::storage::{HistoryFilter, StatusStore};
use crate::{Error, Result};

/// Which requests a projection lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueScope {
    /// Every unclaimed request across all builders
    Global,
    Builder(String),
}

impl QueueScope {
    fn builder(&self) -> Option<&str> {
        match self {
            QueueScope::Global => None,
            QueueScope::Builder(name) => Some(name),
        }
    }
}

/// A queued request together with its submission time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingBuildEntry {
    #[serde(flatten)]
    pub request: BuildRequest,

    /// Seconds since the epoch
    pub submit_time: f64,
}

/// List unclaimed requests in ascending submission order.
///
/// Only the codebase constraints of `filter` apply. Submit times are fetched
/// concurrently and the list is sorted once every fetch has completed; a
/// single failed fetch fails the whole projection.
pub async fn pending_builds(
    store: &dyn StatusStore,
    scope: &QueueScope,
    filter: &HistoryFilter,
) -> Result<Vec<PendingBuildEntry>> {
    let requests: Vec<BuildRequest> = store
        .unclaimed_requests(scope.builder())
        .await?
        .into_iter()
        .filter(|request| filter.matches_codebases(&request.source_stamps))
        .collect();

    let times = try_join_all(requests.iter().map(|request| store.submit_time(request.brid)))
        .await
        .map_err(|e| Error::aggregate("queue prefetch", e))?;

    let mut entries: Vec<PendingBuildEntry> = requests
        .into_iter()
        .zip(times)
        .map(|(request, submit_time)| PendingBuildEntry {
            request,
            submit_time,
        })
        .collect();
    entries.sort_by(|a, b| a.submit_time.total_cmp(&b.submit_time));

    tracing::debug!(?scope, entries = entries.len(), "projected pending builds");
    Ok(entries)
}
