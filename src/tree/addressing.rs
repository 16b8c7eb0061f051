//! Build addressing and dynamic child materialization.
//!
//! A build history segment is one of:
//! - `7` or `+7` - the build numbered 7,
//! - `-1`, `-2`, ... - the most recent, second most recent, ... build,
//! - `<5` - the 5 most recent finished builds matching the request filters
//!   (15 when the count does not parse).
//!
//! Numeric addresses only consult the bounded build cache; `<N` listings
//! scan full history when rendered.

use std::sync::Arc;

use super::{HistoryScope, Rule, StatusNode, View, build::build_node};
use crate::Result;
use crate::query::RequestContext;

/// Count used by `<N` when N does not parse.
pub const DEFAULT_LAST_N: usize = 15;

const PAST_BUILDS_HELP: &str = "Previous x number of builds that were run on a builder.";
const STEP_HELP: &str = "A single build step.";

/// A build address parsed from a path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildRef {
    Absolute(u64),
    /// k-th most recent build, 1-based
    RelativeToLatest(u64),
    LastN(usize),
}

impl BuildRef {
    /// Parse a path segment, returning `None` for anything that is not a
    /// build address.
    pub fn parse(segment: &str) -> Option<Self> {
        if let Some(count) = segment.strip_prefix('<') {
            return Some(BuildRef::LastN(count.parse().unwrap_or(DEFAULT_LAST_N)));
        }
        if !is_integer(segment) {
            return None;
        }
        let n: i64 = segment.parse().ok()?;
        if n < 0 {
            Some(BuildRef::RelativeToLatest(n.unsigned_abs()))
        } else {
            Some(BuildRef::Absolute(n as u64))
        }
    }

    /// The cache index understood by
    /// [`StatusStore::cached_build`](crate::storage::StatusStore::cached_build).
    pub fn cache_index(&self) -> Option<i64> {
        match *self {
            BuildRef::Absolute(n) => i64::try_from(n).ok(),
            BuildRef::RelativeToLatest(k) => i64::try_from(k).ok().map(|k| -k),
            BuildRef::LastN(_) => None,
        }
    }
}

/// `^[-+]?\d+$`
fn is_integer(segment: &str) -> bool {
    let digits = segment
        .strip_prefix('-')
        .or_else(|| segment.strip_prefix('+'))
        .unwrap_or(segment);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Most `<N` listings one container keeps registered.
pub const MAX_LAST_N_NODES: usize = 32;

/// The `<count` listing under `parent`, registered while the container holds
/// fewer than [`MAX_LAST_N_NODES`] of them.
fn past_builds_child(parent: &StatusNode, scope: HistoryScope, count: usize) -> Arc<StatusNode> {
    let node = StatusNode::leaf(
        format!("<{}", count),
        Some(PAST_BUILDS_HELP),
        View::PastBuilds { scope, count },
    );
    parent.memoize_bounded(
        node.name().to_string(),
        Arc::new(node),
        MAX_LAST_N_NODES,
        |key| key.starts_with('<'),
    )
}

impl Rule {
    /// Materialize the child of `parent` addressed by `segment`.
    ///
    /// Returns `Ok(None)` when the segment does not address anything.
    pub(super) async fn materialize(
        &self,
        parent: &Arc<StatusNode>,
        segment: &str,
        ctx: &RequestContext<'_>,
    ) -> Result<Option<Arc<StatusNode>>> {
        match self {
            Rule::BuildHistory { builder } => {
                resolve_build_child(parent, builder, segment, ctx).await
            }
            Rule::ForwardTo(target) => match parent.child(target) {
                Some(target) => target.child_for(segment, ctx).await,
                None => Ok(None),
            },
            Rule::Steps { builder, number } => {
                resolve_step_child(parent, builder, *number, segment, ctx).await
            }
            Rule::SlaveHistory { slave } => match BuildRef::parse(segment) {
                Some(BuildRef::LastN(count)) => Ok(Some(past_builds_child(
                    parent,
                    HistoryScope::Slave(slave.clone()),
                    count,
                ))),
                _ => Ok(None),
            },
        }
    }
}

/// Resolve a build history segment of `builder` under `parent`.
///
/// Build nodes are memoized under their absolute number, so `-1` and the
/// latest build's number resolve to the same node.
async fn resolve_build_child(
    parent: &Arc<StatusNode>,
    builder: &str,
    segment: &str,
    ctx: &RequestContext<'_>,
) -> Result<Option<Arc<StatusNode>>> {
    let Some(address) = BuildRef::parse(segment) else {
        return Ok(None);
    };
    if let BuildRef::LastN(count) = address {
        let scope = HistoryScope::Builder(builder.to_string());
        return Ok(Some(past_builds_child(parent, scope, count)));
    }
    let Some(index) = address.cache_index() else {
        return Ok(None);
    };
    let Some(build) = ctx.store.cached_build(builder, index).await? else {
        tracing::debug!(builder, segment, "build not in cache");
        if let BuildRef::Absolute(number) = address {
            parent.forget(&number.to_string());
        }
        return Ok(None);
    };
    let key = build.number.to_string();
    if let Some(existing) = parent.child(&key) {
        return Ok(Some(existing));
    }
    Ok(Some(parent.memoize(key, Arc::new(build_node(&build)))))
}

/// Resolve a step of a build by position or by name.
async fn resolve_step_child(
    parent: &Arc<StatusNode>,
    builder: &str,
    number: u64,
    segment: &str,
    ctx: &RequestContext<'_>,
) -> Result<Option<Arc<StatusNode>>> {
    let build = ctx.store.build(builder, number).await?;
    let index = if is_integer(segment) {
        segment.parse::<i64>().ok().and_then(|p| build.step_index(p))
    } else {
        build.steps.iter().position(|step| step.name == segment)
    };
    let Some(index) = index else {
        return Ok(None);
    };
    let step_name = build.steps[index].name.clone();
    let node = StatusNode::leaf(
        step_name.clone(),
        Some(STEP_HELP),
        View::Step {
            builder: builder.to_string(),
            number,
            index,
        },
    );
    let node = parent.memoize(index.to_string(), Arc::new(node));
    Ok(Some(parent.memoize(step_name, node)))
}
