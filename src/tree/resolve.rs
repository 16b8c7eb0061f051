//! Path resolution.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::{HELP_SEGMENT, NodeKind, Rule, StatusNode};
use crate::query::RequestContext;
use crate::{Error, Result};

/// Outcome of walking a path.
#[derive(Debug)]
pub struct Resolution {
    pub node: Arc<StatusNode>,
    pub consumed: Vec<String>,
    /// Segments left over below a node that cannot be descended into
    pub remaining: Vec<String>,
}

impl StatusNode {
    /// The child addressed by `segment`, materializing and memoizing dynamic
    /// children. `Ok(None)` means the segment addresses nothing.
    pub fn child_for<'a>(
        self: &'a Arc<Self>,
        segment: &'a str,
        ctx: &'a RequestContext<'a>,
    ) -> BoxFuture<'a, Result<Option<Arc<StatusNode>>>> {
        async move {
            if segment == HELP_SEGMENT {
                if let Some(text) = self.help() {
                    return Ok(Some(Arc::new(StatusNode::documentation(self, text))));
                }
            }
            // A build stays addressable only while it is in the build cache.
            if let NodeKind::DynamicContainer(rule @ Rule::BuildHistory { .. }, _) = self.kind() {
                return rule.materialize(self, segment, ctx).await;
            }
            if let Some(child) = self.child(segment) {
                return Ok(Some(child));
            }
            match self.kind() {
                NodeKind::DynamicContainer(rule, _) => rule.materialize(self, segment, ctx).await,
                _ => Ok(None),
            }
        }
        .boxed()
    }
}

/// Walk a slash-separated `path` from `root`.
///
/// Walking stops when the segments run out or at a node that cannot be
/// descended into; leftover segments are reported, not rejected. A trailing
/// empty segment addresses the current node itself.
pub async fn resolve(
    root: &Arc<StatusNode>,
    path: &str,
    ctx: &RequestContext<'_>,
) -> Result<Resolution> {
    let mut remaining: VecDeque<String> = path.split('/').map(str::to_string).collect();
    let mut consumed = Vec::new();
    let mut node = Arc::clone(root);

    while let Some(segment) = remaining.pop_front() {
        if segment.is_empty() && remaining.is_empty() {
            break;
        }
        if !node.is_descendable() {
            remaining.push_front(segment);
            tracing::debug!(
                node = %node.name(),
                discarded = remaining.len(),
                "stopped at non-descendable node"
            );
            break;
        }
        let child = node
            .child_for(&segment, ctx)
            .await?
            .ok_or_else(|| Error::NotFound(not_found_path(&consumed, &segment)))?;
        node = child;
        consumed.push(segment);
    }

    Ok(Resolution {
        node,
        consumed,
        remaining: remaining.into_iter().collect(),
    })
}

fn not_found_path(consumed: &[String], segment: &str) -> String {
    let mut path = consumed.join("/");
    if !path.is_empty() {
        path.push('/');
    }
    path.push_str(segment);
    path
}
