//! Extended copy: a graph copy plus everything that points at it

use crate::content::{Descriptor, Digest};
use crate::copy::graph::Walker;
use crate::copy::{CopyGraphOptions, CopyReport};
use crate::error::OrcaResult;
use crate::referrers::find_predecessors;
use crate::target::Target;
use futures_util::future::try_join_all;
use std::collections::HashSet;
use tracing::debug;

/// Options for [`extended_copy`]
#[derive(Debug, Clone, Default)]
pub struct ExtendedCopyOptions {
    pub graph: CopyGraphOptions,
    /// Maximum rounds of predecessor discovery; `None` runs to a fixed point
    pub depth: Option<usize>,
    /// Only follow predecessors of this artifact type
    pub artifact_type: Option<String>,
}

/// Copy `root`, then repeatedly discover and copy its predecessors at
/// the source until no new predecessor appears.
///
/// One visited map spans every round, so content shared between the
/// root and its referrers moves once.
pub async fn extended_copy(
    src: &dyn Target,
    dst: &dyn Target,
    root: &Descriptor,
    opts: &ExtendedCopyOptions,
) -> OrcaResult<CopyReport> {
    let walker = Walker::new(src, dst, &opts.graph);
    walker.copy(root.clone()).await?;

    let mut seen: HashSet<Digest> = HashSet::from([root.digest.clone()]);
    let mut frontier = vec![root.clone()];
    let mut round = 0;

    while !frontier.is_empty() && opts.depth.is_none_or(|depth| round < depth) {
        round += 1;
        let mut discovered = Vec::new();
        for node in &frontier {
            let predecessors = find_predecessors(
                walker.source(),
                node,
                opts.graph.referrers,
                opts.artifact_type.as_deref(),
            )
            .await?;
            for predecessor in predecessors {
                if seen.insert(predecessor.digest.clone()) {
                    discovered.push(predecessor);
                }
            }
        }

        debug!(round, discovered = discovered.len(), "Copying predecessors");
        try_join_all(discovered.iter().cloned().map(|p| walker.copy(p))).await?;
        frontier = discovered;
    }

    Ok(walker.finish(root))
}
