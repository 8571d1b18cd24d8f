//! Tag fan-out

use crate::content::Descriptor;
use crate::error::{OrcaError, OrcaResult};
use crate::target::Target;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

/// Point every reference in `references` at `desc`.
///
/// Every reference is attempted, at most `concurrency` at a time. Tags
/// that succeed stay in place even when others fail; failures are
/// collected into one [`OrcaError::TagFanOut`]. Returns the committed
/// references in input order.
pub async fn tag_all(
    dst: &dyn Target,
    desc: &Descriptor,
    references: &[String],
    concurrency: usize,
) -> OrcaResult<Vec<String>> {
    let mut results: Vec<(usize, OrcaResult<()>)> = stream::iter(references.iter().enumerate())
        .map(|(i, reference)| async move { (i, dst.tag(desc, reference).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    results.sort_by_key(|(i, _)| *i);

    let mut committed = Vec::new();
    let mut failed = Vec::new();
    for (i, result) in results {
        let reference = references[i].clone();
        match result {
            Ok(()) => {
                debug!(digest = %desc.digest, reference = %reference, "Tagged");
                committed.push(reference);
            }
            Err(e) => {
                warn!(reference = %reference, error = %e, "Tag failed");
                failed.push((reference, e.to_string()));
            }
        }
    }

    if failed.is_empty() {
        Ok(committed)
    } else {
        Err(OrcaError::TagFanOut { failed })
    }
}
