//! End-to-end operations built on the copy engine
//!
//! Each operation takes already-constructed targets; the CLI decides
//! which concrete targets (layouts, file stores, caches) to build.

mod backup;
mod copy;
mod manage;
mod pull;
mod push;

pub use backup::{backup, restore, BackupOptions, RestoreOptions};
pub use copy::{copy, CopyOptions, CopyOutcome};
pub use manage::{delete, discover, tag, DeleteOptions, DeleteOutcome, ReferrerNode};
pub use pull::{pull, PullOptions, PullOutcome};
pub use push::{push_files, FileSpec, PushOptions, PushOutcome};

use crate::content::{read_all, Descriptor};
use crate::error::OrcaResult;
use crate::target::{fetch_reference, Target};

/// Resolve the root of an operation.
///
/// Through a reference fetcher the manifest is read in the same step,
/// which also warms a caching proxy.
pub(crate) async fn resolve_root(target: &dyn Target, reference: &str) -> OrcaResult<Descriptor> {
    if target.as_reference_fetcher().is_none() {
        return target.resolve(reference).await;
    }
    let (desc, reader) = fetch_reference(target, reference).await?;
    if desc.is_manifest() {
        read_all(reader, &desc).await?;
    }
    Ok(desc)
}
