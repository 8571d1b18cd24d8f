//! orca - content-addressable artifact replication
//!
//! Copies OCI manifests and blobs between targets as a graph, children
//! before parents, skipping what the destination already holds. A local
//! write-through cache can sit in front of any source target.

pub mod cache;
pub mod cli;
pub mod config;
pub mod content;
pub mod copy;
pub mod error;
pub mod ops;
pub mod referrers;
pub mod successors;
pub mod target;
pub mod ui;

#[cfg(test)]
mod fixtures;

pub use copy::{copy_graph, extended_copy, CopyGraphOptions, CopyReport, ExtendedCopyOptions};
pub use error::{OrcaError, OrcaResult};
pub use target::{Storage, Target};
