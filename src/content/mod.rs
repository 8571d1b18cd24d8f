//! Content-addressing vocabulary
//!
//! Digests, descriptors, manifest documents and verified byte streams.
//! Everything else in the crate is built on these types.

pub mod descriptor;
pub mod digest;
pub mod key;
pub mod manifest;
pub mod media_type;
pub mod reader;

pub use descriptor::{annotations, Descriptor, Platform};
pub use digest::{Algorithm, Digest};
pub use key::ContentKey;
pub use manifest::{ArtifactManifest, ImageManifest, Index};
pub use reader::{bytes_reader, read_all, BlobReader, VerifyReader};
