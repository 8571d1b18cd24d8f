//! Error types for orca
//!
//! All modules use `OrcaResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for orca operations
pub type OrcaResult<T> = Result<T, OrcaError>;

/// All errors that can occur in orca
#[derive(Error, Debug)]
pub enum OrcaError {
    // Content addressing errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Digest mismatch for {expected}: content hashes to {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Size mismatch for {digest}: expected {expected} bytes, read {actual}")]
    SizeMismatch {
        digest: String,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    #[error("Invalid reference: {reference}: {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Failed to parse manifest {digest}: {reason}")]
    ManifestParse { digest: String, reason: String },

    #[error("Content {0} is empty")]
    EmptyContent(String),

    // Cache errors
    #[error("Failed to write {digest} to cache: {reason}")]
    CacheWrite { digest: String, reason: String },

    // Referrers errors
    #[error("Referrers index for {subject} could not be updated: {reason}")]
    ReferrersIndex { subject: String, reason: String },

    #[error("Failed to apply {} tag(s): {}", failed.len(), failed.iter().map(|(r, e)| format!("{r} ({e})")).collect::<Vec<_>>().join(", "))]
    TagFanOut { failed: Vec<(String, String)> },

    // Target errors
    #[error("Target is read-only: cannot {0}")]
    ReadOnly(&'static str),

    #[error("Operation not supported by target: {0}")]
    Unsupported(String),

    #[error("Invalid OCI layout at {path}: {reason}")]
    InvalidLayout { path: PathBuf, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid path: {path}: {reason}")]
    PathInvalid { path: PathBuf, reason: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl OrcaError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a not-found error for a descriptor or reference
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Whether this error means the content does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the fetched bytes failed digest or size verification
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Self::DigestMismatch { .. } | Self::SizeMismatch { .. })
    }

    /// Soft errors leave the primary operation successful
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::ReferrersIndex { .. })
    }

    /// Check if error is retryable
    ///
    /// Retries belong to target implementations, so nothing raised here is.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ReferrersIndex { .. } => {
                Some("Re-run with --skip-gc to leave superseded referrers indexes in place")
            }
            Self::DigestMismatch { .. } | Self::SizeMismatch { .. } => {
                Some("The source served corrupted content; clear the cache with: orca cache clear")
            }
            Self::CacheWrite { .. } => Some("Check free space in the cache root or unset ORCA_CACHE"),
            Self::ReadOnly(_) => Some("Choose a writable destination"),
            _ => None,
        }
    }
}

/// Convert an error surfaced through an `AsyncRead` back into an `OrcaError`.
///
/// Readers in this crate wrap `OrcaError` inside `std::io::Error` so it can
/// travel through tokio's IO traits; this unwraps it again.
pub(crate) fn from_io(context: impl Into<String>, err: std::io::Error) -> OrcaError {
    if err.get_ref().is_some_and(|inner| inner.is::<OrcaError>()) {
        if let Some(inner) = err.into_inner() {
            if let Ok(orca) = inner.downcast::<OrcaError>() {
                return *orca;
            }
        }
        return OrcaError::Internal("lost wrapped error".to_string());
    }
    OrcaError::io(context, err)
}

/// Wrap an `OrcaError` so it can be returned from an `AsyncRead`
pub(crate) fn into_io(err: OrcaError) -> std::io::Error {
    std::io::Error::other(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = OrcaError::not_found("sha256:abc");
        assert!(err.to_string().contains("Not found"));
    }

    #[test]
    fn error_hint() {
        let err = OrcaError::ReferrersIndex {
            subject: "sha256:abc".to_string(),
            reason: "denied".to_string(),
        };
        assert!(err.hint().unwrap().contains("--skip-gc"));
        assert!(err.is_soft());
    }

    #[test]
    fn error_not_retryable() {
        assert!(!OrcaError::Cancelled.is_retryable());
        assert!(!OrcaError::not_found("x").is_retryable());
    }

    #[test]
    fn tag_fan_out_lists_failures() {
        let err = OrcaError::TagFanOut {
            failed: vec![("v2".to_string(), "denied".to_string())],
        };
        let msg = err.to_string();
        assert!(msg.contains("1 tag(s)"));
        assert!(msg.contains("v2 (denied)"));
    }

    #[test]
    fn io_wrapping_roundtrip() {
        let wrapped = into_io(OrcaError::DigestMismatch {
            expected: "sha256:a".to_string(),
            actual: "sha256:b".to_string(),
        });
        let back = from_io("reading", wrapped);
        assert!(back.is_verification_failure());

        let plain = from_io("reading", std::io::Error::other("boom"));
        assert!(matches!(plain, OrcaError::Io { .. }));
    }
}
