//! Reference syntax for local layouts
//!
//! `<dir>[:<tag>|@<digest>]`, e.g. `./backup:v1` or
//! `./backup@sha256:...`.

use crate::content::Digest;
use crate::error::{OrcaError, OrcaResult};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Tag or digest inside a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Tag(String),
    Digest(Digest),
}

impl Reference {
    pub fn is_digest(&self) -> bool {
        matches!(self, Self::Digest(_))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => f.write_str(tag),
            Self::Digest(digest) => write!(f, "{}", digest),
        }
    }
}

impl FromStr for Reference {
    type Err = OrcaError;

    fn from_str(s: &str) -> OrcaResult<Self> {
        if s.contains(':') {
            return s.parse().map(Self::Digest);
        }
        if !is_valid_tag(s) {
            return Err(OrcaError::InvalidReference {
                reference: s.to_string(),
                reason: "tags are 1-128 characters of [A-Za-z0-9_.-], not starting with . or -"
                    .to_string(),
            });
        }
        Ok(Self::Tag(s.to_string()))
    }
}

/// Tag grammar of the distribution spec: `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    tag.len() <= 128
        && (first.is_ascii_alphanumeric() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// A layout directory with an optional reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutReference {
    pub path: PathBuf,
    pub reference: Option<Reference>,
}

impl LayoutReference {
    /// The reference as a string, or `default` when none was given
    pub fn reference_or(&self, default: &str) -> String {
        self.reference
            .as_ref()
            .map(Reference::to_string)
            .unwrap_or_else(|| default.to_string())
    }
}

impl FromStr for LayoutReference {
    type Err = OrcaError;

    fn from_str(s: &str) -> OrcaResult<Self> {
        if s.is_empty() {
            return Err(OrcaError::InvalidReference {
                reference: s.to_string(),
                reason: "empty layout path".to_string(),
            });
        }

        if let Some((path, digest)) = s.rsplit_once('@') {
            let digest: Digest = digest.parse().map_err(|_| OrcaError::InvalidReference {
                reference: s.to_string(),
                reason: format!("invalid digest '{}'", digest),
            })?;
            return Ok(Self {
                path: PathBuf::from(path),
                reference: Some(Reference::Digest(digest)),
            });
        }

        // A trailing `:<tag>` unless the suffix can't be a tag (`C:\dir`)
        match s.rsplit_once(':') {
            Some((path, tag)) if !path.is_empty() && is_valid_tag(tag) => Ok(Self {
                path: PathBuf::from(path),
                reference: Some(Reference::Tag(tag.to_string())),
            }),
            _ => Ok(Self {
                path: PathBuf::from(s),
                reference: None,
            }),
        }
    }
}

impl fmt::Display for LayoutReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        match &self.reference {
            Some(Reference::Tag(tag)) => write!(f, ":{}", tag),
            Some(Reference::Digest(digest)) => write!(f, "@{}", digest),
            None => Ok(()),
        }
    }
}
