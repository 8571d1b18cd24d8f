//! Content digests
//!
//! A digest is `<algorithm>:<encoded>` where the encoded part is the
//! lowercase hex hash of the content.

use crate::error::{OrcaError, OrcaResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;

/// Hash algorithms accepted in digests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Sha256,
    Sha512,
}

impl Algorithm {
    /// Algorithm name as it appears in a digest string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of the hex-encoded hash
    fn encoded_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Start an incremental hash for this algorithm
    pub fn hasher(&self) -> Hasher {
        match self {
            Self::Sha256 => Hasher::Sha256(Sha256::new()),
            Self::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incremental hasher producing a [`Digest`]
#[derive(Clone)]
pub enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    pub fn finish(self) -> Digest {
        match self {
            Self::Sha256(h) => Digest {
                algorithm: Algorithm::Sha256,
                encoded: hex::encode(h.finalize()),
            },
            Self::Sha512(h) => Digest {
                algorithm: Algorithm::Sha512,
                encoded: hex::encode(h.finalize()),
            },
        }
    }
}

/// A validated content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: Algorithm,
    encoded: String,
}

impl Digest {
    /// Compute the sha256 digest of `data`
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Algorithm::Sha256.hasher();
        hasher.update(data);
        hasher.finish()
    }

    /// Compute a digest of `data` with the same algorithm as `self`
    pub fn recompute(&self, data: &[u8]) -> Self {
        let mut hasher = self.algorithm.hasher();
        hasher.update(data);
        hasher.finish()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Hex-encoded hash without the algorithm prefix
    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}

impl FromStr for Digest {
    type Err = OrcaError;

    fn from_str(s: &str) -> OrcaResult<Self> {
        let (alg, encoded) = s
            .split_once(':')
            .ok_or_else(|| OrcaError::InvalidDigest(format!("{s}: missing algorithm")))?;

        let algorithm = match alg {
            "sha256" => Algorithm::Sha256,
            "sha512" => Algorithm::Sha512,
            other => {
                return Err(OrcaError::InvalidDigest(format!(
                    "{s}: unsupported algorithm '{other}'"
                )))
            }
        };

        if encoded.len() != algorithm.encoded_len()
            || !encoded
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(OrcaError::InvalidDigest(format!(
                "{s}: expected {} lowercase hex characters",
                algorithm.encoded_len()
            )));
        }

        Ok(Self {
            algorithm,
            encoded: encoded.to_string(),
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
