//! Walk-scoped deduplication keys

use crate::content::descriptor::Descriptor;
use std::fmt;

/// Identity of a node during one graph walk: digest plus title.
///
/// The same bytes may appear under two names (two files with identical
/// content); each name is a distinct node for restoration purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey(String);

impl ContentKey {
    pub fn of(desc: &Descriptor) -> Self {
        Self(format!("{}{}", desc.digest, desc.title().unwrap_or("")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Descriptor> for ContentKey {
    fn from(desc: &Descriptor) -> Self {
        Self::of(desc)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
