use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a collaborative document: the resource kind from the
/// upgrade path plus the document id within that kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocKey {
    pub kind: String,
    pub id: String,
}

impl DocKey {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// A key is usable only when both segments are non-blank.
    pub fn is_valid(&self) -> bool {
        !self.kind.trim().is_empty() && !self.id.trim().is_empty()
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}
