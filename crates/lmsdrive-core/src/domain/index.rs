//! Change index entries

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Last-synced state of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub file_id: String,
    pub file_name: String,
    /// Server modification time of the copy on disk, in Unix seconds
    pub last_synced: i64,
}

impl IndexEntry {
    pub fn new(file_id: impl Into<String>, file_name: impl Into<String>, last_synced: i64) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: file_name.into(),
            last_synced,
        }
    }
}

/// The full index keyed by file id; ordered so rewrites are deterministic
pub type IndexTable = BTreeMap<String, IndexEntry>;
